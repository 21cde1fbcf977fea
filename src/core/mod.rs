//! Core module: allocation and inter-thread plumbing
//!
//! Prinsip desain:
//! - No-Allocation: pool slots and ring slots are allocated once at init
//! - Lock-Free: the ring buffer synchronizes through atomics only
//! - Fail-Fast: a broken invariant stops the process (see [`fatal`])

pub mod fatal;
pub mod pool;
pub mod ring_buffer;

pub use fatal::fatal;
pub use pool::{Pool, PoolHandle};
pub use ring_buffer::{Consumer, Producer, RingBuffer};
