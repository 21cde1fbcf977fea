//! Kairos: building blocks for low-latency trading services.
//!
//! - [`core`]: fixed-capacity object pool and SPSC ring buffer
//! - [`logger`]: asynchronous file logger fed through the ring buffer
//! - [`network`]: non-blocking TCP/UDP sockets and a busy-poll reactor
//!
//! Hot paths never allocate and never return errors; broken invariants
//! end the process through [`core::fatal`]. Setup paths return [`Result`].

pub mod core;
pub mod diagnostics;
pub mod error;
pub mod logger;
pub mod network;
pub mod util;

pub use error::{Error, Result};
