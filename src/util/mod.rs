//! Small helpers shared by the logger, the sockets and the binaries.

pub mod thread;
pub mod time;

pub use self::thread::spawn_pinned;
pub use self::time::{current_time_str, now_nanos, Nanos};
