//! Fail-fast path for broken invariants.
//!
//! Pool exhaustion, foreign deallocation, reading an empty ring buffer and
//! log format mismatches are sizing or caller bugs, not runtime conditions.
//! The release profile builds with `panic = "abort"`, so reaching this
//! function terminates the process right after the diagnostic.

use std::fmt::Display;

/// Emit the diagnostic and stop.
#[cold]
#[inline(never)]
#[track_caller]
pub fn fatal(msg: impl Display) -> ! {
    tracing::error!(target: "kairos::fatal", "{}", msg);
    panic!("FATAL : {}", msg);
}
