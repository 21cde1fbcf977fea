//! Named, optionally core-pinned worker threads.

use std::thread::{self, JoinHandle};

use core_affinity::CoreId;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Spawn `body` on a thread called `name`, pinned to `core` when given.
///
/// A failed pin is logged and the thread keeps running unpinned.
pub fn spawn_pinned<F>(core: Option<usize>, name: &str, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let thread_name = name.to_string();
    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            if let Some(id) = core {
                if core_affinity::set_for_current(CoreId { id }) {
                    debug!(thread = %thread_name, core = id, "pinned thread");
                } else {
                    warn!(thread = %thread_name, core = id, "failed to pin thread");
                }
            }
            body();
        })
        .map_err(|source| Error::Spawn {
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_spawn_named_unpinned() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let handle = spawn_pinned(None, "kairos/test", move || {
            assert_eq!(std::thread::current().name(), Some("kairos/test"));
            flag.store(true, Ordering::Release);
        })
        .unwrap();
        handle.join().unwrap();
        assert!(ran.load(Ordering::Acquire));
    }
}
