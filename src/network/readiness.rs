//! Kernel readiness notification behind a small capability trait.
//!
//! The [`Reactor`](super::Reactor) only needs to register read and write
//! interest and to collect ready events without blocking. [`MioReadiness`]
//! provides that through mio (epoll on Linux, kqueue on BSD/macOS).

use std::io;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

/// Upper bound on events collected per poll.
pub const EVENTS_CAPACITY: usize = 1024;

/// One readiness notification, backend independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// Error or hang-up reported for the descriptor.
    pub error: bool,
}

pub trait Readiness {
    /// Start watching `source` for read readiness.
    fn register_read(&mut self, source: &mut dyn Source, token: Token) -> io::Result<()>;

    /// Watch an already registered `source` for write readiness as well.
    fn register_write(&mut self, source: &mut dyn Source, token: Token) -> io::Result<()>;

    fn deregister(&mut self, source: &mut dyn Source) -> io::Result<()>;

    /// Collect up to `max_events` ready events into `ready` without
    /// blocking. `ready` is cleared first.
    fn poll(&mut self, max_events: usize, ready: &mut Vec<ReadyEvent>) -> io::Result<()>;
}

pub struct MioReadiness {
    poll: Poll,
    events: Events,
}

impl MioReadiness {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
        })
    }
}

impl Readiness for MioReadiness {
    fn register_read(&mut self, source: &mut dyn Source, token: Token) -> io::Result<()> {
        self.poll
            .registry()
            .register(source, token, Interest::READABLE)
    }

    fn register_write(&mut self, source: &mut dyn Source, token: Token) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(source, token, Interest::READABLE | Interest::WRITABLE)
    }

    fn deregister(&mut self, source: &mut dyn Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    fn poll(&mut self, max_events: usize, ready: &mut Vec<ReadyEvent>) -> io::Result<()> {
        ready.clear();

        // Zero timeout: busy-poll for latency, not CPU
        match self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        ready.extend(self.events.iter().take(max_events).map(|event| ReadyEvent {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            error: event.is_error() || event.is_read_closed(),
        }));
        Ok(())
    }
}
