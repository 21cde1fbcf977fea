//! Asynchronous logger on top of the SPSC ring buffer
//!
//! The producer thread only copies small [`LogElement`]s into the ring; a
//! dedicated flush thread turns them into text, writes them to the log file,
//! flushes, then sleeps for `flush_interval`. Formatting and file I/O never
//! happen on the caller's thread.
//!
//! One producer per logger. `AsyncLogger` is `Send` but the push methods take
//! `&mut self`, so the single-producer rule is checked by the borrow checker.

mod element;

pub use element::{LogElement, Loggable};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

use crate::core::{fatal, Consumer, Producer, RingBuffer};
use crate::error::{Error, Result};
use crate::util::spawn_pinned;

/// Default ring capacity, in elements.
pub const LOG_QUEUE_SIZE: usize = 8 * 1024 * 1024;

/// Logger settings.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Output file, truncated on open.
    pub path: PathBuf,
    pub queue_capacity: usize,
    /// Sleep between drain passes of the flush thread.
    pub flush_interval: Duration,
    /// Granularity of the shutdown wait for the ring to drain.
    pub drain_poll_interval: Duration,
    /// CPU core for the flush thread, `None` for no affinity.
    pub core: Option<usize>,
}

impl LoggerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            queue_capacity: LOG_QUEUE_SIZE,
            flush_interval: Duration::from_millis(10),
            drain_poll_interval: Duration::from_secs(1),
            core: None,
        }
    }
}

/// File logger with a background flush thread.
///
/// # Example
/// ```no_run
/// use kairos::log_fmt;
/// use kairos::logger::AsyncLogger;
///
/// let mut logger = AsyncLogger::new("engine.log").unwrap();
/// log_fmt!(logger, "order % filled at %\n", 17u64, 101.25);
/// ```
pub struct AsyncLogger {
    path: PathBuf,
    producer: Producer<LogElement>,
    running: Arc<AtomicBool>,
    drain_poll_interval: Duration,
    flusher: Option<JoinHandle<()>>,
}

impl AsyncLogger {
    /// Logger with default settings writing to `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(LoggerConfig::new(path.as_ref()))
    }

    pub fn with_config(config: LoggerConfig) -> Result<Self> {
        let file = File::create(&config.path).map_err(|source| Error::LogFile {
            path: config.path.clone(),
            source,
        })?;
        let writer = BufWriter::new(file);

        let (producer, consumer) = RingBuffer::with_capacity(config.queue_capacity).split();
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let interval = config.flush_interval;
        let name = format!("kairos/logger {}", config.path.display());
        let flusher = spawn_pinned(config.core, &name, move || {
            flush_queue(consumer, writer, flag, interval);
        })?;

        info!(path = %config.path.display(), capacity = config.queue_capacity, "logger started");

        Ok(Self {
            path: config.path,
            producer,
            running,
            drain_poll_interval: config.drain_poll_interval,
            flusher: Some(flusher),
        })
    }

    /// Enqueue a single element.
    #[inline(always)]
    pub fn push_element(&mut self, element: LogElement) {
        *self.producer.next_to_write() = element;
        self.producer.update_write_index();
    }

    /// Enqueue any loggable value.
    #[inline(always)]
    pub fn push<V: Loggable + ?Sized>(&mut self, value: &V) {
        value.push_to(self);
    }

    /// Substitute each `%` in `format` with the next argument.
    ///
    /// `%%` is a literal `%`. A placeholder without an argument, or an
    /// argument without a placeholder, is fatal; the check runs before
    /// anything is enqueued.
    pub fn log(&mut self, format: &str, args: &[&dyn Loggable]) {
        let placeholders = count_placeholders(format);
        if placeholders < args.len() {
            fatal("extra arguments provided to log()");
        }
        if placeholders > args.len() {
            fatal("missing arguments to log()");
        }

        let mut args = args.iter();
        let mut chars = format.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '%' {
                if chars.peek() == Some(&'%') {
                    chars.next();
                } else if let Some(arg) = args.next() {
                    arg.push_to(self);
                    continue;
                }
            }
            self.push_element(LogElement::Char(c));
        }
    }

    /// Elements pushed but not yet written out by the flush thread.
    pub fn pending(&self) -> usize {
        self.producer.size()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AsyncLogger {
    fn drop(&mut self) {
        info!(path = %self.path.display(), "flushing and closing logger");

        while self.producer.size() > 0 {
            if self.flusher.as_ref().map_or(true, |h| h.is_finished()) {
                error!(path = %self.path.display(), pending = self.producer.size(), "flush thread gone, dropping pending log elements");
                break;
            }
            thread::sleep(self.drain_poll_interval);
        }

        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.flusher.take() {
            if handle.join().is_err() {
                error!(path = %self.path.display(), "logger flush thread panicked");
            }
        }

        info!(path = %self.path.display(), "logger exiting");
    }
}

fn count_placeholders(format: &str) -> usize {
    let mut count = 0;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            if chars.peek() == Some(&'%') {
                chars.next();
            } else {
                count += 1;
            }
        }
    }
    count
}

fn flush_queue(
    mut consumer: Consumer<LogElement>,
    mut writer: BufWriter<File>,
    running: Arc<AtomicBool>,
    interval: Duration,
) {
    while running.load(Ordering::Acquire) {
        drain(&mut consumer, &mut writer);
        if let Err(e) = writer.flush() {
            error!("log flush failed: {}", e);
        }
        thread::sleep(interval);
    }

    // Shutdown waited for an empty ring, but pick up anything racing the stop flag
    drain(&mut consumer, &mut writer);
    if let Err(e) = writer.flush() {
        error!("log flush failed: {}", e);
    }
}

fn drain(consumer: &mut Consumer<LogElement>, writer: &mut BufWriter<File>) {
    while let Some(element) = consumer.next_to_read().copied() {
        if let Err(e) = write!(writer, "{}", element) {
            error!("log write failed: {}", e);
        }
        consumer.update_read_index();
    }
}

/// `log_fmt!(logger, "a=% b=%", 1, "x")` expands to [`AsyncLogger::log`].
#[macro_export]
macro_rules! log_fmt {
    ($logger:expr, $format:expr $(, $arg:expr)* $(,)?) => {
        $logger.log($format, &[$(&$arg as &dyn $crate::logger::Loggable),*])
    };
}
