//! Non-blocking TCP socket with pre-allocated buffers.
//!
//! All I/O happens in [`TcpSocket::send_and_recv`], called once per tick by
//! the owner (usually the [`Reactor`](super::Reactor)). [`TcpSocket::send`]
//! only copies into the outbound buffer.

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};

use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use tracing::{debug, trace, warn};

use super::buffers::{ReadOutcome, SocketBuffers};
use super::config::SocketConfig;
use super::sys;
use crate::error::{Error, Result};
use crate::util::Nanos;

/// Fired synchronously when new bytes arrive. The callback sees every
/// unconsumed inbound byte and is responsible for calling `consume`.
pub type RecvCallback<S> = Box<dyn FnMut(&mut S, Nanos)>;

pub struct TcpSocket {
    stream: TcpStream,
    buffers: SocketBuffers,
    needs_timestamp: bool,
    closed: bool,
    recv_callback: Option<RecvCallback<TcpSocket>>,
}

impl TcpSocket {
    /// Start a non-blocking connect to `config`'s address.
    ///
    /// The connection completes in the background; bytes queued with
    /// [`send`](Self::send) go out on the first tick after it does.
    pub fn connect(config: &SocketConfig) -> Result<Self> {
        if config.is_datagram || config.is_listening {
            return Err(Error::InvalidConfig(format!(
                "tcp client needs a stream, connect-role config: {}",
                config
            )));
        }
        let addr = config.socket_addr()?;
        debug!(%config, "connecting tcp socket");

        let stream = TcpStream::connect(addr).map_err(Error::setup("connect"))?;
        Self::from_stream(stream, config.buffer_size, config.needs_receive_timestamp)
    }

    /// Wrap an already non-blocking stream (fresh from `connect` or `accept`).
    pub(crate) fn from_stream(stream: TcpStream, buffer_size: usize, needs_timestamp: bool) -> Result<Self> {
        stream.set_nodelay(true).map_err(Error::setup("disable nagle"))?;

        let fd = stream.as_raw_fd();
        sys::set_no_sigpipe(fd).map_err(Error::setup("SO_NOSIGPIPE"))?;
        if needs_timestamp {
            sys::set_so_timestamp(fd).map_err(Error::setup("SO_TIMESTAMP"))?;
        }

        Ok(Self {
            stream,
            buffers: SocketBuffers::with_capacity(buffer_size),
            needs_timestamp,
            closed: false,
            recv_callback: None,
        })
    }

    pub fn set_recv_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut TcpSocket, Nanos) + 'static,
    {
        self.recv_callback = Some(Box::new(callback));
    }

    /// Queue `data` for the next [`send_and_recv`](Self::send_and_recv).
    ///
    /// Fatal if the outbound buffer cannot hold it. Dropped once the socket
    /// is closed.
    #[inline]
    pub fn send(&mut self, data: &[u8]) {
        if self.closed {
            trace!(fd = self.stream.as_raw_fd(), bytes = data.len(), "send on closed socket dropped");
            return;
        }
        self.buffers.append_outbound(data);
    }

    /// One tick of I/O using this socket's own receive callback.
    ///
    /// Returns whether any bytes were received.
    pub fn send_and_recv(&mut self) -> bool {
        let mut callback = self.recv_callback.take();
        let received = match callback.as_mut() {
            Some(cb) => self.send_and_recv_with(&mut **cb),
            None => self.send_and_recv_with(&mut |_: &mut TcpSocket, _: Nanos| {}),
        };
        // The callback may have installed a replacement
        if self.recv_callback.is_none() {
            self.recv_callback = callback;
        }
        received
    }

    /// One tick of I/O: a non-blocking receive (firing `on_recv` if bytes
    /// arrived), then a non-blocking send of any queued bytes.
    pub fn send_and_recv_with(&mut self, on_recv: &mut dyn FnMut(&mut TcpSocket, Nanos)) -> bool {
        if self.closed {
            return false;
        }
        let fd = self.stream.as_raw_fd();

        let received = match self.buffers.fill_read_buffer(fd, self.needs_timestamp) {
            Ok(ReadOutcome::Received { bytes, rx_time }) => {
                trace!(fd, bytes, unconsumed = self.buffers.inbound().len(), "read socket");
                on_recv(self, rx_time);
                true
            }
            Ok(ReadOutcome::Empty) => false,
            Ok(ReadOutcome::Eof) => {
                debug!(fd, "peer closed connection");
                self.closed = true;
                false
            }
            Err(e) => {
                debug!(fd, error = %e, "read failed, closing socket");
                self.closed = true;
                false
            }
        };

        if self.closed {
            self.buffers.clear_outbound();
            return received;
        }

        if !self.buffers.outbound().is_empty() {
            match self.buffers.flush_write_buffer(fd) {
                Ok(sent) => trace!(fd, sent, remaining = self.buffers.outbound().len(), "send socket"),
                Err(e) => {
                    warn!(fd, error = %e, dropped = self.buffers.outbound().len(), "send failed, closing socket");
                    self.buffers.clear_outbound();
                    self.closed = true;
                }
            }
        }

        received
    }

    /// Received bytes not yet consumed.
    #[inline(always)]
    pub fn inbound(&self) -> &[u8] {
        self.buffers.inbound()
    }

    #[inline(always)]
    pub fn consume(&mut self, n: usize) {
        self.buffers.consume_inbound(n);
    }

    /// Bytes queued but not yet accepted by the OS.
    #[inline(always)]
    pub fn pending_outbound(&self) -> usize {
        self.buffers.outbound().len()
    }

    /// Set once the peer closed or a hard I/O error occurred.
    #[inline(always)]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }
}

impl AsRawFd for TcpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl Source for TcpSocket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}
