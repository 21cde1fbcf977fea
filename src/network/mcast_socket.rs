//! Non-blocking UDP socket for multicast market data.
//!
//! Same buffering and per-tick [`send_and_recv`](McastSocket::send_and_recv)
//! contract as [`TcpSocket`](super::TcpSocket). A listening socket binds to
//! the configured address and port and joins groups with
//! [`join`](McastSocket::join); a publishing socket connects to the group.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::AsRawFd;

use mio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use super::buffers::{ReadOutcome, SocketBuffers};
use super::config::SocketConfig;
use super::sys;
use super::tcp_socket::RecvCallback;
use crate::error::{Error, Result};
use crate::util::Nanos;

pub struct McastSocket {
    // None after leave()
    socket: Option<UdpSocket>,
    buffers: SocketBuffers,
    needs_timestamp: bool,
    recv_callback: Option<RecvCallback<McastSocket>>,
}

impl McastSocket {
    /// Create the datagram socket described by `config`.
    ///
    /// The transport is always datagram regardless of `config.is_datagram`.
    pub fn init(config: &SocketConfig) -> Result<Self> {
        let addr = config.socket_addr()?;
        debug!(%config, "creating multicast socket");

        let socket = if config.is_listening {
            UdpSocket::bind(addr).map_err(Error::setup("bind"))?
        } else {
            let any = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
            let socket = UdpSocket::bind(any).map_err(Error::setup("bind"))?;
            socket.connect(addr).map_err(Error::setup("connect"))?;
            socket
        };

        let fd = socket.as_raw_fd();
        sys::set_no_sigpipe(fd).map_err(Error::setup("SO_NOSIGPIPE"))?;
        if config.needs_receive_timestamp {
            sys::set_so_timestamp(fd).map_err(Error::setup("SO_TIMESTAMP"))?;
        }

        Ok(Self {
            socket: Some(socket),
            buffers: SocketBuffers::with_capacity(config.buffer_size),
            needs_timestamp: config.needs_receive_timestamp,
            recv_callback: None,
        })
    }

    /// Add membership of multicast `group` on the default interface.
    pub fn join(&self, group: Ipv4Addr) -> Result<()> {
        let socket = self.open_socket()?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(Error::setup("IP_ADD_MEMBERSHIP"))?;
        info!(%group, fd = socket.as_raw_fd(), "joined multicast group");
        Ok(())
    }

    /// Drop membership of `group` and close the descriptor.
    pub fn leave(&mut self, group: Ipv4Addr) {
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.leave_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
                debug!(%group, error = %e, "leave multicast group failed");
            }
            info!(%group, fd = socket.as_raw_fd(), "left multicast group, socket closed");
        }
    }

    pub fn set_recv_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut McastSocket, Nanos) + 'static,
    {
        self.recv_callback = Some(Box::new(callback));
    }

    /// Queue `data` for the next [`send_and_recv`](Self::send_and_recv).
    ///
    /// Fatal if the outbound buffer cannot hold it.
    #[inline]
    pub fn send(&mut self, data: &[u8]) {
        self.buffers.append_outbound(data);
    }

    /// One non-blocking receive (firing the callback on new bytes), then one
    /// non-blocking send of everything queued. Returns whether bytes arrived.
    pub fn send_and_recv(&mut self) -> bool {
        let fd = match self.socket.as_ref() {
            Some(socket) => socket.as_raw_fd(),
            None => return false,
        };

        let received = match self.buffers.fill_read_buffer(fd, self.needs_timestamp) {
            Ok(ReadOutcome::Received { bytes, rx_time }) => {
                trace!(fd, bytes, unconsumed = self.buffers.inbound().len(), "read socket");
                let mut callback = self.recv_callback.take();
                if let Some(cb) = callback.as_mut() {
                    cb(self, rx_time);
                }
                if self.recv_callback.is_none() {
                    self.recv_callback = callback;
                }
                true
            }
            // Empty datagrams carry nothing for the callback
            Ok(ReadOutcome::Empty) | Ok(ReadOutcome::Eof) => false,
            Err(e) => {
                debug!(fd, error = %e, "multicast read failed");
                false
            }
        };

        if !self.buffers.outbound().is_empty() {
            match self.buffers.flush_write_buffer(fd) {
                Ok(sent) => trace!(fd, sent, remaining = self.buffers.outbound().len(), "send socket"),
                Err(e) => {
                    warn!(fd, error = %e, dropped = self.buffers.outbound().len(), "multicast send failed");
                    self.buffers.clear_outbound();
                }
            }
        }

        received
    }

    #[inline(always)]
    pub fn inbound(&self) -> &[u8] {
        self.buffers.inbound()
    }

    #[inline(always)]
    pub fn consume(&mut self, n: usize) {
        self.buffers.consume_inbound(n);
    }

    #[inline(always)]
    pub fn pending_outbound(&self) -> usize {
        self.buffers.outbound().len()
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.open_socket()
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))?
            .local_addr()
    }

    fn open_socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("multicast socket already closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener() -> McastSocket {
        McastSocket::init(&SocketConfig {
            ip: "127.0.0.1".into(),
            is_datagram: true,
            is_listening: true,
            buffer_size: 1024,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_leave_closes() {
        let mut socket = listener();
        assert!(socket.is_open());
        socket.leave(Ipv4Addr::new(239, 1, 1, 1));
        assert!(!socket.is_open());
        assert!(!socket.send_and_recv());
        assert!(socket.local_addr().is_err());
        assert!(socket.join(Ipv4Addr::new(239, 1, 1, 1)).is_err());
    }

    #[test]
    fn test_idle_tick_receives_nothing() {
        let mut socket = listener();
        let fired = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = std::rc::Rc::clone(&fired);
        socket.set_recv_callback(move |_, _| counter.set(counter.get() + 1));

        for _ in 0..5 {
            assert!(!socket.send_and_recv());
        }
        assert_eq!(fired.get(), 0);
    }
}
