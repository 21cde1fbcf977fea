//! Reactor: single-threaded readiness loop over many TCP sockets
//!
//! Driven by the application with two calls per tick:
//! - [`Reactor::poll`] collects readiness, sorts sockets into the
//!   read-interest and write-interest sets and accepts new connections.
//! - [`Reactor::send_and_recv`] runs one I/O step on every socket in those
//!   sets and fires the batch callback once if anything arrived.
//!
//! The reactor owns every accepted or added socket. A socket that reports
//! EOF or a hard error is deregistered and dropped at the end of the tick.

use std::collections::HashMap;
use std::net::SocketAddr;

use mio::net::TcpListener;
use mio::Token;
use tracing::{debug, info, warn};

use super::config::SocketConfig;
use super::readiness::{MioReadiness, Readiness, ReadyEvent};
use super::tcp_socket::{RecvCallback, TcpSocket};
use crate::error::{Error, Result};
use crate::util::Nanos;

const LISTENER_TOKEN: Token = Token(0);

/// Fired once per tick in which at least one socket received bytes.
pub type RecvFinishedCallback = Box<dyn FnMut()>;

pub struct Reactor<B: Readiness = MioReadiness> {
    backend: B,
    listener: TcpListener,
    local_addr: SocketAddr,
    sockets: HashMap<Token, TcpSocket>,
    receive_sockets: Vec<Token>,
    send_sockets: Vec<Token>,
    // Reused between polls to avoid per-tick allocation
    events: Vec<ReadyEvent>,
    next_token: usize,
    buffer_size: usize,
    needs_timestamp: bool,
    recv_callback: Option<RecvCallback<TcpSocket>>,
    recv_finished_callback: Option<RecvFinishedCallback>,
}

impl Reactor<MioReadiness> {
    /// Listen on `port` at the IPv4 address of interface `iface`.
    pub fn listen(iface: &str, port: u16) -> Result<Self> {
        let config = SocketConfig {
            iface: iface.to_string(),
            port,
            is_listening: true,
            ..Default::default()
        };
        Self::listen_on(&config)
    }

    pub fn listen_on(config: &SocketConfig) -> Result<Self> {
        let backend = MioReadiness::new().map_err(Error::setup("create event queue"))?;
        Self::with_backend(backend, config)
    }
}

impl<B: Readiness> Reactor<B> {
    /// Bind and listen as described by `config`, register the listener with
    /// `backend`. Accepted sockets inherit `buffer_size` and
    /// `needs_receive_timestamp` from `config`.
    pub fn with_backend(mut backend: B, config: &SocketConfig) -> Result<Self> {
        if config.is_datagram {
            return Err(Error::InvalidConfig(format!(
                "reactor listener must be a stream socket: {}",
                config
            )));
        }
        let addr = config.socket_addr()?;

        // mio sets SO_REUSEADDR and listens with a backlog of 1024
        let mut listener = TcpListener::bind(addr).map_err(Error::setup("bind/listen"))?;
        backend
            .register_read(&mut listener, LISTENER_TOKEN)
            .map_err(Error::setup("register listener"))?;
        let local_addr = listener.local_addr().map_err(Error::setup("getsockname"))?;

        info!(%local_addr, %config, "reactor listening");

        Ok(Self {
            backend,
            listener,
            local_addr,
            sockets: HashMap::new(),
            receive_sockets: Vec::new(),
            send_sockets: Vec::new(),
            events: Vec::new(),
            next_token: LISTENER_TOKEN.0 + 1,
            buffer_size: config.buffer_size,
            needs_timestamp: config.needs_receive_timestamp,
            recv_callback: None,
            recv_finished_callback: None,
        })
    }

    /// Callback for new inbound bytes on any socket owned by the reactor.
    pub fn set_recv_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut TcpSocket, Nanos) + 'static,
    {
        self.recv_callback = Some(Box::new(callback));
    }

    pub fn set_recv_finished_callback<F>(&mut self, callback: F)
    where
        F: FnMut() + 'static,
    {
        self.recv_finished_callback = Some(Box::new(callback));
    }

    /// Collect readiness and accept pending connections. Never blocks.
    pub fn poll(&mut self) -> Result<()> {
        let max_events = 1 + self.sockets.len();
        let mut events = std::mem::take(&mut self.events);
        let polled = self.backend.poll(max_events, &mut events);
        if let Err(e) = polled {
            self.events = events;
            return Err(Error::Setup { step: "poll", source: e });
        }

        let mut have_new_connection = false;
        for event in &events {
            if event.token == LISTENER_TOKEN {
                have_new_connection = true;
                continue;
            }
            if !self.sockets.contains_key(&event.token) {
                continue;
            }
            // An error is surfaced as readable so the next read observes it
            if event.readable || event.error {
                add_unique(&mut self.receive_sockets, event.token);
            }
            if event.writable {
                add_unique(&mut self.send_sockets, event.token);
            }
        }
        self.events = events;

        if have_new_connection {
            self.accept_pending()?;
        }
        Ok(())
    }

    /// One I/O step for every socket in the interest sets.
    pub fn send_and_recv(&mut self) {
        let mut noop = |_: &mut TcpSocket, _: Nanos| {};
        let on_recv: &mut dyn FnMut(&mut TcpSocket, Nanos) = match self.recv_callback.as_mut() {
            Some(cb) => &mut **cb,
            None => &mut noop,
        };

        let mut received = false;
        for token in &self.receive_sockets {
            if let Some(socket) = self.sockets.get_mut(token) {
                received |= socket.send_and_recv_with(on_recv);
            }
        }

        if received {
            if let Some(cb) = self.recv_finished_callback.as_mut() {
                cb();
            }
        }

        for token in &self.send_sockets {
            if let Some(socket) = self.sockets.get_mut(token) {
                socket.send_and_recv_with(on_recv);
            }
        }

        self.reap_closed();
    }

    /// Hand an application-created socket to the reactor.
    pub fn add_socket(&mut self, mut socket: TcpSocket) -> Result<Token> {
        let token = Token(self.next_token);
        self.next_token += 1;

        self.backend
            .register_read(&mut socket, token)
            .map_err(Error::setup("register socket"))?;
        self.sockets.insert(token, socket);
        add_unique(&mut self.receive_sockets, token);
        Ok(token)
    }

    /// Also watch `token` for write readiness. Returns `false` for an
    /// unknown token.
    pub fn enable_write(&mut self, token: Token) -> Result<bool> {
        match self.sockets.get_mut(&token) {
            Some(socket) => {
                self.backend
                    .register_write(socket, token)
                    .map_err(Error::setup("register write interest"))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn socket_mut(&mut self, token: Token) -> Option<&mut TcpSocket> {
        self.sockets.get_mut(&token)
    }

    pub fn receive_interest(&self) -> &[Token] {
        &self.receive_sockets
    }

    pub fn send_interest(&self) -> &[Token] {
        &self.send_sockets
    }

    pub fn connection_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn accept_pending(&mut self) -> Result<()> {
        loop {
            match self.listener.accept() {
                // mio hands back the stream already in non-blocking mode
                Ok((stream, peer)) => {
                    let socket = TcpSocket::from_stream(stream, self.buffer_size, self.needs_timestamp)?;
                    let token = self.add_socket(socket)?;
                    info!(%peer, token = token.0, "accepted connection");
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
        Ok(())
    }

    fn reap_closed(&mut self) {
        if !self.sockets.values().any(TcpSocket::is_closed) {
            return;
        }

        let closed: Vec<Token> = self
            .sockets
            .iter()
            .filter(|(_, socket)| socket.is_closed())
            .map(|(token, _)| *token)
            .collect();

        for token in closed {
            if let Some(mut socket) = self.sockets.remove(&token) {
                if let Err(e) = self.backend.deregister(&mut socket) {
                    debug!(token = token.0, error = %e, "deregister failed");
                }
            }
            self.receive_sockets.retain(|t| *t != token);
            self.send_sockets.retain(|t| *t != token);
            info!(token = token.0, "connection closed");
        }
    }
}

#[inline]
fn add_unique(set: &mut Vec<Token>, token: Token) {
    if !set.contains(&token) {
        set.push(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::rc::Rc;
    use std::cell::RefCell;

    /// Backend that replays scripted events.
    #[derive(Default)]
    struct ScriptedReadiness {
        script: Rc<RefCell<Vec<ReadyEvent>>>,
        max_seen: Rc<RefCell<Vec<usize>>>,
    }

    impl Readiness for ScriptedReadiness {
        fn register_read(&mut self, _: &mut dyn mio::event::Source, _: Token) -> io::Result<()> {
            Ok(())
        }

        fn register_write(&mut self, _: &mut dyn mio::event::Source, _: Token) -> io::Result<()> {
            Ok(())
        }

        fn deregister(&mut self, _: &mut dyn mio::event::Source) -> io::Result<()> {
            Ok(())
        }

        fn poll(&mut self, max_events: usize, ready: &mut Vec<ReadyEvent>) -> io::Result<()> {
            self.max_seen.borrow_mut().push(max_events);
            ready.clear();
            ready.extend(self.script.borrow_mut().drain(..));
            Ok(())
        }
    }

    fn loopback() -> SocketConfig {
        SocketConfig {
            ip: "127.0.0.1".into(),
            is_listening: true,
            buffer_size: 4096,
            ..Default::default()
        }
    }

    fn event(token: Token, readable: bool, writable: bool, error: bool) -> ReadyEvent {
        ReadyEvent {
            token,
            readable,
            writable,
            error,
        }
    }

    fn client_for(reactor: &Reactor<ScriptedReadiness>) -> TcpSocket {
        TcpSocket::connect(&SocketConfig {
            ip: "127.0.0.1".into(),
            port: reactor.local_addr().port(),
            buffer_size: 4096,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_events_sort_into_interest_sets() {
        let backend = ScriptedReadiness::default();
        let script = Rc::clone(&backend.script);
        let mut reactor = Reactor::with_backend(backend, &loopback()).unwrap();

        let a = reactor.add_socket(client_for(&reactor)).unwrap();
        let b = reactor.add_socket(client_for(&reactor)).unwrap();
        assert_eq!(reactor.receive_interest(), &[a, b]);

        script.borrow_mut().extend([
            event(a, true, false, false),
            event(b, false, true, false),
            event(b, false, true, false),
            event(Token(999), true, true, false),
        ]);
        reactor.poll().unwrap();

        assert_eq!(reactor.receive_interest(), &[a, b]);
        assert_eq!(reactor.send_interest(), &[b]);
    }

    #[test]
    fn test_error_event_counts_as_readable() {
        let backend = ScriptedReadiness::default();
        let script = Rc::clone(&backend.script);
        let mut reactor = Reactor::with_backend(backend, &loopback()).unwrap();

        let token = reactor.add_socket(client_for(&reactor)).unwrap();
        reactor.receive_sockets.clear();

        script.borrow_mut().push(event(token, false, false, true));
        reactor.poll().unwrap();
        assert_eq!(reactor.receive_interest(), &[token]);
    }

    #[test]
    fn test_poll_bound_tracks_socket_count() {
        let backend = ScriptedReadiness::default();
        let seen = Rc::clone(&backend.max_seen);
        let mut reactor = Reactor::with_backend(backend, &loopback()).unwrap();

        reactor.poll().unwrap();
        reactor.add_socket(client_for(&reactor)).unwrap();
        reactor.add_socket(client_for(&reactor)).unwrap();
        reactor.poll().unwrap();

        assert_eq!(*seen.borrow(), vec![1, 3]);
    }

    #[test]
    fn test_rejects_datagram_listener() {
        let mut cfg = loopback();
        cfg.is_datagram = true;
        assert!(matches!(
            Reactor::with_backend(ScriptedReadiness::default(), &cfg),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_enable_write_unknown_token() {
        let mut reactor = Reactor::with_backend(ScriptedReadiness::default(), &loopback()).unwrap();
        assert!(!reactor.enable_write(Token(42)).unwrap());
    }
}
