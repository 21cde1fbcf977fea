//! Socket integration tests: TCP against a plain std peer, UDP via loopback

use std::cell::{Cell, RefCell};
use std::io::{Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::rc::Rc;
use std::time::{Duration, Instant};

use kairos::network::{McastSocket, SocketConfig, TcpSocket};

const TIMEOUT: Duration = Duration::from_secs(5);

fn tcp_pair() -> (TcpSocket, std::net::TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let socket = TcpSocket::connect(&SocketConfig {
        ip: "127.0.0.1".into(),
        port: listener.local_addr().unwrap().port(),
        buffer_size: 4096,
        ..Default::default()
    })
    .unwrap();
    let (peer, _) = listener.accept().unwrap();
    peer.set_read_timeout(Some(TIMEOUT)).unwrap();
    (socket, peer)
}

#[test]
fn test_send_is_deferred_until_tick() {
    let (mut socket, mut peer) = tcp_pair();
    peer.set_nonblocking(true).unwrap();

    socket.send(b"abc");
    socket.send(b"def");
    assert_eq!(socket.pending_outbound(), 6);

    let mut buf = [0u8; 16];
    assert!(peer.read(&mut buf).is_err(), "bytes left before send_and_recv");

    let deadline = Instant::now() + TIMEOUT;
    while socket.pending_outbound() > 0 {
        assert!(Instant::now() < deadline);
        socket.send_and_recv();
    }

    peer.set_nonblocking(false).unwrap();
    let mut got = [0u8; 6];
    peer.read_exact(&mut got).unwrap();
    assert_eq!(&got, b"abcdef");
}

#[test]
fn test_callback_only_on_new_bytes() {
    let (mut socket, mut peer) = tcp_pair();

    let fired = Rc::new(Cell::new(0));
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let fired = Rc::clone(&fired);
        let seen = Rc::clone(&seen);
        socket.set_recv_callback(move |s: &mut TcpSocket, _| {
            fired.set(fired.get() + 1);
            seen.borrow_mut().extend_from_slice(s.inbound());
            let n = s.inbound().len();
            s.consume(n);
        });
    }

    for _ in 0..10 {
        assert!(!socket.send_and_recv());
    }
    assert_eq!(fired.get(), 0);

    peer.write_all(b"fill 100@42").unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while seen.borrow().len() < 11 {
        assert!(Instant::now() < deadline, "bytes never arrived");
        socket.send_and_recv();
    }
    assert!(fired.get() >= 1);
    assert_eq!(&seen.borrow()[..], b"fill 100@42");
    assert!(socket.inbound().is_empty());
}

#[test]
fn test_unconsumed_bytes_stay_visible() {
    let (mut socket, mut peer) = tcp_pair();
    socket.set_recv_callback(|s: &mut TcpSocket, _| {
        // Consume one complete 4-byte frame at a time
        if s.inbound().len() >= 4 {
            s.consume(4);
        }
    });

    peer.write_all(b"AAAABB").unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while socket.inbound() != b"BB" {
        assert!(Instant::now() < deadline, "partial frame not retained");
        socket.send_and_recv();
    }
}

#[test]
fn test_peer_close_marks_socket_closed() {
    let (mut socket, peer) = tcp_pair();
    drop(peer);

    let deadline = Instant::now() + TIMEOUT;
    while !socket.is_closed() {
        assert!(Instant::now() < deadline, "close never observed");
        socket.send_and_recv();
    }
    // More than the 4096-byte outbound buffer holds: dropped, never fatal
    for _ in 0..10 {
        socket.send(&[0u8; 1000]);
    }
    assert_eq!(socket.pending_outbound(), 0);
    assert!(!socket.send_and_recv());
}

#[test]
fn test_partial_send_keeps_remainder_in_order() {
    const TOTAL: usize = 16 * 1024 * 1024;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut socket = TcpSocket::connect(&SocketConfig {
        ip: "127.0.0.1".into(),
        port: listener.local_addr().unwrap().port(),
        buffer_size: TOTAL,
        ..Default::default()
    })
    .unwrap();
    let (mut peer, _) = listener.accept().unwrap();

    let payload: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
    socket.send(&payload);
    assert_eq!(socket.pending_outbound(), TOTAL);

    // Peer is not reading yet, so the kernel takes only part of it
    socket.send_and_recv();
    let pending = socket.pending_outbound();
    assert!(pending > 0 && pending < TOTAL, "pending after first tick: {}", pending);

    let reader = std::thread::spawn(move || {
        peer.set_read_timeout(Some(TIMEOUT)).unwrap();
        let mut got = vec![0u8; TOTAL];
        peer.read_exact(&mut got).unwrap();
        got
    });

    let deadline = Instant::now() + Duration::from_secs(20);
    while socket.pending_outbound() > 0 {
        assert!(Instant::now() < deadline, "backlog never drained");
        socket.send_and_recv();
        assert!(!socket.is_closed());
    }

    let got = reader.join().unwrap();
    assert!(got == payload, "peer received bytes out of order or corrupted");
}

#[test]
fn test_kernel_timestamp_on_receive() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut socket = TcpSocket::connect(&SocketConfig {
        ip: "127.0.0.1".into(),
        port: listener.local_addr().unwrap().port(),
        needs_receive_timestamp: true,
        buffer_size: 4096,
        ..Default::default()
    })
    .unwrap();
    let (mut peer, _) = listener.accept().unwrap();

    let stamp = Rc::new(Cell::new(0i64));
    {
        let stamp = Rc::clone(&stamp);
        socket.set_recv_callback(move |s: &mut TcpSocket, rx_time| {
            stamp.set(rx_time);
            let n = s.inbound().len();
            s.consume(n);
        });
    }

    let before = kairos::util::now_nanos();
    peer.write_all(b"x").unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while stamp.get() == 0 {
        assert!(Instant::now() < deadline);
        socket.send_and_recv();
    }
    // Microsecond kernel resolution
    assert!(stamp.get() >= before - 1_000);
    assert!(stamp.get() <= kairos::util::now_nanos());
}

#[test]
fn test_udp_unicast_loopback() {
    let mut rx = McastSocket::init(&SocketConfig {
        ip: "127.0.0.1".into(),
        is_datagram: true,
        is_listening: true,
        buffer_size: 4096,
        ..Default::default()
    })
    .unwrap();
    let port = rx.local_addr().unwrap().port();

    let received = Rc::new(RefCell::new(Vec::new()));
    {
        let received = Rc::clone(&received);
        rx.set_recv_callback(move |s: &mut McastSocket, _| {
            received.borrow_mut().extend_from_slice(s.inbound());
            let n = s.inbound().len();
            s.consume(n);
        });
    }

    let mut tx = McastSocket::init(&SocketConfig {
        ip: "127.0.0.1".into(),
        port,
        is_datagram: true,
        buffer_size: 4096,
        ..Default::default()
    })
    .unwrap();
    tx.send(b"BID 101.5");
    tx.send_and_recv();
    assert_eq!(tx.pending_outbound(), 0);

    let deadline = Instant::now() + TIMEOUT;
    while received.borrow().is_empty() {
        assert!(Instant::now() < deadline, "datagram never arrived");
        rx.send_and_recv();
    }
    assert_eq!(&received.borrow()[..], b"BID 101.5");
}

#[test]
fn test_udp_receives_from_plain_sender() {
    let mut rx = McastSocket::init(&SocketConfig {
        ip: "127.0.0.1".into(),
        is_datagram: true,
        is_listening: true,
        buffer_size: 4096,
        ..Default::default()
    })
    .unwrap();
    let addr = rx.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(b"one", addr).unwrap();
    sender.send_to(b"two", addr).unwrap();

    // One datagram per tick; both accumulate unless consumed
    let deadline = Instant::now() + TIMEOUT;
    while rx.inbound().len() < 6 {
        assert!(Instant::now() < deadline);
        rx.send_and_recv();
    }
    assert_eq!(rx.inbound(), b"onetwo");
}
