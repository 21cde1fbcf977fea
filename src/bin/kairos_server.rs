//! Kairos Echo Server
//!
//! Reactor-driven TCP echo server:
//! - Busy-poll reactor (mio, zero timeout)
//! - TCP_NODELAY on every accepted socket
//! - Hot-path logging via AsyncLogger, diagnostics via tracing
//!
//! Usage:
//!   cargo run --release --bin kairos_server [OPTIONS]

use std::cell::{Cell, RefCell};
use std::os::unix::io::AsRawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use kairos::log_fmt;
use kairos::logger::AsyncLogger;
use kairos::network::{Reactor, SocketConfig, TcpSocket};
use kairos::util::{current_time_str, now_nanos, Nanos};

const ECHO_CHUNK: usize = 4096;

/// Server configuration
struct ServerConfig {
    bind_ip: String,
    iface: String,
    port: u16,
    log_path: String,
    buffer_size: usize,
    verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: String::new(),
            iface: "lo".to_string(),
            port: 12345,
            log_path: "kairos_server.log".to_string(),
            buffer_size: 1024 * 1024,
            verbose: false,
        }
    }
}

impl ServerConfig {
    fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            ip: self.bind_ip.clone(),
            iface: self.iface.clone(),
            port: self.port,
            is_listening: true,
            buffer_size: self.buffer_size,
            ..Default::default()
        }
    }
}

#[derive(Default)]
struct ServerStats {
    bytes_echoed: Cell<u64>,
    batches: Cell<u64>,
}

impl ServerStats {
    fn print_stats(&self, uptime: Duration, connections: usize) {
        let bytes = self.bytes_echoed.get();
        let batches = self.batches.get();
        println!("\n📊 Server Stats (uptime: {:.1}s)", uptime.as_secs_f64());
        println!("   Bytes echoed:  {} KB", bytes / 1024);
        println!("   Batches:       {} ({:.1}/sec)", batches, batches as f64 / uptime.as_secs_f64());
        println!("   Connections:   {}", connections);
    }
}

/// Queue every unconsumed inbound byte back to the sender. Returns the
/// number of bytes echoed.
fn echo_inbound(socket: &mut TcpSocket) -> usize {
    let mut chunk = [0u8; ECHO_CHUNK];
    let mut echoed = 0;
    // The callback only fires on new bytes, so nothing may be left behind
    while !socket.inbound().is_empty() {
        let n = socket.inbound().len().min(ECHO_CHUNK);
        chunk[..n].copy_from_slice(&socket.inbound()[..n]);
        socket.consume(n);
        socket.send(&chunk[..n]);
        echoed += n;
    }
    echoed
}

fn run_server(config: ServerConfig) -> kairos::Result<()> {
    let logger = Rc::new(RefCell::new(AsyncLogger::new(&config.log_path)?));
    let stats = Rc::new(ServerStats::default());

    let mut reactor = Reactor::listen_on(&config.socket_config())?;

    println!("🚀 Kairos Echo Server");
    println!("=====================");
    println!("   Listening: {}", reactor.local_addr());
    println!("   Log file:  {}", config.log_path);
    println!("   Started:   {}\n", current_time_str());

    {
        let logger = Rc::clone(&logger);
        let stats = Rc::clone(&stats);
        reactor.set_recv_callback(move |socket: &mut TcpSocket, rx_time: Nanos| {
            let n = echo_inbound(socket);

            stats.bytes_echoed.set(stats.bytes_echoed.get() + n as u64);
            let mut logger = logger.borrow_mut();
            let fd = socket.as_raw_fd();
            log_fmt!(logger, "echo fd:% bytes:% rx:% lat:%\n", fd, n as u64, rx_time, now_nanos() - rx_time);
        });
    }
    {
        let stats = Rc::clone(&stats);
        reactor.set_recv_finished_callback(move || {
            stats.batches.set(stats.batches.get() + 1);
        });
    }

    let start_time = Instant::now();
    let mut last_stats_print = Instant::now();

    loop {
        reactor.poll()?;
        reactor.send_and_recv();

        if config.verbose && last_stats_print.elapsed() > Duration::from_secs(5) {
            stats.print_stats(start_time.elapsed(), reactor.connection_count());
            last_stats_print = Instant::now();
        }

        // No sleep: busy poll for minimum latency
        std::hint::spin_loop();
    }
}

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_ip = args[i + 1].clone();
                    i += 1;
                }
            }
            "--iface" | "-i" => {
                if i + 1 < args.len() {
                    config.iface = args[i + 1].clone();
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    config.port = args[i + 1].parse().unwrap_or(12345);
                    i += 1;
                }
            }
            "--log" | "-l" => {
                if i + 1 < args.len() {
                    config.log_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                println!("Kairos Echo Server\n");
                println!("Usage: kairos_server [OPTIONS]\n");
                println!("Options:");
                println!("  -b, --bind <IP>       Bind address (overrides --iface)");
                println!("  -i, --iface <NAME>    Interface to listen on (default: lo)");
                println!("  -p, --port <PORT>     Port (default: 12345)");
                println!("  -l, --log <PATH>      Log file (default: kairos_server.log)");
                println!("  -v, --verbose         Print stats every 5s");
                println!("  -h, --help            Show this help");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

fn main() {
    let config = parse_args();
    kairos::diagnostics::init_tracing(if config.verbose { "debug" } else { "info" });

    if let Err(e) = run_server(config) {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn test_echo_larger_than_one_chunk() {
        const TOTAL: usize = 10_000;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut socket = TcpSocket::connect(&SocketConfig {
            ip: "127.0.0.1".into(),
            port: listener.local_addr().unwrap().port(),
            buffer_size: 64 * 1024,
            ..Default::default()
        })
        .unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let echoed = Rc::new(Cell::new(0usize));
        {
            let echoed = Rc::clone(&echoed);
            socket.set_recv_callback(move |s: &mut TcpSocket, _| {
                echoed.set(echoed.get() + echo_inbound(s));
                assert!(s.inbound().is_empty());
            });
        }

        let request: Vec<u8> = (0..TOTAL).map(|i| (i % 199) as u8).collect();
        peer.write_all(&request).unwrap();

        // Only ticks, no further writes from the peer
        let deadline = Instant::now() + Duration::from_secs(5);
        while echoed.get() < TOTAL || socket.pending_outbound() > 0 {
            assert!(Instant::now() < deadline, "echoed {} of {}", echoed.get(), TOTAL);
            socket.send_and_recv();
        }
        assert_eq!(echoed.get(), TOTAL);

        let mut reply = vec![0u8; TOTAL];
        peer.read_exact(&mut reply).unwrap();
        assert_eq!(reply, request);
    }
}
