//! Network Layer: non-blocking sockets and a busy-poll reactor
//!
//! Menggunakan mio untuk readiness (epoll/kqueue) dan libc untuk syscall
//! yang tidak diekspos mio (MSG_NOSIGNAL, SO_TIMESTAMP, getifaddrs).
//!
//! Fitur:
//! - Pre-allocated inbound/outbound buffers per socket
//! - Kernel receive timestamps (SO_TIMESTAMP) opsional
//! - Single-threaded reactor yang memiliki semua koneksi
//!
//! Note: For a runnable server, see src/bin/kairos_server.rs

pub mod buffers;
pub mod config;
pub mod mcast_socket;
pub mod readiness;
pub mod server;
pub mod sys;
pub mod tcp_socket;

pub use buffers::{ReadOutcome, SocketBuffers};
pub use config::{SocketConfig, SOCKET_BUFFER_SIZE};
pub use mcast_socket::McastSocket;
pub use readiness::{MioReadiness, Readiness, ReadyEvent};
pub use server::{Reactor, RecvFinishedCallback};
pub use tcp_socket::{RecvCallback, TcpSocket};
pub use mio::Token;
