//! Pre-allocated inbound and outbound buffers with high-water indices.
//!
//! Shared by [`TcpSocket`](super::TcpSocket) and
//! [`McastSocket`](super::McastSocket). Both buffers are allocated once;
//! nothing on the per-tick path touches the allocator.

use std::io;
use std::os::unix::io::RawFd;

use super::sys;
use crate::core::fatal;
use crate::util::{now_nanos, Nanos};

/// Result of one non-blocking receive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// New bytes landed past the inbound high-water mark.
    Received { bytes: usize, rx_time: Nanos },
    /// Nothing to read right now, or no room left to read into.
    Empty,
    /// Zero-byte read: end of stream for TCP, empty datagram for UDP.
    Eof,
}

pub struct SocketBuffers {
    outbound: Box<[u8]>,
    // Bytes [0, next_send_valid_index) are queued for sending
    next_send_valid_index: usize,
    inbound: Box<[u8]>,
    // Bytes [0, next_rcv_valid_index) are received and not yet consumed
    next_rcv_valid_index: usize,
}

impl SocketBuffers {
    pub fn with_capacity(size: usize) -> Self {
        Self {
            outbound: vec![0u8; size].into_boxed_slice(),
            next_send_valid_index: 0,
            inbound: vec![0u8; size].into_boxed_slice(),
            next_rcv_valid_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.outbound.len()
    }

    /// Queue bytes past the outbound high-water mark.
    ///
    /// Fatal if they do not fit; the owner must flush every cycle.
    #[inline]
    pub fn append_outbound(&mut self, data: &[u8]) {
        let end = self.next_send_valid_index + data.len();
        if end > self.outbound.len() {
            fatal(format!(
                "socket outbound buffer filled up ({} + {} > {}) and send_and_recv() not called",
                self.next_send_valid_index,
                data.len(),
                self.outbound.len()
            ));
        }
        self.outbound[self.next_send_valid_index..end].copy_from_slice(data);
        self.next_send_valid_index = end;
    }

    #[inline(always)]
    pub fn outbound(&self) -> &[u8] {
        &self.outbound[..self.next_send_valid_index]
    }

    #[inline(always)]
    pub fn clear_outbound(&mut self) {
        self.next_send_valid_index = 0;
    }

    /// Unconsumed received bytes (zero-copy view).
    #[inline(always)]
    pub fn inbound(&self) -> &[u8] {
        &self.inbound[..self.next_rcv_valid_index]
    }

    /// Drop the first `n` unconsumed bytes, shifting the rest to the front.
    #[inline]
    pub fn consume_inbound(&mut self, n: usize) {
        let n = n.min(self.next_rcv_valid_index);
        if n < self.next_rcv_valid_index {
            self.inbound.copy_within(n..self.next_rcv_valid_index, 0);
        }
        self.next_rcv_valid_index -= n;
    }

    /// One non-blocking receive past the inbound high-water mark.
    pub fn fill_read_buffer(&mut self, fd: RawFd, kernel_timestamp: bool) -> io::Result<ReadOutcome> {
        let spare = &mut self.inbound[self.next_rcv_valid_index..];
        if spare.is_empty() {
            // A zero-length read would look like EOF
            return Ok(ReadOutcome::Empty);
        }

        let result = if kernel_timestamp {
            sys::recv_with_timestamp(fd, spare)
        } else {
            sys::recv_nonblocking(fd, spare).map(|n| (n, None))
        };

        match result {
            Ok((0, _)) => Ok(ReadOutcome::Eof),
            Ok((bytes, timestamp)) => {
                self.next_rcv_valid_index += bytes;
                Ok(ReadOutcome::Received {
                    bytes,
                    rx_time: timestamp.unwrap_or_else(now_nanos),
                })
            }
            Err(ref e) if is_transient(e) => Ok(ReadOutcome::Empty),
            Err(e) => Err(e),
        }
    }

    /// One non-blocking send of everything queued.
    ///
    /// Bytes the OS accepted are removed; the remainder stays at the front
    /// of the buffer for the next attempt. Returns the number of bytes sent.
    pub fn flush_write_buffer(&mut self, fd: RawFd) -> io::Result<usize> {
        if self.next_send_valid_index == 0 {
            return Ok(0);
        }

        match sys::send_nosignal(fd, &self.outbound[..self.next_send_valid_index]) {
            Ok(n) => {
                if n < self.next_send_valid_index {
                    // Partial write, compact buffer
                    self.outbound.copy_within(n..self.next_send_valid_index, 0);
                }
                self.next_send_valid_index -= n;
                Ok(n)
            }
            Err(ref e) if is_transient(e) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::NotConnected
    )
}
