//! Socket configuration.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use super::sys;
use crate::error::{Error, Result};

/// Default size of each socket's inbound and outbound buffer.
pub const SOCKET_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Which socket to create and how.
///
/// The three toggles are independent: connect vs listen, stream vs
/// datagram, and kernel receive timestamps on or off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Dotted-quad IPv4. Takes precedence over `iface`.
    pub ip: String,
    /// Interface whose IPv4 address is used when `ip` is empty.
    pub iface: String,
    pub port: u16,
    pub is_datagram: bool,
    pub is_listening: bool,
    pub needs_receive_timestamp: bool,
    /// Bytes reserved for each of the inbound and outbound buffers.
    pub buffer_size: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            iface: String::new(),
            port: 0,
            is_datagram: false,
            is_listening: false,
            needs_receive_timestamp: false,
            buffer_size: SOCKET_BUFFER_SIZE,
        }
    }
}

impl fmt::Display for SocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SocketCfg[ip:{} iface:{} port:{} datagram:{} listening:{} so_timestamp:{} buffer:{}]",
            self.ip,
            self.iface,
            self.port,
            self.is_datagram,
            self.is_listening,
            self.needs_receive_timestamp,
            self.buffer_size
        )
    }
}

impl SocketConfig {
    /// Explicit `ip`, else the address of `iface`, else `0.0.0.0` for
    /// listeners.
    pub fn resolve_ip(&self) -> Result<Ipv4Addr> {
        if !self.ip.is_empty() {
            return self
                .ip
                .parse()
                .map_err(|_| Error::InvalidAddress(self.ip.clone()));
        }
        if !self.iface.is_empty() {
            return sys::interface_ipv4(&self.iface)
                .map_err(Error::setup("getifaddrs"))?
                .ok_or_else(|| Error::InterfaceNotFound(self.iface.clone()));
        }
        if self.is_listening {
            return Ok(Ipv4Addr::UNSPECIFIED);
        }
        Err(Error::MissingAddress(self.to_string()))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::V4(SocketAddrV4::new(self.resolve_ip()?, self.port)))
    }
}
