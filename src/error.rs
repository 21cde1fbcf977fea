//! Typed errors for setup paths.
//!
//! Only start-up work (address resolution, socket creation and options,
//! listen/connect, event-queue registration, log file creation, thread
//! spawn) reports errors. Broken invariants on the hot path go through
//! [`crate::core::fatal`] instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// `ip` is not a dotted-quad IPv4 address.
    #[error("invalid ipv4 address '{0}'")]
    InvalidAddress(String),

    /// Interface has no IPv4 address, or does not exist.
    #[error("interface '{0}' has no ipv4 address")]
    InterfaceNotFound(String),

    /// Neither `ip` nor `iface` given for a connecting socket.
    #[error("no ip or interface configured for {0}")]
    MissingAddress(String),

    /// Config asks for a role or transport the socket type cannot provide.
    #[error("invalid socket config: {0}")]
    InvalidConfig(String),

    /// A mandatory socket or event-queue system call failed.
    #[error("{step} failed: {source}")]
    Setup {
        step: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("could not open log file {path:?}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn setup(step: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Error::Setup { step, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
