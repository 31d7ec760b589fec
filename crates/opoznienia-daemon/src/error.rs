//! Daemon errors.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind {what} on port {port}: {source}")]
    Bind {
        what: &'static str,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("discovery error: {0}")]
    Discovery(#[from] opoznienia_discovery::DiscoveryError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of a single probe.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(#[from] std::io::Error),

    #[error("connect to {target} failed: {reason}")]
    Connect {
        target: std::net::SocketAddrV4,
        reason: String,
    },

    #[error("connect to {0} timed out")]
    Timeout(std::net::SocketAddrV4),

    #[error("ICMP socket unavailable")]
    IcmpUnavailable,
}

/// Whether a socket reader should keep going after `error`.
///
/// Interrupted calls and ICMP errors reported on a UDP socket are retried;
/// anything else means the socket is unusable.
pub fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}
