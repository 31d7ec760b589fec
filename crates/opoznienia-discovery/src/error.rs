//! Discovery subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("mDNS wire error: {0}")]
    Wire(#[from] opoznienia_mdns::WireError),

    #[error("invalid instance name {name:?}: {reason}")]
    InstanceName { name: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
