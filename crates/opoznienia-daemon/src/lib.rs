//! Core daemon for opoznienia.
//!
//! Keeps the registry of discovered hosts, runs the probe engine against
//! it, answers other hosts' UDP probes and serves the telnet UI. The
//! [`Daemon`] event loop is the only writer of measurement state; user
//! interfaces read published [`opoznienia_types::Snapshot`]s.

pub mod config;
pub mod daemon;
pub mod echo;
pub mod error;
pub mod host;
pub mod icmp;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod probe;
pub mod registry;
pub mod setup;
pub mod telnet;
pub mod transport;

pub use config::Config;
pub use daemon::{Daemon, DaemonEvent};
pub use error::{DaemonError, TransportError};
pub use host::HostEntry;
pub use probe::{ProbeEngine, ProbeSettings, TcpOutcome};
pub use registry::Registry;
pub use transport::{NetTransport, ProbeReply, ProbeTransport};
