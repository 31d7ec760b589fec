//! Multicast DNS service discovery for opoznienia.
//!
//! [`DiscoveryAgent`] is the protocol state machine: it builds browse and
//! refresh queries, turns responses into [`DiscoveryEvent`]s, and answers
//! queries about this host's own services. It does no I/O; the daemon
//! feeds it packets received on an [`MdnsSocket`].

use std::net::Ipv4Addr;

use opoznienia_mdns::DomainName;
use opoznienia_types::Service;

pub mod agent;
pub mod error;
pub mod socket;

pub use agent::{AgentConfig, DiscoveryAgent, ResponseOutcome};
pub use error::DiscoveryError;
pub use socket::{local_ipv4, MdnsSocket, MDNS_GROUP, MDNS_PORT};

/// Events from the discovery subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// An A answer resolved an instance of `service` to `addr`.
    HostAnnounced {
        /// Instance name that was resolved.
        name: DomainName,
        /// Address the instance resolved to.
        addr: Ipv4Addr,
        /// Service the instance was browsed under.
        service: Service,
        /// Advertised validity in seconds.
        ttl: u32,
    },
}
