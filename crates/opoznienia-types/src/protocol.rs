//! Measurement protocols and the services that enable them.

use serde::{Deserialize, Serialize};

/// Transport a latency probe travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    /// Timestamp datagram echoed by the remote measurement server.
    Udp,
    /// Bare stream connect to the remote SSH port.
    Tcp,
    /// ICMP echo request/reply.
    Icmp,
}

impl Protocol {
    /// All protocols in display order.
    pub const ALL: [Protocol; 3] = [Protocol::Udp, Protocol::Tcp, Protocol::Icmp];

    /// The advertised service whose presence enables this protocol.
    #[must_use]
    pub fn service(self) -> Service {
        match self {
            Self::Udp | Self::Icmp => Service::Delay,
            Self::Tcp => Service::Ssh,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
            Self::Icmp => write!(f, "icmp"),
        }
    }
}

/// A service a host advertises over multicast DNS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    /// `_opoznienia._udp.local.`, enables UDP and ICMP probes.
    Delay,
    /// `_ssh._tcp.local.`, enables TCP connect probes.
    Ssh,
}

impl Service {
    /// Protocols measured while this service is advertised.
    #[must_use]
    pub fn protocols(self) -> &'static [Protocol] {
        match self {
            Self::Delay => &[Protocol::Udp, Protocol::Icmp],
            Self::Ssh => &[Protocol::Tcp],
        }
    }

    /// The DNS-SD service type, dot separated with a trailing root.
    #[must_use]
    pub fn service_type(self) -> &'static str {
        match self {
            Self::Delay => "_opoznienia._udp.local.",
            Self::Ssh => "_ssh._tcp.local.",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.service_type())
    }
}

/// One value per measurement protocol.
///
/// Named fields instead of an array indexed by protocol, so every access
/// is checked at compile time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerProtocol<T> {
    pub udp: T,
    pub tcp: T,
    pub icmp: T,
}

impl<T> PerProtocol<T> {
    /// Build from a function of the protocol.
    pub fn from_fn(mut f: impl FnMut(Protocol) -> T) -> Self {
        Self {
            udp: f(Protocol::Udp),
            tcp: f(Protocol::Tcp),
            icmp: f(Protocol::Icmp),
        }
    }

    #[must_use]
    pub fn get(&self, protocol: Protocol) -> &T {
        match protocol {
            Protocol::Udp => &self.udp,
            Protocol::Tcp => &self.tcp,
            Protocol::Icmp => &self.icmp,
        }
    }

    pub fn get_mut(&mut self, protocol: Protocol) -> &mut T {
        match protocol {
            Protocol::Udp => &mut self.udp,
            Protocol::Tcp => &mut self.tcp,
            Protocol::Icmp => &mut self.icmp,
        }
    }

    /// Iterate `(protocol, value)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (Protocol, &T)> {
        Protocol::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    /// Map every value, keeping the protocol association.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerProtocol<U> {
        PerProtocol {
            udp: f(&self.udp),
            tcp: f(&self.tcp),
            icmp: f(&self.icmp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_protocol_mapping() {
        assert_eq!(Protocol::Udp.service(), Service::Delay);
        assert_eq!(Protocol::Icmp.service(), Service::Delay);
        assert_eq!(Protocol::Tcp.service(), Service::Ssh);
        for service in [Service::Delay, Service::Ssh] {
            for p in service.protocols() {
                assert_eq!(p.service(), service);
            }
        }
    }

    #[test]
    fn per_protocol_get_mut_targets_one_field() {
        let mut counts = PerProtocol::<u32>::default();
        *counts.get_mut(Protocol::Tcp) += 3;
        assert_eq!(counts, PerProtocol { udp: 0, tcp: 3, icmp: 0 });
    }

    #[test]
    fn per_protocol_iter_order() {
        let names = PerProtocol::from_fn(|p| p.to_string());
        let collected: Vec<_> = names.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(collected, ["udp", "tcp", "icmp"]);
    }

    #[test]
    fn service_type_strings() {
        assert_eq!(Service::Delay.to_string(), "_opoznienia._udp.local.");
        assert_eq!(Service::Ssh.to_string(), "_ssh._tcp.local.");
    }
}
