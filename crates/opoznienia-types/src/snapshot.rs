//! Read-only latency view handed to user interfaces.

use std::cmp::Ordering;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::protocol::PerProtocol;

/// Averaged delays of one host, in microseconds.
///
/// `None` means no completed sample for that protocol, which is shown
/// distinctly from a zero delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub addr: Ipv4Addr,
    pub delays: PerProtocol<Option<u64>>,
}

impl HostSnapshot {
    /// Mean of the protocols that have data.
    #[must_use]
    pub fn mean_delay(&self) -> Option<u64> {
        let (sum, count) = self
            .delays
            .iter()
            .filter_map(|(_, d)| *d)
            .fold((0u64, 0u64), |(s, c), d| (s.saturating_add(d), c + 1));
        (count > 0).then(|| sum / count)
    }
}

/// Sorted snapshot of every host worth displaying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Hosts ordered worst first, ties by address; hosts without data last.
    pub hosts: Vec<HostSnapshot>,
    /// Largest host mean delay, for scaling bar positions.
    pub max_delay: Option<u64>,
}

impl Snapshot {
    /// Sort `hosts` into display order and compute the scale.
    #[must_use]
    pub fn new(mut hosts: Vec<HostSnapshot>) -> Self {
        hosts.sort_by(display_order);
        let max_delay = hosts.iter().filter_map(HostSnapshot::mean_delay).max();
        Self { hosts, max_delay }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }
}

fn display_order(a: &HostSnapshot, b: &HostSnapshot) -> Ordering {
    match (a.mean_delay(), b.mean_delay()) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.addr.cmp(&b.addr)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.addr.cmp(&b.addr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(last: u8, udp: Option<u64>, tcp: Option<u64>, icmp: Option<u64>) -> HostSnapshot {
        HostSnapshot {
            addr: Ipv4Addr::new(10, 0, 0, last),
            delays: PerProtocol { udp, tcp, icmp },
        }
    }

    #[test]
    fn mean_ignores_missing_protocols() {
        assert_eq!(host(1, Some(100), None, Some(300)).mean_delay(), Some(200));
        assert_eq!(host(1, None, None, None).mean_delay(), None);
    }

    #[test]
    fn snapshot_sorts_worst_first_then_by_address() {
        let snap = Snapshot::new(vec![
            host(3, Some(100), None, None),
            host(2, None, None, None),
            host(9, Some(500), None, None),
            host(1, Some(100), None, None),
        ]);
        let order: Vec<u8> = snap.hosts.iter().map(|h| h.addr.octets()[3]).collect();
        assert_eq!(order, [9, 1, 3, 2]);
        assert_eq!(snap.max_delay, Some(500));
    }

    #[test]
    fn empty_snapshot_has_no_scale() {
        let snap = Snapshot::new(Vec::new());
        assert!(snap.is_empty());
        assert_eq!(snap.max_delay, None);
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let snap = Snapshot::new(vec![host(7, Some(42), Some(1000), None)]);
        let json = serde_json::to_string(&snap).unwrap();
        let decoded: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, decoded);
    }
}
