//! Address to host mapping.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use opoznienia_discovery::DiscoveryEvent;
use opoznienia_types::{Service, Snapshot};
use tracing::{debug, info};

use crate::host::HostEntry;

/// Every host ever discovered.
///
/// Entries are created on the first A answer naming an address and are
/// never removed, only deactivated by TTL expiry. The registry is owned by
/// the daemon task; other tasks only see [`Snapshot`]s of it.
#[derive(Debug, Default)]
pub struct Registry {
    hosts: HashMap<Ipv4Addr, HostEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `addr`, created inactive if missing.
    pub fn entry(&mut self, addr: Ipv4Addr) -> &mut HostEntry {
        self.hosts.entry(addr).or_insert_with(|| {
            debug!(%addr, "new host");
            HostEntry::new(addr)
        })
    }

    pub fn get(&self, addr: Ipv4Addr) -> Option<&HostEntry> {
        self.hosts.get(&addr)
    }

    pub fn get_mut(&mut self, addr: Ipv4Addr) -> Option<&mut HostEntry> {
        self.hosts.get_mut(&addr)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut HostEntry> {
        self.hosts.values_mut()
    }

    /// Activate `service` on `addr` for `ttl` seconds from `now`.
    pub fn announce(&mut self, addr: Ipv4Addr, service: Service, ttl: u32, now: u64) {
        let host = self.entry(addr);
        if !host.is_active(service) {
            info!(%addr, %service, ttl, "host active");
        }
        host.activate(service, now, ttl);
    }

    /// Apply a discovery event.
    pub fn apply(&mut self, event: &DiscoveryEvent, now: u64) {
        match event {
            DiscoveryEvent::HostAnnounced {
                addr, service, ttl, ..
            } => self.announce(*addr, *service, *ttl, now),
        }
    }

    /// Deactivate every track past its deadline.
    pub fn expire(&mut self, now: u64) -> Vec<(Ipv4Addr, Service)> {
        let mut expired = Vec::new();
        for host in self.hosts.values_mut() {
            for service in host.expire(now) {
                info!(addr = %host.addr(), %service, "host expired");
                expired.push((host.addr(), service));
            }
        }
        expired
    }

    /// Sorted copy of every host with an active track.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.hosts.values().filter_map(HostEntry::snapshot).collect())
    }
}
