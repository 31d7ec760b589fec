//! Per-host measurement state.
//!
//! A [`HostEntry`] holds two activation tracks (one per advertised
//! service) and, for each protocol, the probes still in flight and the
//! last completed samples. Everything is bounded: both FIFOs evict their
//! oldest element when full.

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use opoznienia_types::{
    HostSnapshot, PerProtocol, Protocol, Service, AVERAGED_MEASUREMENTS, MAX_DELAYED_QUERIES,
    USEC_PER_SEC,
};

/// Fixed-capacity window of round-trip times with a running sum.
///
/// The sum is adjusted in the same call that changes the window, so it
/// always equals the sum of the samples held.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<u64>,
    sum: u64,
    capacity: usize,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::with_capacity(AVERAGED_MEASUREMENTS)
    }
}

impl SampleWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            sum: 0,
            capacity: capacity.max(1),
        }
    }

    /// Add a sample, returning the one evicted to make room.
    pub fn push(&mut self, sample: u64) -> Option<u64> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        if let Some(old) = evicted {
            self.sum -= old;
        }
        self.samples.push_back(sample);
        self.sum += sample;
        evicted
    }

    /// Mean in microseconds, `None` without samples.
    pub fn average(&self) -> Option<u64> {
        let len = u64::try_from(self.samples.len()).ok()?;
        (len > 0).then(|| self.sum / len)
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }
}

/// Probes awaiting a reply, oldest first.
#[derive(Debug, Clone)]
pub struct Outstanding {
    pending: VecDeque<(u64, u64)>,
    capacity: usize,
}

impl Default for Outstanding {
    fn default() -> Self {
        Self::with_capacity(MAX_DELAYED_QUERIES)
    }
}

impl Outstanding {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Remember probe `id` started at `start`.
    ///
    /// An entry with the same id is replaced. When full, the oldest probe
    /// is abandoned and returned as `(id, start)`.
    pub fn push(&mut self, id: u64, start: u64) -> Option<(u64, u64)> {
        self.take(id);
        let evicted = if self.pending.len() == self.capacity {
            self.pending.pop_front()
        } else {
            None
        };
        self.pending.push_back((id, start));
        evicted
    }

    /// Remove probe `id`, returning its start time.
    pub fn take(&mut self, id: u64) -> Option<u64> {
        let index = self.pending.iter().position(|(pending, _)| *pending == id)?;
        self.pending.remove(index).map(|(_, start)| start)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Activation of one advertised service on a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Track {
    active: bool,
    expires_at: u64,
}

impl Track {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    fn activate(&mut self, now: u64, ttl_secs: u32) {
        self.active = true;
        self.expires_at = now.saturating_add(u64::from(ttl_secs) * USEC_PER_SEC);
    }

    /// Deactivate if `now` is past the deadline. True on the transition.
    fn expire(&mut self, now: u64) -> bool {
        if self.active && now > self.expires_at {
            self.active = false;
            true
        } else {
            false
        }
    }
}

/// Everything known about one discovered address.
#[derive(Debug, Clone)]
pub struct HostEntry {
    addr: Ipv4Addr,
    delay: Track,
    ssh: Track,
    outstanding: PerProtocol<Outstanding>,
    samples: PerProtocol<SampleWindow>,
    next_tcp_id: u64,
    next_icmp_seq: u16,
}

impl HostEntry {
    /// A host with every track inactive and nothing measured.
    pub fn new(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            delay: Track::default(),
            ssh: Track::default(),
            outstanding: PerProtocol::default(),
            samples: PerProtocol::default(),
            next_tcp_id: 0,
            next_icmp_seq: 0,
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn track(&self, service: Service) -> &Track {
        match service {
            Service::Delay => &self.delay,
            Service::Ssh => &self.ssh,
        }
    }

    pub fn is_active(&self, service: Service) -> bool {
        self.track(service).is_active()
    }

    /// Whether probes of `protocol` should be sent.
    pub fn is_measuring(&self, protocol: Protocol) -> bool {
        self.is_active(protocol.service())
    }

    /// Activate `service` until `ttl_secs` from `now`.
    pub fn activate(&mut self, service: Service, now: u64, ttl_secs: u32) {
        self.track_mut(service).activate(now, ttl_secs);
    }

    /// Deactivate tracks whose deadline has passed, returning them.
    ///
    /// In-flight probes of an expired track are forgotten.
    pub fn expire(&mut self, now: u64) -> Vec<Service> {
        let mut expired = Vec::new();
        for service in [Service::Delay, Service::Ssh] {
            if self.track_mut(service).expire(now) {
                for protocol in service.protocols() {
                    self.outstanding.get_mut(*protocol).clear();
                }
                expired.push(service);
            }
        }
        expired
    }

    /// Fresh id for the next TCP connect attempt.
    pub fn next_tcp_id(&mut self) -> u64 {
        self.next_tcp_id = self.next_tcp_id.wrapping_add(1);
        self.next_tcp_id
    }

    /// Fresh ICMP echo sequence number.
    pub fn next_icmp_seq(&mut self) -> u16 {
        self.next_icmp_seq = self.next_icmp_seq.wrapping_add(1);
        self.next_icmp_seq
    }

    /// Record a probe as sent. Returns the probe abandoned to make room.
    pub fn start_query(&mut self, protocol: Protocol, id: u64, now: u64) -> Option<(u64, u64)> {
        self.outstanding.get_mut(protocol).push(id, now)
    }

    /// Match a reply to probe `id` and commit its round trip.
    ///
    /// Returns the committed duration, or `None` for an unknown id.
    pub fn finish_query(&mut self, protocol: Protocol, id: u64, now: u64) -> Option<u64> {
        let start = self.outstanding.get_mut(protocol).take(id)?;
        let duration = now.saturating_sub(start);
        self.samples.get_mut(protocol).push(duration);
        Some(duration)
    }

    /// Close probe `id` as failed, committing `penalty` instead of a round trip.
    pub fn fail_query(&mut self, protocol: Protocol, id: u64, penalty: u64) -> bool {
        if self.outstanding.get_mut(protocol).take(id).is_none() {
            return false;
        }
        self.samples.get_mut(protocol).push(penalty);
        true
    }

    pub fn outstanding(&self, protocol: Protocol) -> &Outstanding {
        self.outstanding.get(protocol)
    }

    pub fn samples(&self, protocol: Protocol) -> &SampleWindow {
        self.samples.get(protocol)
    }

    /// Average delay of `protocol` in microseconds.
    pub fn average(&self, protocol: Protocol) -> Option<u64> {
        self.samples.get(protocol).average()
    }

    /// Display row for this host, `None` while no track is active.
    pub fn snapshot(&self) -> Option<HostSnapshot> {
        if !self.delay.is_active() && !self.ssh.is_active() {
            return None;
        }
        Some(HostSnapshot {
            addr: self.addr,
            delays: self.samples.map(SampleWindow::average),
        })
    }

    fn track_mut(&mut self, service: Service) -> &mut Track {
        match service {
            Service::Delay => &mut self.delay,
            Service::Ssh => &mut self.ssh,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    const ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    fn ids(pending: &Outstanding) -> Vec<u64> {
        pending.pending.iter().map(|(id, _)| *id).collect()
    }

    proptest! {
        #[test]
        fn prop_window_sum_matches_samples(
            samples in prop::collection::vec(0..=u64::from(u32::MAX), 0..100),
        ) {
            let mut window = SampleWindow::default();
            for sample in samples {
                window.push(sample);
                prop_assert!(window.len() <= AVERAGED_MEASUREMENTS);
                prop_assert_eq!(window.sum(), window.iter().sum::<u64>());
            }
        }

        #[test]
        fn prop_outstanding_bounded_and_distinct(
            pushes in prop::collection::vec((0..30u64, any::<u64>()), 0..100),
        ) {
            let mut pending = Outstanding::default();
            for (id, start) in pushes {
                let before = ids(&pending);
                let evicted = pending.push(id, start);
                let after = ids(&pending);

                prop_assert!(after.len() <= MAX_DELAYED_QUERIES);
                prop_assert_eq!(after.iter().collect::<HashSet<_>>().len(), after.len());
                prop_assert_eq!(after.last(), Some(&id));
                // Only a full window without `id` gives up its oldest entry.
                if let Some((old, _)) = evicted {
                    prop_assert!(!before.contains(&id));
                    prop_assert_eq!(before.len(), MAX_DELAYED_QUERIES);
                    prop_assert_eq!(old, before[0]);
                }
            }
        }
    }

    #[test]
    fn window_sum_tracks_contents_through_evictions() {
        let mut window = SampleWindow::default();
        for i in 1..=25u64 {
            window.push(i * 7);
            assert!(window.len() <= AVERAGED_MEASUREMENTS);
            assert_eq!(window.sum(), window.iter().sum::<u64>());
        }
        assert_eq!(window.iter().collect::<Vec<_>>(), (16..=25).map(|i| i * 7).collect::<Vec<_>>());
    }

    #[test]
    fn window_push_reports_eviction() {
        let mut window = SampleWindow::with_capacity(2);
        assert_eq!(window.push(5), None);
        assert_eq!(window.push(6), None);
        assert_eq!(window.push(7), Some(5));
        assert_eq!(window.average(), Some(6));
    }

    #[test]
    fn empty_window_has_no_average() {
        assert_eq!(SampleWindow::default().average(), None);
    }

    #[test]
    fn eleventh_outstanding_evicts_oldest() {
        let mut pending = Outstanding::default();
        for id in 0..10 {
            assert_eq!(pending.push(id, id * 100), None);
        }
        assert_eq!(pending.push(10, 1000), Some((0, 0)));
        assert_eq!(pending.len(), MAX_DELAYED_QUERIES);
        assert_eq!(ids(&pending)[0], 1);
        assert_eq!(ids(&pending)[9], 10);
    }

    #[test]
    fn duplicate_outstanding_id_replaces() {
        let mut pending = Outstanding::default();
        pending.push(7, 100);
        pending.push(7, 200);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.take(7), Some(200));
        assert_eq!(pending.take(7), None);
    }

    #[test]
    fn new_host_is_inactive() {
        let host = HostEntry::new(ADDR);
        for protocol in Protocol::ALL {
            assert!(!host.is_measuring(protocol));
            assert!(host.average(protocol).is_none());
        }
        assert!(host.snapshot().is_none());
    }

    #[test]
    fn activation_sets_expiry_from_ttl() {
        let mut host = HostEntry::new(ADDR);
        host.activate(Service::Delay, 1_000, 20);
        assert!(host.is_measuring(Protocol::Udp));
        assert!(host.is_measuring(Protocol::Icmp));
        assert!(!host.is_measuring(Protocol::Tcp));
        assert_eq!(host.track(Service::Delay).expires_at(), 1_000 + 20 * USEC_PER_SEC);
    }

    #[test]
    fn track_expires_only_after_deadline() {
        let mut host = HostEntry::new(ADDR);
        host.activate(Service::Ssh, 0, 1);
        host.start_query(Protocol::Tcp, 1, 10);

        assert!(host.expire(USEC_PER_SEC).is_empty());
        assert!(host.is_active(Service::Ssh));

        assert_eq!(host.expire(USEC_PER_SEC + 1), [Service::Ssh]);
        assert!(!host.is_active(Service::Ssh));
        assert!(host.outstanding(Protocol::Tcp).is_empty());
        // Already inactive: not reported twice.
        assert!(host.expire(USEC_PER_SEC + 2).is_empty());
    }

    #[test]
    fn finish_commits_round_trip() {
        let mut host = HostEntry::new(ADDR);
        host.start_query(Protocol::Udp, 500, 500);
        assert_eq!(host.finish_query(Protocol::Udp, 500, 1_700), Some(1_200));
        assert_eq!(host.average(Protocol::Udp), Some(1_200));
        // Duplicate reply is ignored.
        assert_eq!(host.finish_query(Protocol::Udp, 500, 1_900), None);
        assert_eq!(host.samples(Protocol::Udp).len(), 1);
    }

    #[test]
    fn failure_commits_penalty() {
        let mut host = HostEntry::new(ADDR);
        let id = host.next_tcp_id();
        host.start_query(Protocol::Tcp, id, 0);
        assert!(host.fail_query(Protocol::Tcp, id, 1_000));
        assert_eq!(host.average(Protocol::Tcp), Some(1_000));
        assert!(!host.fail_query(Protocol::Tcp, id, 1_000));
    }

    #[test]
    fn icmp_sequence_wraps() {
        let mut host = HostEntry::new(ADDR);
        host.next_icmp_seq = u16::MAX;
        assert_eq!(host.next_icmp_seq(), 0);
        assert_eq!(host.next_icmp_seq(), 1);
    }

    #[test]
    fn snapshot_reports_averages_per_protocol() {
        let mut host = HostEntry::new(ADDR);
        host.activate(Service::Delay, 0, 20);
        host.start_query(Protocol::Icmp, 1, 0);
        host.finish_query(Protocol::Icmp, 1, 300);
        let snap = host.snapshot().unwrap();
        assert_eq!(snap.addr, ADDR);
        assert_eq!(snap.delays, PerProtocol { udp: None, tcp: None, icmp: Some(300) });
    }
}
