//! The measurement loop: fanning probes out and matching replies.

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use opoznienia_types::{now_us, Protocol, Service, MAX_DELAYED_QUERIES};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::registry::Registry;
use crate::transport::{ProbeReply, ProbeTransport};

/// Result of one TCP connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpOutcome {
    pub addr: Ipv4Addr,
    pub id: u64,
    pub connected: bool,
    pub at: u64,
}

/// Probe settings.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Port of the remote UDP echo server.
    pub udp_port: u16,
    /// Port TCP connect probes go to.
    pub ssh_port: u16,
    /// Sample committed for a failed TCP connect, in microseconds.
    pub tcp_penalty_us: u64,
    pub connect_timeout: Duration,
}

/// Sends probes to every active host and folds replies into the registry.
pub struct ProbeEngine {
    transport: Arc<dyn ProbeTransport>,
    settings: ProbeSettings,
    tcp_attempts: HashMap<Ipv4Addr, VecDeque<(u64, AbortHandle)>>,
    outcome_tx: mpsc::Sender<TcpOutcome>,
}

impl ProbeEngine {
    /// Completed TCP attempts are reported on `outcome_tx`; the owner of
    /// the receiver feeds them back through [`ProbeEngine::on_tcp_outcome`].
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        settings: ProbeSettings,
        outcome_tx: mpsc::Sender<TcpOutcome>,
    ) -> Self {
        Self {
            transport,
            settings,
            tcp_attempts: HashMap::new(),
            outcome_tx,
        }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Connect attempts still running for `addr`.
    pub fn tcp_in_flight(&self, addr: Ipv4Addr) -> usize {
        self.tcp_attempts.get(&addr).map_or(0, VecDeque::len)
    }

    /// One measurement cycle at time `now`.
    ///
    /// Expired tracks are deactivated first, then every active track gets
    /// one probe per protocol. Send failures are logged per host and never
    /// stop the cycle.
    pub async fn run_cycle(&mut self, registry: &mut Registry, now: u64) {
        for (addr, service) in registry.expire(now) {
            if service == Service::Ssh {
                self.abort_tcp(addr);
            }
        }

        let icmp = self.transport.icmp_available();
        for host in registry.iter_mut() {
            let addr = host.addr();

            if host.is_active(Service::Delay) {
                host.start_query(Protocol::Udp, now, now);
                let target = SocketAddrV4::new(addr, self.settings.udp_port);
                if let Err(e) = self.transport.send_udp(target, now).await {
                    warn!(%addr, error = %e, "UDP probe failed");
                }

                if icmp {
                    let seq = host.next_icmp_seq();
                    host.start_query(Protocol::Icmp, u64::from(seq), now);
                    if let Err(e) = self.transport.send_icmp(addr, seq).await {
                        warn!(%addr, error = %e, "ICMP probe failed");
                    }
                }
            }

            if host.is_active(Service::Ssh) {
                let id = host.next_tcp_id();
                host.start_query(Protocol::Tcp, id, now);
                self.spawn_connect(addr, id);
            }
        }
    }

    /// Match a UDP or ICMP reply to its probe.
    ///
    /// Returns the committed round trip; unknown senders and late or
    /// duplicate replies are ignored.
    pub fn on_reply(&mut self, registry: &mut Registry, reply: ProbeReply) -> Option<u64> {
        let (from, protocol, id, at) = match reply {
            ProbeReply::Udp {
                from,
                timestamp,
                at,
            } => (from, Protocol::Udp, timestamp, at),
            ProbeReply::Icmp { from, seq, at } => (from, Protocol::Icmp, u64::from(seq), at),
        };
        let Some(host) = registry.get_mut(from) else {
            trace!(%from, %protocol, "reply from unknown host");
            return None;
        };
        let duration = host.finish_query(protocol, id, at);
        match duration {
            Some(us) => trace!(%from, %protocol, us, "sample"),
            None => trace!(%from, %protocol, id, "unmatched reply"),
        }
        duration
    }

    /// Commit a finished connect attempt: its round trip on success, the
    /// configured penalty on failure.
    pub fn on_tcp_outcome(&mut self, registry: &mut Registry, outcome: TcpOutcome) -> Option<u64> {
        if let Some(attempts) = self.tcp_attempts.get_mut(&outcome.addr) {
            attempts.retain(|(id, _)| *id != outcome.id);
            if attempts.is_empty() {
                self.tcp_attempts.remove(&outcome.addr);
            }
        }

        let host = registry.get_mut(outcome.addr)?;
        if outcome.connected {
            host.finish_query(Protocol::Tcp, outcome.id, outcome.at)
        } else {
            let penalty = self.settings.tcp_penalty_us;
            host.fail_query(Protocol::Tcp, outcome.id, penalty)
                .then_some(penalty)
        }
    }

    fn spawn_connect(&mut self, addr: Ipv4Addr, id: u64) {
        let transport = Arc::clone(&self.transport);
        let outcome_tx = self.outcome_tx.clone();
        let target = SocketAddrV4::new(addr, self.settings.ssh_port);
        let timeout = self.settings.connect_timeout;

        let task = tokio::spawn(async move {
            let connected = match transport.connect_tcp(target, timeout).await {
                Ok(()) => true,
                Err(e) => {
                    debug!(%target, error = %e, "TCP probe failed");
                    false
                }
            };
            let outcome = TcpOutcome {
                addr,
                id,
                connected,
                at: now_us(),
            };
            let _ = outcome_tx.send(outcome).await;
        });

        let attempts = self.tcp_attempts.entry(addr).or_default();
        attempts.push_back((id, task.abort_handle()));
        while attempts.len() > MAX_DELAYED_QUERIES {
            if let Some((old, handle)) = attempts.pop_front() {
                debug!(%addr, id = old, "dropping oldest TCP attempt");
                handle.abort();
            }
        }
    }

    fn abort_tcp(&mut self, addr: Ipv4Addr) {
        if let Some(attempts) = self.tcp_attempts.remove(&addr) {
            for (_, handle) in attempts {
                handle.abort();
            }
        }
    }
}

impl Drop for ProbeEngine {
    fn drop(&mut self) {
        for (_, handle) in self.tcp_attempts.drain().flat_map(|(_, a)| a) {
            handle.abort();
        }
    }
}
