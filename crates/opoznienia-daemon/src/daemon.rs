//! Core daemon orchestration.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use opoznienia_discovery::{local_ipv4, AgentConfig, DiscoveryAgent, MdnsSocket};
use opoznienia_mdns::{Message, MAX_PACKET_SIZE};
use opoznienia_types::{now_us, Snapshot};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::echo::EchoServer;
use crate::error::{is_transient, DaemonError};
use crate::probe::{ProbeEngine, ProbeSettings, TcpOutcome};
use crate::registry::Registry;
use crate::telnet::TelnetServer;
use crate::transport::{NetTransport, ProbeReply, ProbeTransport};

/// Events processed by the daemon's main loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A packet received on the mDNS socket, stamped on arrival.
    Mdns { packet: Vec<u8>, at: u64 },
    /// A UDP or ICMP probe reply.
    Probe(ProbeReply),
    /// A finished TCP connect attempt.
    Tcp(TcpOutcome),
    /// Shutdown signal.
    Shutdown,
}

/// The latency monitoring daemon.
///
/// Owns the registry, the discovery agent and the probe engine. Sockets
/// are read by spawned tasks that forward [`DaemonEvent`]s; every state
/// change happens in [`Daemon::run`].
pub struct Daemon {
    config: Config,
    registry: Registry,
    agent: DiscoveryAgent,
    engine: ProbeEngine,
    mdns: Option<Arc<MdnsSocket>>,
    event_tx: mpsc::Sender<DaemonEvent>,
    event_rx: mpsc::Receiver<DaemonEvent>,
    snapshot_tx: watch::Sender<Snapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Create a daemon around an existing transport.
    ///
    /// Without an mDNS socket nothing is multicast; packets can still be
    /// fed in through [`Daemon::event_sender`]. Must be called inside a
    /// tokio runtime.
    pub fn new(
        config: Config,
        local_addr: Ipv4Addr,
        transport: Arc<dyn ProbeTransport>,
        mdns: Option<Arc<MdnsSocket>>,
    ) -> Result<Self, DaemonError> {
        config.validate()?;

        let agent = DiscoveryAgent::new(AgentConfig {
            instance: config.discovery.instance_name.clone(),
            local_addr,
            broadcast_ssh: config.discovery.broadcast_ssh,
            ttl: config.discovery.ttl_secs,
        })?;

        let (event_tx, event_rx) = mpsc::channel(1024);

        // Forward TCP outcomes to daemon events
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<TcpOutcome>(256);
        let outcome_event_tx = event_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(outcome) = outcome_rx.recv().await {
                if outcome_event_tx.send(DaemonEvent::Tcp(outcome)).await.is_err() {
                    break;
                }
            }
        });

        let engine = ProbeEngine::new(
            transport,
            ProbeSettings {
                udp_port: config.daemon.udp_port,
                ssh_port: config.daemon.ssh_port,
                tcp_penalty_us: config.probe.tcp_penalty_us,
                connect_timeout: config.probe.connect_timeout(),
            },
            outcome_tx,
        );

        let (snapshot_tx, _) = watch::channel(Snapshot::default());

        info!(
            instance = %agent.instance_name(opoznienia_types::Service::Delay),
            %local_addr,
            broadcast_ssh = config.discovery.broadcast_ssh,
            "daemon created"
        );

        Ok(Self {
            config,
            registry: Registry::new(),
            agent,
            engine,
            mdns,
            event_tx,
            event_rx,
            snapshot_tx,
            tasks: vec![forwarder],
        })
    }

    /// Bind every socket named in `config` and spawn their readers.
    ///
    /// Starts the mDNS socket, the probe sockets, the UDP echo server and
    /// the telnet UI.
    pub async fn bind(config: Config) -> Result<Self, DaemonError> {
        config.validate()?;
        let group = config.daemon.mdns_group;
        let mdns_port = config.daemon.mdns_port;

        let local_addr = local_ipv4(SocketAddrV4::new(group, mdns_port)).unwrap_or_else(|e| {
            warn!(error = %e, "no route to the mDNS group, not answering A queries");
            Ipv4Addr::UNSPECIFIED
        });

        let transport = NetTransport::bind().await?;
        let mdns = Arc::new(MdnsSocket::bind(group, mdns_port)?);
        let echo = EchoServer::bind(config.daemon.udp_port).await?;

        let mut daemon = Self::new(
            config,
            local_addr,
            Arc::new(transport.clone()),
            Some(Arc::clone(&mdns)),
        )?;

        let telnet = TelnetServer::bind(
            daemon.config.daemon.ui_port,
            daemon.subscribe(),
            daemon.config.intervals.ui_refresh(),
        )
        .await?;

        // Forward probe replies to daemon events
        let (reply_tx, mut reply_rx) = mpsc::channel::<ProbeReply>(1024);
        transport.spawn_receivers(reply_tx);
        let reply_event_tx = daemon.event_sender();
        daemon.tasks.push(tokio::spawn(async move {
            while let Some(reply) = reply_rx.recv().await {
                if reply_event_tx.send(DaemonEvent::Probe(reply)).await.is_err() {
                    break;
                }
            }
        }));

        let mdns_event_tx = daemon.event_sender();
        daemon.tasks.push(tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_PACKET_SIZE];
            loop {
                match mdns.recv(&mut buf).await {
                    Ok((len, from)) => {
                        trace!(%from, len, "mDNS packet");
                        let event = DaemonEvent::Mdns {
                            packet: buf[..len].to_vec(),
                            at: now_us(),
                        };
                        if mdns_event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) if is_transient(&e) => debug!(error = %e, "mDNS receive error"),
                    Err(e) => {
                        error!(error = %e, "mDNS socket failed, discovery stopped");
                        break;
                    }
                }
            }
        }));

        daemon.tasks.push(tokio::spawn(echo.run()));
        daemon.tasks.push(tokio::spawn(telnet.run()));

        Ok(daemon)
    }

    /// Get a clone of the event sender for feeding events into the daemon.
    pub fn event_sender(&self) -> mpsc::Sender<DaemonEvent> {
        self.event_tx.clone()
    }

    /// Receiver of the snapshot published after every change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn agent(&self) -> &DiscoveryAgent {
        &self.agent
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the daemon event loop until [`DaemonEvent::Shutdown`].
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        let mut probe_timer = tokio::time::interval(self.config.intervals.measurement());
        probe_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut discovery_timer = tokio::time::interval(self.config.intervals.discovery());
        discovery_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("daemon running");

        loop {
            tokio::select! {
                _ = probe_timer.tick() => {
                    self.engine.run_cycle(&mut self.registry, now_us()).await;
                    self.publish();
                }
                _ = discovery_timer.tick() => {
                    self.discover().await;
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(DaemonEvent::Mdns { packet, at }) => {
                            let replies = self.handle_mdns_packet(&packet, at);
                            self.send_mdns(replies).await;
                        }
                        Some(DaemonEvent::Probe(reply)) => {
                            self.engine.on_reply(&mut self.registry, reply);
                        }
                        Some(DaemonEvent::Tcp(outcome)) => {
                            self.engine.on_tcp_outcome(&mut self.registry, outcome);
                        }
                        Some(DaemonEvent::Shutdown) | None => {
                            info!("shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Handle one received mDNS packet, returning the messages to multicast.
    ///
    /// Malformed packets are logged and dropped.
    pub fn handle_mdns_packet(&mut self, packet: &[u8], at: u64) -> Vec<Message> {
        match Message::decode(packet) {
            Ok(Message::Query(query)) => self
                .agent
                .answer(&query)
                .map(Message::from)
                .into_iter()
                .collect(),
            Ok(Message::Response(response)) => {
                let outcome = self.agent.handle_response(&response);
                for event in &outcome.events {
                    self.registry.apply(event, at);
                }
                if !outcome.events.is_empty() {
                    self.publish();
                }
                outcome.follow_up.map(Message::from).into_iter().collect()
            }
            Err(e) => {
                debug!(error = %e, len = packet.len(), "dropping malformed mDNS packet");
                Vec::new()
            }
        }
    }

    /// Messages sent on every discovery tick: the browse query and, once
    /// instances are known, the A queries renewing them.
    pub fn discovery_messages(&self) -> Vec<Message> {
        let mut messages = vec![Message::from(self.agent.browse_query())];
        messages.extend(self.agent.refresh_queries().into_iter().map(Message::from));
        messages
    }

    async fn discover(&mut self) {
        if self.mdns.is_some() {
            let target = SocketAddrV4::new(self.config.daemon.mdns_group, self.config.daemon.mdns_port);
            match local_ipv4(target) {
                Ok(addr) => self.agent.set_local_addr(addr),
                Err(e) => debug!(error = %e, "local address lookup failed"),
            }
        }
        let messages = self.discovery_messages();
        self.send_mdns(messages).await;
    }

    async fn send_mdns(&self, messages: Vec<Message>) {
        let Some(mdns) = &self.mdns else {
            return;
        };
        for message in messages {
            if let Err(e) = mdns.send(&message).await {
                warn!(error = %e, kind = message.kind().as_str(), "mDNS send failed");
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.registry.snapshot());
    }

    fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("daemon shut down complete");
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
