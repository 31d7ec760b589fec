//! Daemon configuration loaded from TOML.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub intervals: IntervalConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// Ports and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Port of the UDP echo server, here and on every peer.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    /// Port of the telnet UI.
    #[serde(default = "default_ui_port")]
    pub ui_port: u16,
    #[serde(default = "default_mdns_port")]
    pub mdns_port: u16,
    #[serde(default = "default_mdns_group")]
    pub mdns_group: Ipv4Addr,
    /// Port TCP connect probes go to.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            udp_port: default_udp_port(),
            ui_port: default_ui_port(),
            mdns_port: default_mdns_port(),
            mdns_group: default_mdns_group(),
            ssh_port: default_ssh_port(),
            log_level: default_log_level(),
        }
    }
}

/// Timer periods in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalConfig {
    #[serde(default = "default_measurement_secs")]
    pub measurement_secs: f64,
    #[serde(default = "default_discovery_secs")]
    pub discovery_secs: f64,
    #[serde(default = "default_ui_refresh_secs")]
    pub ui_refresh_secs: f64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            measurement_secs: default_measurement_secs(),
            discovery_secs: default_discovery_secs(),
            ui_refresh_secs: default_ui_refresh_secs(),
        }
    }
}

impl IntervalConfig {
    pub fn measurement(&self) -> Duration {
        Duration::from_secs_f64(self.measurement_secs)
    }

    pub fn discovery(&self) -> Duration {
        Duration::from_secs_f64(self.discovery_secs)
    }

    pub fn ui_refresh(&self) -> Duration {
        Duration::from_secs_f64(self.ui_refresh_secs)
    }
}

/// What this host advertises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Also advertise `_ssh._tcp.local.`.
    #[serde(default)]
    pub broadcast_ssh: bool,
    /// TTL put on our answers, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u32,
    /// First label of our instance names.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_ssh: false,
            ttl_secs: default_ttl_secs(),
            instance_name: default_instance_name(),
        }
    }
}

/// Probe behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Sample committed for a failed TCP connect, in microseconds.
    #[serde(default = "default_tcp_penalty_us")]
    pub tcp_penalty_us: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            tcp_penalty_us: default_tcp_penalty_us(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Config {
    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), DaemonError> {
        for (name, port) in [
            ("udp_port", self.daemon.udp_port),
            ("ui_port", self.daemon.ui_port),
            ("mdns_port", self.daemon.mdns_port),
            ("ssh_port", self.daemon.ssh_port),
        ] {
            if port == 0 {
                return Err(DaemonError::Config(format!("{name} must not be 0")));
            }
        }

        for (name, secs) in [
            ("measurement interval", self.intervals.measurement_secs),
            ("discovery interval", self.intervals.discovery_secs),
            ("UI refresh interval", self.intervals.ui_refresh_secs),
        ] {
            // Also bounds what Duration::from_secs_f64 accepts.
            if !secs.is_finite() || secs <= 0.0 || secs > 86_400.0 {
                return Err(DaemonError::Config(format!(
                    "{name} must be a positive number of seconds up to one day, got {secs}"
                )));
            }
        }

        if !self.daemon.mdns_group.is_multicast() {
            return Err(DaemonError::Config(format!(
                "mdns_group {} is not a multicast address",
                self.daemon.mdns_group
            )));
        }

        if self.discovery.instance_name.is_empty() {
            return Err(DaemonError::Config("instance_name must not be empty".into()));
        }

        if self.probe.connect_timeout_ms == 0 {
            return Err(DaemonError::Config("connect_timeout_ms must not be 0".into()));
        }

        Ok(())
    }
}

fn default_udp_port() -> u16 {
    3382
}

fn default_ui_port() -> u16 {
    3673
}

fn default_mdns_port() -> u16 {
    5353
}

fn default_mdns_group() -> Ipv4Addr {
    Ipv4Addr::new(224, 0, 0, 251)
}

fn default_ssh_port() -> u16 {
    22
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_measurement_secs() -> f64 {
    1.0
}

fn default_discovery_secs() -> f64 {
    10.0
}

fn default_ui_refresh_secs() -> f64 {
    1.0
}

fn default_ttl_secs() -> u32 {
    20
}

fn default_instance_name() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();
    instance_label(&host)
}

fn default_tcp_penalty_us() -> u64 {
    1_000
}

fn default_connect_timeout_ms() -> u64 {
    1_000
}

/// Turn a host name into a single DNS label.
///
/// Dots would split the label, so they become dashes; the result is cut to
/// 63 bytes on a character boundary.
pub fn instance_label(host: &str) -> String {
    let mut label: String = host.trim_end_matches('.').replace('.', "-");
    if label.is_empty() {
        label = "opoznienia".to_string();
    }
    let mut end = label.len().min(63);
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    label.truncate(end);
    label
}
