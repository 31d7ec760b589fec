//! opoznienia CLI: discovers peers over mDNS and measures latency to them.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use opoznienia_daemon::config::Config;
use opoznienia_daemon::setup::load_config;
use opoznienia_daemon::{Daemon, DaemonEvent};

#[derive(Parser, Debug)]
#[command(
    name = "opoznienia",
    about = "Measure UDP, TCP and ICMP latency to hosts discovered on the LAN",
    version
)]
struct Cli {
    /// Also advertise this host's SSH service.
    #[arg(short = 's')]
    broadcast_ssh: bool,

    /// Port of the UDP echo server, here and on every peer.
    #[arg(short = 'u', value_name = "PORT")]
    udp_port: Option<u16>,

    /// Port of the telnet UI.
    #[arg(short = 'U', value_name = "PORT")]
    ui_port: Option<u16>,

    /// Seconds between measurements.
    #[arg(short = 't', value_name = "SECONDS")]
    measurement: Option<f64>,

    /// Seconds between discovery queries.
    #[arg(short = 'T', value_name = "SECONDS")]
    discovery: Option<f64>,

    /// Seconds between UI refreshes.
    #[arg(short = 'v', value_name = "SECONDS")]
    ui_refresh: Option<f64>,

    /// Path to configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Flags given on the command line win over the config file.
    fn apply(&self, config: &mut Config) {
        if self.broadcast_ssh {
            config.discovery.broadcast_ssh = true;
        }
        if let Some(port) = self.udp_port {
            config.daemon.udp_port = port;
        }
        if let Some(port) = self.ui_port {
            config.daemon.ui_port = port;
        }
        if let Some(secs) = self.measurement {
            config.intervals.measurement_secs = secs;
        }
        if let Some(secs) = self.discovery {
            config.intervals.discovery_secs = secs;
        }
        if let Some(secs) = self.ui_refresh {
            config.intervals.ui_refresh_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.daemon.log_level)),
        )
        .init();

    tracing::info!(
        udp_port = config.daemon.udp_port,
        ui_port = config.daemon.ui_port,
        broadcast_ssh = config.discovery.broadcast_ssh,
        "starting opoznienia"
    );

    let mut daemon = Daemon::bind(config)
        .await
        .context("failed to start daemon")?;

    let shutdown_tx = daemon.event_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
        }
    });

    daemon.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "opoznienia", "-s", "-u", "4000", "-U", "4001", "-t", "2", "-T", "30", "-v", "0.5",
        ])
        .unwrap();
        assert!(cli.broadcast_ssh);
        assert_eq!(cli.udp_port, Some(4000));
        assert_eq!(cli.ui_port, Some(4001));
        assert_eq!(cli.measurement, Some(2.0));
        assert_eq!(cli.discovery, Some(30.0));
        assert_eq!(cli.ui_refresh, Some(0.5));
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from(["opoznienia", "-u", "4000", "-v", "0.25"]).unwrap();
        let mut config = Config::default();
        config.daemon.ui_port = 5000;
        cli.apply(&mut config);
        assert_eq!(config.daemon.udp_port, 4000);
        assert_eq!(config.daemon.ui_port, 5000);
        assert!((config.intervals.ui_refresh_secs - 0.25).abs() < f64::EPSILON);
        assert!(!config.discovery.broadcast_ssh);
    }

    #[test]
    fn bad_port_is_a_parse_error() {
        assert!(Cli::try_parse_from(["opoznienia", "-u", "70000"]).is_err());
        assert!(Cli::try_parse_from(["opoznienia", "-u", "abc"]).is_err());
    }

    #[test]
    fn zero_interval_fails_validation() {
        let cli = Cli::try_parse_from(["opoznienia", "-t", "0"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(config.validate().is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
