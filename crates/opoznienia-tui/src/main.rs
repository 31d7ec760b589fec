//! Terminal latency viewer for opoznienia.
//!
//! Runs the daemon in-process with the usual configuration and draws its
//! snapshot as a table. Logs go to a file so they do not tear the screen.

mod app;
mod input_handler;
mod ui;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use opoznienia_daemon::setup::load_config;
use opoznienia_daemon::{Daemon, DaemonEvent};

use app::AppState;

#[derive(Parser, Debug)]
#[command(
    name = "opoznienia-tui",
    about = "Run opoznienia and watch host latencies in the terminal",
    version
)]
struct Cli {
    /// Also advertise this host's SSH service.
    #[arg(short = 's')]
    broadcast_ssh: bool,

    /// Path to configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// File the daemon logs to while the viewer owns the terminal.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_logging(path: PathBuf, level: &str) -> anyhow::Result<()> {
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.broadcast_ssh {
        config.discovery.broadcast_ssh = true;
    }
    config.validate()?;

    let log_path = cli
        .log_file
        .unwrap_or_else(|| std::env::temp_dir().join("opoznienia-tui.log"));
    init_logging(log_path, &config.daemon.log_level)?;

    let mut daemon = Daemon::bind(config)
        .await
        .context("failed to start daemon")?;
    let shutdown = daemon.event_sender();
    let mut app = AppState::new(daemon.subscribe());
    let daemon_task = tokio::spawn(async move { daemon.run().await });

    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &daemon_task);

    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    let _ = shutdown.send(DaemonEvent::Shutdown).await;
    match daemon_task.await {
        Ok(outcome) => outcome?,
        Err(e) => tracing::warn!("daemon task failed: {e}"),
    }

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    daemon_task: &tokio::task::JoinHandle<Result<(), opoznienia_daemon::DaemonError>>,
) -> anyhow::Result<()> {
    loop {
        app.sync_snapshot();

        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(AppState::tick_rate())? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && input_handler::handle_key(key, app) {
                    app.quit = true;
                }
            }
        }

        if app.quit || daemon_task.is_finished() {
            return Ok(());
        }
    }
}
