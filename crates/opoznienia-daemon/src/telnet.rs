//! Telnet user interface.
//!
//! Every client gets the latest [`Snapshot`] redrawn on a fixed interval as
//! a 24 by 80 screen, and can scroll it with `a` and `z`.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use opoznienia_types::{HostSnapshot, Snapshot};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::DaemonError;

pub const SCREEN_WIDTH: usize = 80;
pub const SCREEN_HEIGHT: usize = 24;
const IP_WIDTH: usize = 15;

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const DONT: u8 = 254;
const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

/// Sent on connect: we echo and suppress go-ahead, so the client switches
/// to character mode.
pub const NEGOTIATION: [u8; 6] = [IAC, WILL, OPT_SGA, IAC, WILL, OPT_ECHO];

const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

/// One screen line for `host`, exactly [`SCREEN_WIDTH`] columns.
///
/// The address is padded to 15 columns, followed by the UDP, TCP and ICMP
/// averages in microseconds (`---` without data). The numbers end at a
/// column proportional to the host's mean over `max_delay`.
pub fn render_line(host: &HostSnapshot, max_delay: Option<u64>) -> String {
    let numbers: String = host
        .delays
        .iter()
        .map(|(_, delay)| match delay {
            Some(us) => format!(" {us}"),
            None => " ---".to_string(),
        })
        .collect();
    let ip = format!("{:<IP_WIDTH$}", host.addr.to_string());
    let text_len = ip.len() + numbers.len();

    let last = match (host.mean_delay(), max_delay) {
        (Some(mean), Some(max)) if max > 0 => {
            let scaled = (u128::from(mean) * SCREEN_WIDTH as u128).div_ceil(u128::from(max));
            usize::try_from(scaled).unwrap_or(SCREEN_WIDTH)
        }
        _ => 0,
    }
    .clamp(text_len.min(SCREEN_WIDTH), SCREEN_WIDTH);

    let mut line = String::with_capacity(SCREEN_WIDTH);
    line.push_str(&ip);
    line.push_str(&" ".repeat(last.saturating_sub(text_len)));
    line.push_str(&numbers);
    line.truncate(SCREEN_WIDTH);
    line.push_str(&" ".repeat(SCREEN_WIDTH - line.len()));
    line
}

/// A full screen starting at host `offset`.
pub fn render_screen(snapshot: &Snapshot, offset: usize) -> Vec<u8> {
    let mut out = CLEAR_SCREEN.to_vec();
    let lines: Vec<String> = snapshot
        .hosts
        .iter()
        .skip(offset)
        .take(SCREEN_HEIGHT)
        .map(|host| render_line(host, snapshot.max_delay))
        .collect();
    out.extend_from_slice(lines.join("\r\n").as_bytes());
    out
}

/// Scroll position of one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scroll {
    offset: usize,
}

impl Scroll {
    pub fn offset(self) -> usize {
        self.offset
    }

    /// Apply a key press. Returns true if the view moved.
    pub fn key(&mut self, key: u8, rows: usize) -> bool {
        let before = self.offset;
        match key {
            b'a' | b'A' => self.offset = self.offset.saturating_sub(1),
            b'z' | b'Z' => self.offset = (self.offset + 1).min(Self::max_offset(rows)),
            _ => {}
        }
        self.offset != before
    }

    /// Keep the offset valid after the number of rows changed.
    pub fn clamp(&mut self, rows: usize) {
        self.offset = self.offset.min(Self::max_offset(rows));
    }

    fn max_offset(rows: usize) -> usize {
        rows.saturating_sub(SCREEN_HEIGHT)
    }
}

/// Strips telnet commands from client input, keeping data bytes.
#[derive(Debug, Default)]
pub struct TelnetInput {
    state: InputState,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum InputState {
    #[default]
    Data,
    Command,
    Option,
    Subnegotiation,
    SubnegotiationIac,
}

impl TelnetInput {
    /// Feed received bytes, returning the data bytes among them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        for &byte in bytes {
            self.state = match (self.state, byte) {
                (InputState::Data, IAC) => InputState::Command,
                (InputState::Data, _) => {
                    data.push(byte);
                    InputState::Data
                }
                (InputState::Command, IAC) => {
                    data.push(IAC);
                    InputState::Data
                }
                (InputState::Command, SB) => InputState::Subnegotiation,
                (InputState::Command, WILL..=DONT) => InputState::Option,
                (InputState::Command | InputState::Option, _) => InputState::Data,
                (InputState::Subnegotiation, IAC) => InputState::SubnegotiationIac,
                (InputState::Subnegotiation, _) => InputState::Subnegotiation,
                (InputState::SubnegotiationIac, SE) => InputState::Data,
                (InputState::SubnegotiationIac, _) => InputState::Subnegotiation,
            };
        }
        data
    }
}

/// Accepts telnet clients on the UI port.
#[derive(Debug)]
pub struct TelnetServer {
    listener: TcpListener,
    snapshots: watch::Receiver<Snapshot>,
    refresh: Duration,
}

impl TelnetServer {
    pub async fn bind(
        port: u16,
        snapshots: watch::Receiver<Snapshot>,
        refresh: Duration,
    ) -> Result<Self, DaemonError> {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|source| DaemonError::Bind {
                what: "telnet UI",
                port,
                source,
            })?;
        Ok(Self {
            listener,
            snapshots,
            refresh,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until the task is dropped.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "telnet UI listening");
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "telnet client connected");
                    let snapshots = self.snapshots.clone();
                    let refresh = self.refresh;
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(stream, snapshots, refresh).await {
                            debug!(%peer, error = %e, "telnet client error");
                        }
                        debug!(%peer, "telnet client disconnected");
                    });
                }
                Err(e) => warn!(error = %e, "telnet accept error"),
            }
        }
    }
}

async fn serve_client(
    mut stream: TcpStream,
    snapshots: watch::Receiver<Snapshot>,
    refresh: Duration,
) -> std::io::Result<()> {
    stream.write_all(&NEGOTIATION).await?;

    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut input = TelnetInput::default();
    let mut scroll = Scroll::default();
    let mut buf = [0u8; 256];

    loop {
        let redraw = tokio::select! {
            _ = ticker.tick() => true,
            read = stream.read(&mut buf) => {
                let len = read?;
                if len == 0 {
                    return Ok(());
                }
                let rows = snapshots.borrow().len();
                let mut moved = false;
                for key in input.feed(&buf[..len]) {
                    moved |= scroll.key(key, rows);
                }
                moved
            }
        };

        if redraw {
            let screen = {
                let snapshot = snapshots.borrow();
                scroll.clamp(snapshot.len());
                render_screen(&snapshot, scroll.offset())
            };
            stream.write_all(&screen).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use opoznienia_types::PerProtocol;

    use super::*;

    fn host(last: u8, udp: Option<u64>, tcp: Option<u64>, icmp: Option<u64>) -> HostSnapshot {
        HostSnapshot {
            addr: Ipv4Addr::new(192, 168, 0, last),
            delays: PerProtocol { udp, tcp, icmp },
        }
    }

    #[test]
    fn line_without_scale_is_left_aligned() {
        let line = render_line(&host(1, Some(120), None, Some(80)), None);
        assert_eq!(line.len(), SCREEN_WIDTH);
        assert!(line.starts_with("192.168.0.1     120 --- 80"));
        assert!(line[26..].chars().all(|c| c == ' '));
    }

    #[test]
    fn worst_host_ends_at_right_edge() {
        let line = render_line(&host(2, Some(500), None, None), Some(500));
        assert_eq!(line.len(), SCREEN_WIDTH);
        assert!(line.ends_with(" 500 --- ---"));
    }

    #[test]
    fn numbers_shift_with_mean() {
        // mean 250 of max 500 ends at column 40.
        let line = render_line(&host(3, Some(250), None, None), Some(500));
        let end = line.trim_end().len();
        assert_eq!(end, 40);
        assert!(line[..end].ends_with(" 250 --- ---"));
    }

    #[test]
    fn short_text_never_overlaps_address() {
        let line = render_line(&host(4, Some(1), None, None), Some(1_000_000));
        assert!(line.starts_with("192.168.0.4     1 --- ---"));
    }

    #[test]
    fn screen_shows_at_most_one_page() {
        let hosts: Vec<HostSnapshot> = (0..30).map(|i| host(i, Some(10), None, None)).collect();
        let snapshot = Snapshot::new(hosts);
        let screen = render_screen(&snapshot, 0);
        assert!(screen.starts_with(CLEAR_SCREEN));
        let body = String::from_utf8(screen[CLEAR_SCREEN.len()..].to_vec()).unwrap();
        assert_eq!(body.split("\r\n").count(), SCREEN_HEIGHT);
    }

    #[test]
    fn scroll_is_clamped() {
        let mut scroll = Scroll::default();
        assert!(!scroll.key(b'a', 30));
        assert!(scroll.key(b'z', 30));
        assert!(scroll.key(b'Z', 30));
        assert_eq!(scroll.offset(), 2);
        for _ in 0..10 {
            scroll.key(b'z', 30);
        }
        assert_eq!(scroll.offset(), 6);
        assert!(scroll.key(b'A', 30));
        assert_eq!(scroll.offset(), 5);

        scroll.clamp(10);
        assert_eq!(scroll.offset(), 0);
        assert!(!scroll.key(b'q', 10));
    }

    #[test]
    fn negotiation_bytes_are_not_keys() {
        let mut input = TelnetInput::default();
        let data = input.feed(&[IAC, 253, OPT_SGA, b'z', IAC, SB, 24, 1, IAC, SE, b'a']);
        assert_eq!(data, b"za");
        // A command split across reads.
        assert!(input.feed(&[IAC]).is_empty());
        assert!(input.feed(&[WILL]).is_empty());
        assert_eq!(input.feed(&[OPT_ECHO, b'z']), b"z");
    }

    #[tokio::test]
    async fn client_receives_negotiation_and_screen() {
        let (tx, rx) = watch::channel(Snapshot::new(vec![host(9, Some(42), None, None)]));
        let server = TelnetServer::bind(0, rx, Duration::from_millis(20))
            .await
            .unwrap();
        let port = server.local_addr().unwrap().port();
        let task = tokio::spawn(server.run());

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !String::from_utf8_lossy(&received).contains("192.168.0.9") {
            let len = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(len > 0);
            received.extend_from_slice(&buf[..len]);
        }
        assert!(received.starts_with(&NEGOTIATION));
        drop(tx);
        task.abort();
    }
}
