//! Application state for the latency viewer.

use std::time::Duration;

use opoznienia_types::Snapshot;
use tokio::sync::watch;

/// Application state shared between the event loop and rendering.
pub struct AppState {
    snapshots: watch::Receiver<Snapshot>,
    snapshot: Snapshot,
    /// Index of the first host row shown.
    pub offset: usize,
    /// Host rows that fit on screen at the last draw.
    pub visible_rows: usize,
    pub quit: bool,
}

impl AppState {
    pub fn new(snapshots: watch::Receiver<Snapshot>) -> Self {
        let snapshot = snapshots.borrow().clone();
        Self {
            snapshots,
            snapshot,
            offset: 0,
            visible_rows: 0,
            quit: false,
        }
    }

    /// Pick up the latest snapshot if the daemon published one.
    pub fn sync_snapshot(&mut self) {
        if self.snapshots.has_changed().unwrap_or(false) {
            self.snapshot = self.snapshots.borrow_and_update().clone();
        }
        self.clamp_offset();
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.offset = self.offset.saturating_sub(rows);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.offset = self.offset.saturating_add(rows);
        self.clamp_offset();
    }

    /// Keep the last page full when the host list shrinks.
    pub fn clamp_offset(&mut self) {
        let max = self.snapshot.len().saturating_sub(self.visible_rows.max(1));
        self.offset = self.offset.min(max);
    }

    /// Tick interval for the TUI refresh.
    pub fn tick_rate() -> Duration {
        Duration::from_millis(100)
    }

    #[cfg(test)]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let (_tx, rx) = watch::channel(snapshot);
        Self::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use opoznienia_types::{HostSnapshot, PerProtocol};

    use super::*;

    fn hosts(n: u8) -> Snapshot {
        Snapshot::new(
            (1..=n)
                .map(|i| HostSnapshot {
                    addr: Ipv4Addr::new(10, 0, 0, i),
                    delays: PerProtocol::from_fn(|_| Some(u64::from(i) * 100)),
                })
                .collect(),
        )
    }

    #[test]
    fn scrolling_stops_at_last_page() {
        let mut app = AppState::with_snapshot(hosts(30));
        app.visible_rows = 10;
        app.scroll_down(100);
        assert_eq!(app.offset, 20);
        app.scroll_up(5);
        assert_eq!(app.offset, 15);
        app.scroll_up(100);
        assert_eq!(app.offset, 0);
    }

    #[test]
    fn short_list_never_scrolls() {
        let mut app = AppState::with_snapshot(hosts(3));
        app.visible_rows = 10;
        app.scroll_down(1);
        assert_eq!(app.offset, 0);
    }

    #[test]
    fn new_snapshot_is_picked_up() {
        let (tx, rx) = watch::channel(Snapshot::default());
        let mut app = AppState::new(rx);
        assert!(app.snapshot().is_empty());
        tx.send(hosts(2)).unwrap();
        app.sync_snapshot();
        assert_eq!(app.snapshot().len(), 2);
    }

    #[test]
    fn shrinking_list_pulls_offset_back() {
        let (tx, rx) = watch::channel(hosts(30));
        let mut app = AppState::new(rx);
        app.visible_rows = 10;
        app.scroll_down(20);
        tx.send(hosts(12)).unwrap();
        app.sync_snapshot();
        assert_eq!(app.offset, 2);
    }
}
