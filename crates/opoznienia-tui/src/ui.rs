//! TUI rendering with ratatui.

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Frame;

use opoznienia_types::{HostSnapshot, Protocol};

use crate::app::AppState;

const ADDR_WIDTH: u16 = 15;
const DELAY_WIDTH: u16 = 10;

pub fn draw(f: &mut Frame, app: &mut AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(3),    // Hosts
            Constraint::Length(3), // Help bar
        ])
        .split(f.area());

    draw_title(f, chunks[0], app);
    draw_hosts(f, chunks[1], app);
    draw_help(f, chunks[2]);
}

fn draw_title(f: &mut Frame, area: Rect, app: &AppState) {
    let snapshot = app.snapshot();
    let scale = snapshot
        .max_delay
        .map_or_else(|| "no data yet".to_string(), |d| format!("worst mean {d} µs"));
    let title = Paragraph::new(format!("opoznienia: {} hosts, {scale}", snapshot.len()))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn draw_hosts(f: &mut Frame, area: Rect, app: &mut AppState) {
    // Borders take two lines, the header one more.
    app.visible_rows = usize::from(area.height.saturating_sub(3));
    app.clamp_offset();

    let snapshot = app.snapshot();
    if snapshot.is_empty() {
        let msg = Paragraph::new("Waiting for hosts...")
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center)
            .block(Block::default().title("Hosts").borders(Borders::ALL));
        f.render_widget(msg, area);
        return;
    }

    let fixed = ADDR_WIDTH + 3 * DELAY_WIDTH + 4 + 2;
    let bar_width = usize::from(area.width.saturating_sub(fixed));

    let header = Row::new(
        std::iter::once(Cell::from("Address"))
            .chain(Protocol::ALL.iter().map(|p| Cell::from(p.to_string().to_uppercase())))
            .chain(std::iter::once(Cell::from("Mean"))),
    )
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = snapshot
        .hosts
        .iter()
        .skip(app.offset)
        .take(app.visible_rows)
        .map(|host| host_row(host, snapshot.max_delay, bar_width));

    let widths = [
        Constraint::Length(ADDR_WIDTH),
        Constraint::Length(DELAY_WIDTH),
        Constraint::Length(DELAY_WIDTH),
        Constraint::Length(DELAY_WIDTH),
        Constraint::Min(0),
    ];
    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(format!("Hosts {}-{}", app.offset + 1, snapshot.len()))
            .borders(Borders::ALL),
    );
    f.render_widget(table, area);
}

fn host_row(host: &HostSnapshot, max_delay: Option<u64>, bar_width: usize) -> Row<'static> {
    let mut cells = vec![Cell::from(host.addr.to_string())];
    cells.extend(host.delays.iter().map(|(_, delay)| match delay {
        Some(us) => Cell::from(us.to_string()),
        None => Cell::from("---").style(Style::default().fg(Color::DarkGray)),
    }));
    cells.push(Cell::from(bar(host.mean_delay(), max_delay, bar_width)));
    Row::new(cells)
}

/// Bar proportional to `mean / max`, at least one cell for any data.
fn bar(mean: Option<u64>, max: Option<u64>, width: usize) -> Line<'static> {
    let (Some(mean), Some(max)) = (mean, max) else {
        return Line::default();
    };
    if width == 0 || max == 0 {
        return Line::default();
    }
    let cells = (u128::from(mean) * width as u128).div_ceil(u128::from(max));
    let cells = usize::try_from(cells).unwrap_or(width).clamp(1, width);
    let color = if cells * 3 > width * 2 {
        Color::Red
    } else if cells * 3 > width {
        Color::Yellow
    } else {
        Color::Green
    };
    Line::from(Span::styled("█".repeat(cells), Style::default().fg(color)))
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new("q: quit  up/down: scroll  PgUp/PgDn: page  Home/End: jump")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, area);
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use opoznienia_types::{PerProtocol, Snapshot};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use super::*;

    fn render(app: &mut AppState, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect()
    }

    fn host(last: u8, udp: Option<u64>, tcp: Option<u64>, icmp: Option<u64>) -> HostSnapshot {
        HostSnapshot {
            addr: Ipv4Addr::new(10, 0, 0, last),
            delays: PerProtocol { udp, tcp, icmp },
        }
    }

    #[test]
    fn empty_snapshot_shows_waiting() {
        let mut app = AppState::with_snapshot(Snapshot::default());
        let lines = render(&mut app, 80, 12);
        assert!(lines.iter().any(|l| l.contains("Waiting for hosts")));
        assert!(lines.iter().any(|l| l.contains("no data yet")));
    }

    #[test]
    fn hosts_render_with_missing_delays() {
        let snapshot = Snapshot::new(vec![
            host(1, Some(150), None, Some(90)),
            host(2, None, None, None),
        ]);
        let mut app = AppState::with_snapshot(snapshot);
        let lines = render(&mut app, 80, 12);
        let first = lines.iter().find(|l| l.contains("10.0.0.1")).unwrap();
        assert!(first.contains("150"));
        assert!(first.contains("---"));
        assert!(first.contains("90"));
        assert!(first.contains('█'));
        let second = lines.iter().find(|l| l.contains("10.0.0.2")).unwrap();
        assert_eq!(second.matches("---").count(), 3);
        assert!(!second.contains('█'));
    }

    #[test]
    fn visible_rows_follow_terminal_height() {
        let snapshot = Snapshot::new((1..=40).map(|i| host(i, Some(100), None, None)).collect());
        let mut app = AppState::with_snapshot(snapshot);
        render(&mut app, 80, 20);
        // 20 lines minus title, help, borders and header
        assert_eq!(app.visible_rows, 11);
    }

    #[test]
    fn bar_scales_with_mean() {
        assert_eq!(bar(Some(100), Some(100), 20).width(), 20);
        assert_eq!(bar(Some(50), Some(100), 20).width(), 10);
        assert_eq!(bar(Some(1), Some(1_000_000), 20).width(), 1);
        assert_eq!(bar(None, Some(100), 20).width(), 0);
        assert_eq!(bar(Some(10), Some(100), 0).width(), 0);
    }
}
