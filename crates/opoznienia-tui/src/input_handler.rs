//! Maps terminal keyboard events to viewer actions.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::AppState;

/// Handle a terminal key event.
///
/// Returns `true` if the app should quit.
pub fn handle_key(key: KeyEvent, app: &mut AppState) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    let page = app.visible_rows.max(1);
    match key.code {
        KeyCode::Char('q' | 'Q') | KeyCode::Esc => return true,
        // Same scroll keys as the telnet UI
        KeyCode::Up | KeyCode::Char('a' | 'A') => app.scroll_up(1),
        KeyCode::Down | KeyCode::Char('z' | 'Z') => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(page),
        KeyCode::PageDown => app.scroll_down(page),
        KeyCode::Home => app.offset = 0,
        KeyCode::End => app.scroll_down(usize::MAX),
        _ => {}
    }
    false
}
