//! Keyboard input dispatch: the search prompt first, then chart keys.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::app::ChartApp;

pub fn handle_key(app: &mut ChartApp, key: KeyEvent) {
    // Windows sends both Press and Release.
    if key.kind != KeyEventKind::Press {
        return;
    }

    if app.search.is_some() {
        handle_search_key(app, key);
        return;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.running = false,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.running = false
        }
        KeyCode::Char('/') => app.begin_search(),
        KeyCode::Char('t') => app.cycle_timeframe(true),
        KeyCode::Char('T') => app.cycle_timeframe(false),
        KeyCode::Char('[') | KeyCode::Left => app.shift_day(-1),
        KeyCode::Char(']') | KeyCode::Right => app.shift_day(1),
        KeyCode::Char('r') => app.reset_range(),
        _ => {}
    }
}

fn handle_search_key(app: &mut ChartApp, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_search(),
        KeyCode::Enter => app.submit_search(),
        KeyCode::Backspace => {
            if let Some(query) = app.search.as_mut() {
                query.pop();
            }
        }
        KeyCode::Char(c) => {
            if let Some(query) = app.search.as_mut() {
                query.push(c);
            }
        }
        _ => {}
    }
}
