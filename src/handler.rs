use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::App;
use crate::tui::AppEvent;

const MOUSE_SCROLL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Session(event) => app.session.handle_event(event),
    }
    app.sync_scroll();
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('c') if ctrl => app.quit(),
        KeyCode::Esc => app.quit(),

        // Talk / stop
        KeyCode::Char('t') if ctrl => app.toggle_talk(),
        KeyCode::F(2) => app.toggle_talk(),

        KeyCode::Tab | KeyCode::BackTab => app.toggle_focus(),

        KeyCode::Enter => match app.focus {
            crate::app::Focus::Input => app.submit(),
            // Leaving the ID field commits it
            crate::app::Focus::ConversationId => app.toggle_focus(),
        },

        KeyCode::PageUp => app.scroll_up(app.chat_height.max(1) / 2),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(1) / 2),
        KeyCode::Up if ctrl => app.scroll_up(1),
        KeyCode::Down if ctrl => app.scroll_down(1),

        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char(c) if !ctrl => app.insert_char(c),

        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(MOUSE_SCROLL_LINES),
        MouseEventKind::ScrollUp => app.scroll_up(MOUSE_SCROLL_LINES),
        _ => {}
    }
}
