use ratatui::layout::Rect;
use voice_chat::SessionController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    /// Message input box
    Input,
    /// Conversation ID field
    ConversationId,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,
    pub focus: Focus,
    pub session: SessionController,
    pub api_base: String,

    // Cursor positions, in chars
    pub input_cursor: usize,
    pub conversation_cursor: usize,

    // Chat pane
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height, for scroll calculations
    pub chat_width: u16,  // inner width, for wrap calculations
    pub chat_area: Option<Rect>,
    follow_tail: bool,
    seen_messages: usize,
    seen_loading: bool,

    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(session: SessionController, api_base: String) -> Self {
        let conversation_cursor = session.conversation_id().chars().count();
        Self {
            should_quit: false,
            focus: Focus::Input,
            session,
            api_base,
            input_cursor: 0,
            conversation_cursor,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            follow_tail: true,
            seen_messages: 0,
            seen_loading: false,
            animation_frame: 0,
        }
    }

    fn focused_field(&mut self) -> (&mut String, &mut usize) {
        match self.focus {
            Focus::Input => (self.session.pending_input_mut(), &mut self.input_cursor),
            Focus::ConversationId => (
                self.session.conversation_id_mut(),
                &mut self.conversation_cursor,
            ),
        }
    }

    // Text editing on the focused field

    pub fn insert_char(&mut self, c: char) {
        let (text, cursor) = self.focused_field();
        let byte_pos = char_to_byte_index(text, *cursor);
        text.insert(byte_pos, c);
        *cursor += 1;
    }

    pub fn backspace(&mut self) {
        let (text, cursor) = self.focused_field();
        if *cursor > 0 {
            *cursor -= 1;
            let byte_pos = char_to_byte_index(text, *cursor);
            text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        let (text, cursor) = self.focused_field();
        if *cursor < text.chars().count() {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        let (_, cursor) = self.focused_field();
        *cursor = cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let (text, cursor) = self.focused_field();
        *cursor = (*cursor + 1).min(text.chars().count());
    }

    pub fn cursor_home(&mut self) {
        let (_, cursor) = self.focused_field();
        *cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        let (text, cursor) = self.focused_field();
        *cursor = text.chars().count();
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Input => Focus::ConversationId,
            Focus::ConversationId => Focus::Input,
        };
    }

    // Controls

    /// Send button; disabled while a reply is pending
    pub fn submit(&mut self) {
        if self.session.is_loading() {
            return;
        }
        self.session.submit_input();
        self.input_cursor = self.session.pending_input().chars().count();
        self.follow_tail = true;
    }

    pub fn toggle_talk(&mut self) {
        self.session.toggle_listening();
    }

    pub fn quit(&mut self) {
        self.session.shutdown();
        self.should_quit = true;
    }

    // Chat scrolling

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.total_chat_lines().saturating_sub(self.visible_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
        self.follow_tail = self.chat_scroll >= max_scroll;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Called after every event; keeps the newest message in view
    pub fn sync_scroll(&mut self) {
        let messages = self.session.messages().len();
        let loading = self.session.is_loading();
        if messages != self.seen_messages || loading != self.seen_loading {
            self.seen_messages = messages;
            self.seen_loading = loading;
            if self.follow_tail {
                self.scroll_to_bottom();
            }
        }
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Lines the chat pane needs at the current width
    pub fn total_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        // Saturates; the pane cannot scroll past u16::MAX anyway
        let mut total_lines: u16 = 0;
        for msg in self.session.messages() {
            total_lines = total_lines.saturating_add(1); // role label
            for line in msg.content.lines() {
                // chars, not bytes
                let char_count = line.chars().count();
                let wrapped = u16::try_from(char_count / wrap_width + 1).unwrap_or(u16::MAX);
                total_lines = total_lines.saturating_add(wrapped);
            }
            total_lines = total_lines.saturating_add(1); // blank line after message
        }
        if self.session.is_loading() {
            total_lines = total_lines.saturating_add(2); // label + "thinking"
        }
        total_lines
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.total_chat_lines().saturating_sub(self.visible_height());
        self.follow_tail = true;
    }
}
