use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use voice_chat::ChatRole;
use crate::app::{App, Focus};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let error_height = if app.session.last_error().is_some() { 3 } else { 0 };

    let [header_area, conversation_area, error_area, chat_area, controls_area, footer_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(error_height),
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(area);

    render_header(app, frame, header_area);
    render_conversation_id(app, frame, conversation_area);
    if error_height > 0 {
        render_error(app, frame, error_area);
    }
    render_chat(app, frame, chat_area);
    render_controls(app, frame, controls_area);
    render_footer(frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Voice AI Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!(" {} ", app.api_base), Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

/// Single-line text field with horizontal scrolling that keeps the cursor visible
fn render_text_field(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    text: &str,
    cursor: usize,
    focused: bool,
    placeholder: &str,
) {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width > 0 && cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };

    let paragraph = if text.is_empty() && !focused {
        Paragraph::new(Span::styled(placeholder.to_string(), Style::default().fg(Color::DarkGray)))
    } else {
        let visible: String = text.chars().skip(scroll_offset).take(inner_width).collect();
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan))
    };
    frame.render_widget(paragraph.block(block), area);

    if focused {
        let cursor_x = (cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_conversation_id(app: &App, frame: &mut Frame, area: Rect) {
    render_text_field(
        frame,
        area,
        " Conversation ID ",
        app.session.conversation_id(),
        app.conversation_cursor,
        app.focus == Focus::ConversationId,
        "",
    );
}

fn render_error(app: &App, frame: &mut Frame, area: Rect) {
    let Some(error) = app.session.last_error() else {
        return;
    };
    let banner = Paragraph::new(error.to_string())
        .style(Style::default().fg(Color::LightRed))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(banner, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Stored for mouse hit-testing and scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let loading = app.session.is_loading();
    let messages = app.session.messages();

    let text = if messages.is_empty() && !loading {
        Text::from(Span::styled(
            "Start by typing a message below or press Ctrl+T to talk.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in messages {
            // User bubbles on the right, assistant on the left
            let (alignment, color) = match msg.role {
                ChatRole::User => (Alignment::Right, Color::Cyan),
                ChatRole::Assistant => (Alignment::Left, Color::Yellow),
            };
            lines.push(
                Line::from(Span::styled(
                    msg.role.label(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))
                .alignment(alignment),
            );
            for line in msg.content.lines() {
                lines.push(Line::from(line.to_string()).alignment(alignment));
            }
            lines.push(Line::default());
        }

        if loading {
            lines.push(Line::from(Span::styled(
                ChatRole::Assistant.label(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Assistant is thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_controls(app: &App, frame: &mut Frame, area: Rect) {
    let [talk_area, input_area, send_area] = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(0),
        Constraint::Length(12),
    ])
    .areas(area);

    let (talk_label, talk_style) = if app.session.is_listening() {
        (" Stop ", Style::default().bg(Color::Red).fg(Color::White).bold())
    } else {
        (" Talk ", Style::default().fg(Color::White))
    };
    let talk = Paragraph::new(talk_label)
        .alignment(Alignment::Center)
        .style(talk_style)
        .block(Block::default().borders(Borders::ALL).title(" ^T "));
    frame.render_widget(talk, talk_area);

    render_text_field(
        frame,
        input_area,
        " Message ",
        app.session.pending_input(),
        app.input_cursor,
        app.focus == Focus::Input,
        "Type a message…",
    );

    let loading = app.session.is_loading();
    let (send_label, send_style) = if loading {
        (" Sending… ", Style::default().fg(Color::DarkGray))
    } else {
        (" Send ", Style::default().fg(Color::White).bg(Color::Blue).bold())
    };
    let send = Paragraph::new(send_label)
        .alignment(Alignment::Center)
        .style(send_style)
        .block(Block::default().borders(Borders::ALL).title(" ⏎ "));
    frame.render_widget(send, send_area);
}

fn render_footer(frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = Line::from(vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" ^T ", key_style),
        Span::styled(" talk/stop ", label_style),
        Span::styled(" Tab ", key_style),
        Span::styled(" conversation id ", label_style),
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(hints), area);
}
