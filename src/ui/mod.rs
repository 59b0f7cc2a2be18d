use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use hubchat::channels::participant_name;

use crate::app::{App, AppState, InputMode};

pub fn draw(f: &mut Frame<'_>, app: &App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Input area
        ])
        .split(size);

    draw_title_bar(f, app, chunks[0]);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(70), // Chat area
            Constraint::Percentage(30), // Info panel
        ])
        .split(chunks[1]);

    draw_chat_area(f, app, main_chunks[0]);
    draw_info_panel(f, app, main_chunks[1]);

    draw_input_area(f, app, chunks[2]);
}

fn state_style(state: &AppState) -> Style {
    match state {
        AppState::Connected => Style::default().fg(Color::Green),
        AppState::Connecting | AppState::Offline => Style::default().fg(Color::Yellow),
        AppState::Error(_) => Style::default().fg(Color::Red),
    }
}

fn draw_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let title = format!(
        " {} | talking to {} | {} ",
        app.role.identity(),
        participant_name(app.session.active_channel()),
        match &app.state {
            AppState::Connected => "connected",
            AppState::Connecting => "connecting...",
            AppState::Offline => "offline",
            AppState::Error(e) => e.as_str(),
        }
    );

    let title_block = Block::default()
        .borders(Borders::ALL)
        .style(state_style(&app.state))
        .title(if app.role.is_admin() { " hubchat admin " } else { " hubchat " });

    let title_paragraph = Paragraph::new(title)
        .block(title_block)
        .alignment(Alignment::Center);

    f.render_widget(title_paragraph, area);
}

fn draw_chat_area(f: &mut Frame, app: &App, area: Rect) {
    let active = app.session.active_channel();
    let title = match &app.filter {
        Some(filter) => format!(" Chat with {} (matching \"{}\") ", participant_name(active), filter),
        None => format!(" Chat with {} ", participant_name(active)),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    // One row is kept for the typing indicator.
    let height = (inner.height as usize).saturating_sub(1);
    let mut lines = Vec::new();

    for message in app.get_visible_messages(height) {
        let nick_color = if message.sender == app.session.identity() {
            Color::Green
        } else {
            Color::Magenta
        };

        let mut spans = vec![
            Span::styled(format!("[{}] ", message.timestamp), Style::default().fg(Color::Gray)),
            Span::styled(format!("<{}> ", message.sender), Style::default().fg(nick_color)),
            Span::raw(message.text.as_str()),
        ];
        if let Some(attachment) = &message.attachment_ref {
            spans.push(Span::styled(
                format!(" [file: {}]", attachment),
                Style::default().fg(Color::Blue),
            ));
        }
        lines.push(Line::from(spans));
    }

    if lines.is_empty() {
        let hint_text = if app.filter.is_some() {
            "No messages match the current filter. Use /find to clear it."
        } else {
            "No messages in this conversation yet. Press 'i', type a message and press Enter."
        };
        lines.push(Line::from(Span::styled(
            hint_text,
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )));
    }

    if let Some(typist) = app.session.typist(active) {
        lines.push(Line::from(Span::styled(
            format!("{} is typing...", typist),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        )));
    }

    let messages_widget = Paragraph::new(lines).wrap(Wrap { trim: false });
    f.render_widget(messages_widget, inner);
}

fn draw_info_panel(f: &mut Frame<'_>, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),  // Identity info
            Constraint::Length(8),  // Conversations
            Constraint::Min(0),     // Notices
        ])
        .split(area);

    let identity_block = Block::default()
        .borders(Borders::ALL)
        .title(" Identity ")
        .style(Style::default().fg(Color::Blue));

    let mut identity_text = vec![Line::from(vec![
        Span::raw("Name: "),
        Span::styled(app.role.identity(), Style::default().fg(Color::Green)),
    ])];
    match &app.keys {
        Some(keys) => {
            identity_text.push(Line::from(vec![
                Span::raw("Pubkey: "),
                Span::styled(keys.short_pubkey(), Style::default().fg(Color::Gray)),
                Span::styled("...", Style::default().fg(Color::Gray)),
            ]));
            identity_text.push(Line::from(vec![
                Span::raw("Relays: "),
                Span::styled(format!("{}", app.relay_count), Style::default().fg(Color::Cyan)),
            ]));
        }
        None => identity_text.push(Line::from(Span::styled(
            "offline loopback",
            Style::default().fg(Color::Yellow),
        ))),
    }

    let identity_paragraph = Paragraph::new(identity_text).block(identity_block);
    f.render_widget(identity_paragraph, chunks[0]);

    let channels_block = Block::default()
        .borders(Borders::ALL)
        .title(" Conversations ")
        .style(Style::default().fg(Color::Blue));

    let items: Vec<ListItem> = app
        .session
        .channels()
        .iter()
        .map(|channel| {
            let is_active = channel == app.session.active_channel();
            let unread = app.session.unread_count(channel);
            let label = if unread > 0 {
                format!("{} ({})", participant_name(channel), unread)
            } else {
                participant_name(channel).to_string()
            };
            let style = if is_active {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else if unread > 0 {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(label).style(style)
        })
        .collect();

    f.render_widget(List::new(items).block(channels_block), chunks[1]);

    let notices_block = Block::default()
        .borders(Borders::ALL)
        .title(" Notices ")
        .style(Style::default().fg(Color::Blue));
    let visible = chunks[2].height.saturating_sub(2) as usize;
    let notice_lines: Vec<Line> = app
        .get_visible_notices(visible)
        .iter()
        .map(|notice| Line::from(Span::styled(notice.as_str(), Style::default().fg(Color::Gray))))
        .collect();
    let notices = Paragraph::new(notice_lines)
        .block(notices_block)
        .wrap(Wrap { trim: true });
    f.render_widget(notices, chunks[2]);
}

fn draw_input_area(f: &mut Frame, app: &App, area: Rect) {
    let input_style = match app.input_mode {
        InputMode::Normal => Style::default().fg(Color::White),
        InputMode::Editing => Style::default().fg(Color::Green),
    };

    let mode_indicator = match app.input_mode {
        InputMode::Normal => "[NORMAL] Press 'i' to enter input mode",
        InputMode::Editing => "[INPUT] ESC=normal, ENTER=send",
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .title(mode_indicator)
        .style(input_style);

    let input_text = if app.input_mode == InputMode::Editing {
        app.input.as_str()
    } else {
        ""
    };

    let input_paragraph = Paragraph::new(input_text)
        .block(input_block)
        .wrap(Wrap { trim: false });

    f.render_widget(input_paragraph, area);

    if app.input_mode == InputMode::Editing {
        f.set_cursor(area.x + app.cursor_position as u16 + 1, area.y + 1);
    }
}
