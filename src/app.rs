use std::sync::Arc;

use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent};
use tokio::sync::{mpsc, watch};
use tracing::info;

use hubchat::channels::{channel_for, participant_name, Message, CHANNEL_SUFFIX};
use hubchat::clock::SystemClock;
use hubchat::config::{Config, Role};
use hubchat::nostr::{Identity, NostrSettings, NostrTransport};
use hubchat::session::ChatSession;
use hubchat::transport::{MemoryTransport, Transport};

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Connecting,
    Connected,
    Offline,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub state: AppState,
    pub input_mode: InputMode,
    pub input: String,
    /// Cursor position in characters, not bytes.
    pub cursor_position: usize,
    /// Lines scrolled up from the newest message.
    pub scroll_offset: usize,
    pub filter: Option<String>,

    pub role: Role,
    pub keys: Option<Identity>,
    pub relay_count: usize,
    pub session: ChatSession,

    changes: watch::Receiver<u64>,
    needs_redraw: bool,
}

impl App {
    pub async fn new(role: Role, config: &Config, nsec: Option<&str>, offline: bool) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let (transport, keys, relay_count): (Arc<dyn Transport>, Option<Identity>, usize) = if offline {
            (Arc::new(MemoryTransport::with_echo(events_tx)) as Arc<dyn Transport>, None, 0)
        } else {
            let identity = match nsec {
                Some(nsec) => Identity::from_nsec(nsec)?,
                None => Identity::ephemeral(),
            };
            let settings = NostrSettings {
                relays: config.relays.clone(),
                connect_timeout: config.connect_timeout(),
                publish_timeout: config.publish_timeout(),
            };
            let nostr = NostrTransport::new(&identity, settings, events_tx).await?;
            nostr.connect().await?;
            let relay_count = nostr.relay_count();
            (Arc::new(nostr) as Arc<dyn Transport>, Some(identity), relay_count)
        };

        let options = config.session_options(&role, Arc::new(SystemClock));
        let session = ChatSession::new(options, transport, events_rx)?;
        let changes = session.subscribe_changes();

        let mut app = Self {
            should_quit: false,
            state: AppState::Connecting,
            input_mode: InputMode::Normal,
            input: String::new(),
            cursor_position: 0,
            scroll_offset: 0,
            filter: None,

            role,
            keys,
            relay_count,
            session,

            changes,
            needs_redraw: true,
        };

        app.session.add_notice(format!(
            "hubchat v{} - chatting as {} ({})",
            env!("CARGO_PKG_VERSION"),
            app.role.identity(),
            if offline { "offline" } else { "nostr" }
        ));

        app.state = match app.session.start().await {
            Ok(()) if offline => AppState::Offline,
            Ok(()) => AppState::Connected,
            Err(e) => AppState::Error(e.to_string()),
        };
        info!(state = ?app.state, "session started");

        Ok(app)
    }

    pub async fn handle_input(&mut self, event: Event) -> Result<()> {
        if let Event::Key(key) = event {
            self.handle_key_event(key).await?;
        }
        self.needs_redraw = true;
        Ok(())
    }

    async fn handle_key_event(&mut self, key: KeyEvent) -> Result<()> {
        match self.input_mode {
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                }
                KeyCode::Char('i') => {
                    self.input_mode = InputMode::Editing;
                }
                KeyCode::Tab => self.cycle_channel(1),
                KeyCode::BackTab => self.cycle_channel(-1),
                KeyCode::Up => {
                    self.scroll_offset += 1;
                }
                KeyCode::Down => {
                    self.scroll_offset = self.scroll_offset.saturating_sub(1);
                }
                KeyCode::PageUp => {
                    self.scroll_offset += 10;
                }
                KeyCode::PageDown => {
                    self.scroll_offset = self.scroll_offset.saturating_sub(10);
                }
                _ => {}
            },
            InputMode::Editing => {
                match key.code {
                    KeyCode::Enter => {
                        self.submit_input().await?;
                        self.input.clear();
                        self.cursor_position = 0;
                        self.input_mode = InputMode::Normal;
                    }
                    KeyCode::Char(c) => {
                        let at = self.byte_index();
                        self.input.insert(at, c);
                        self.cursor_position += 1;
                    }
                    KeyCode::Backspace => {
                        if self.cursor_position > 0 {
                            self.cursor_position -= 1;
                            let at = self.byte_index();
                            self.input.remove(at);
                        }
                    }
                    KeyCode::Delete => {
                        if self.cursor_position < self.input.chars().count() {
                            let at = self.byte_index();
                            self.input.remove(at);
                        }
                    }
                    KeyCode::Left => {
                        self.cursor_position = self.cursor_position.saturating_sub(1);
                    }
                    KeyCode::Right => {
                        if self.cursor_position < self.input.chars().count() {
                            self.cursor_position += 1;
                        }
                    }
                    KeyCode::Home => {
                        self.cursor_position = 0;
                    }
                    KeyCode::End => {
                        self.cursor_position = self.input.chars().count();
                    }
                    KeyCode::Esc => {
                        self.input.clear();
                        self.cursor_position = 0;
                        self.input_mode = InputMode::Normal;
                    }
                    _ => return Ok(()),
                }
                // Commands are not chat text; never advertise typing for them.
                let draft = if self.input.starts_with('/') { "" } else { self.input.as_str() };
                self.session.set_local_typing(draft);
            }
        }
        Ok(())
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    async fn submit_input(&mut self) -> Result<()> {
        let input = self.input.trim().to_string();
        if input.is_empty() {
            return Ok(());
        }

        if let Some(command) = input.strip_prefix('/') {
            self.handle_command(command).await?;
        } else {
            // Failures are already recorded as session notices.
            let _ = self.session.send_message(&input);
            self.scroll_offset = 0;
        }

        Ok(())
    }

    async fn handle_command(&mut self, command: &str) -> Result<()> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(());
        }

        match parts[0].to_lowercase().as_str() {
            "switch" | "s" => {
                if parts.len() != 2 {
                    self.session.add_notice("Usage: /switch <participant>".to_string());
                    return Ok(());
                }
                let _ = self.session.select_channel(&resolve_channel(parts[1]));
                self.scroll_offset = 0;
            }
            "msg" | "m" => {
                if parts.len() < 3 {
                    self.session.add_notice("Usage: /msg <participant> <message>".to_string());
                    return Ok(());
                }
                let message = parts[2..].join(" ");
                let _ = self.session.send_message_to(&resolve_channel(parts[1]), &message);
            }
            "leave" | "part" | "l" => {
                let channel = match parts.get(1) {
                    Some(name) => resolve_channel(name),
                    None => self.session.active_channel().to_string(),
                };
                if let Err(e) = self.session.leave(&channel) {
                    self.session.add_notice(e.to_string());
                }
            }
            "find" | "f" => {
                self.filter = if parts.len() > 1 {
                    Some(parts[1..].join(" "))
                } else {
                    None
                };
                self.scroll_offset = 0;
            }
            "list" | "channels" => {
                self.list_channels();
            }
            "help" | "h" | "commands" => {
                self.show_help();
            }
            "quit" | "q" | "exit" => {
                self.should_quit = true;
            }
            _ => {
                self.session.add_notice(format!(
                    "Unknown command: {}. Type /help for available commands.",
                    parts[0]
                ));
            }
        }

        Ok(())
    }

    fn cycle_channel(&mut self, step: isize) {
        let channels = self.session.channels();
        if channels.len() < 2 {
            return;
        }
        let current = channels
            .iter()
            .position(|c| c == self.session.active_channel())
            .unwrap_or(0) as isize;
        let next = (current + step).rem_euclid(channels.len() as isize) as usize;
        let channel = channels[next].clone();
        let _ = self.session.select_channel(&channel);
        self.scroll_offset = 0;
    }

    fn list_channels(&mut self) {
        let lines: Vec<String> = self
            .session
            .channels()
            .iter()
            .map(|channel| {
                let indicator = if channel == self.session.active_channel() { "*" } else { " " };
                format!(
                    "{}{} ({} messages, {} unread)",
                    indicator,
                    participant_name(channel),
                    self.session.message_count(channel),
                    self.session.unread_count(channel)
                )
            })
            .collect();

        self.session.add_notice("Channels:".to_string());
        for line in lines {
            self.session.add_notice(line);
        }
    }

    fn show_help(&mut self) {
        let help_text = [
            "hubchat commands:",
            "/switch <participant> - Switch to a participant's conversation",
            "/msg <participant> <message> - Send to a conversation without switching",
            "/leave [participant] - Stop following a conversation",
            "/find <text> - Show only messages containing text, /find to clear",
            "/list - List conversations with unread counts",
            "/help, /commands - Show this help",
            "/quit, /exit - Exit hubchat",
            "",
            "Keyboard:",
            "i=enter input mode, Esc=exit to normal mode, q=quit (normal mode)",
            "Tab/Shift-Tab=next/previous conversation, Up/Down/PgUp/PgDn=scroll",
        ];

        for line in help_text {
            self.session.add_notice(line.to_string());
        }
    }

    pub async fn on_tick(&mut self) -> Result<()> {
        self.session.pump();

        if self.changes.has_changed().unwrap_or(false) {
            self.changes.borrow_and_update();
            self.needs_redraw = true;
        }
        Ok(())
    }

    /// Whether anything changed since the last call.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    pub async fn shutdown(&mut self) {
        self.session.shutdown().await;
    }

    pub fn get_visible_messages(&self, height: usize) -> Vec<&Message> {
        let messages: Vec<&Message> = self
            .session
            .messages(self.session.active_channel(), self.filter.as_deref())
            .collect();
        let end = messages.len().saturating_sub(self.scroll_offset);
        let start = end.saturating_sub(height);
        messages[start..end].to_vec()
    }

    pub fn get_visible_notices(&self, height: usize) -> &[String] {
        let notices = self.session.notices();
        &notices[notices.len().saturating_sub(height)..]
    }
}

/// Accept either a participant name or a full channel name.
fn resolve_channel(name: &str) -> String {
    if name.ends_with(CHANNEL_SUFFIX) {
        name.to_string()
    } else {
        channel_for(name)
    }
}
