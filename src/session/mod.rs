//! The chat session: active-channel selection plus the wiring between the
//! transport, the message store, unread counters and typing indicators.
//!
//! All state changes happen on the caller's task. Work that has to wait on the
//! network (publish, history fetch, presence broadcast) runs on spawned tasks
//! that report back through an internal queue, drained by [`ChatSession::pump`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::channels::{Message, MessageStore, UnreadCounter};
use crate::clock::Clock;
use crate::error::{ChatError, Result};
use crate::transport::{parse_message, InboundEvent, PresenceState, Transport, TransportEvent};
use crate::typing::{LocalTyping, TypingState, TypingTracker, TypingUpdate};

pub use options::{SessionOptions, DEFAULT_HISTORY_LIMIT};

mod options;

const MAX_NOTICES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    Unhydrated,
    Fetching,
    Hydrated,
}

/// Result of a background transport call.
#[derive(Debug)]
enum TaskOutcome {
    History {
        channel: String,
        result: anyhow::Result<Vec<Value>>,
    },
    Published {
        channel: String,
        result: anyhow::Result<()>,
    },
    Presence {
        channel: String,
        is_typing: bool,
        result: anyhow::Result<()>,
    },
    Unsubscribed {
        channel: String,
        result: anyhow::Result<()>,
    },
}

pub struct ChatSession {
    identity: String,
    channels: Vec<String>,
    active: String,
    history_limit: usize,

    store: MessageStore,
    unread: UnreadCounter,
    typing: TypingTracker,
    local_typing: LocalTyping,
    hydration: HashMap<String, Hydration>,

    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    inbound_rx: mpsc::UnboundedReceiver<TransportEvent>,
    outcomes_tx: mpsc::UnboundedSender<TaskOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<TaskOutcome>,

    notices: Vec<String>,
    changes: Arc<watch::Sender<u64>>,
}

impl ChatSession {
    /// Build a session. `inbound` is the event stream the transport feeds.
    pub fn new(
        mut options: SessionOptions,
        transport: Arc<dyn Transport>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<Self> {
        options.validate()?;
        let SessionOptions {
            identity,
            channels,
            initial_channel,
            typing_timeout,
            history_limit,
            clock,
        } = options;

        let active = match initial_channel {
            Some(channel) => channel,
            None => channels
                .first()
                .cloned()
                .ok_or_else(|| ChatError::Config("at least one channel is required".to_string()))?,
        };

        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (changes, _) = watch::channel(0);
        let changes = Arc::new(changes);

        let mut unread = UnreadCounter::new();
        unread.on_channel_activated(&active);

        Ok(Self {
            typing: TypingTracker::new(identity.clone(), typing_timeout).notify_changes(Arc::clone(&changes)),
            local_typing: LocalTyping::new(typing_timeout),
            identity,
            channels,
            active,
            history_limit,
            store: MessageStore::new(),
            unread,
            hydration: HashMap::new(),
            transport,
            clock,
            inbound_rx: inbound,
            outcomes_tx,
            outcomes_rx,
            notices: Vec::new(),
            changes,
        })
    }

    /// Subscribe to every configured channel and hydrate the active one.
    pub async fn start(&mut self) -> Result<()> {
        let active = self.active.clone();
        self.request_history(&active);

        info!(identity = %self.identity, channels = ?self.channels, "subscribing");
        if let Err(e) = self.transport.subscribe(&self.channels).await {
            let err = ChatError::transport("subscribe", &self.channels.join(", "), e);
            warn!(error = %err, "subscription failed");
            self.add_notice(err.to_string());
            self.bump();
            return Err(err);
        }
        Ok(())
    }

    // ==================== User actions ====================

    pub fn select_channel(&mut self, channel: &str) -> Result<()> {
        self.ensure_known(channel)?;

        if self.active != channel {
            if let Some(update) = self.local_typing.stop() {
                self.broadcast_typing(update);
            }
            info!(from = %self.active, to = %channel, "switching channel");
            self.active = channel.to_string();
        }

        self.unread.on_channel_activated(channel);
        self.request_history(channel);
        self.bump();
        Ok(())
    }

    /// Send `text` on the active channel as typed. Returns whether anything
    /// was sent; whitespace-only text is not.
    pub fn send_message(&mut self, text: &str) -> Result<bool> {
        let channel = self.active.clone();
        self.send_message_to(&channel, text)
    }

    pub fn send_message_to(&mut self, channel: &str, text: &str) -> Result<bool> {
        self.ensure_known(channel)?;

        if text.trim().is_empty() {
            return Ok(false);
        }

        let message = Message::new(text, self.clock.message_timestamp(), self.identity.clone());
        self.store.append_local(channel, message.clone());
        self.spawn_publish(channel, message);

        if let Some(update) = self.local_typing.stop() {
            self.broadcast_typing(update);
        }
        self.bump();
        Ok(true)
    }

    /// Feed the current content of the input box.
    pub fn set_local_typing(&mut self, text: &str) {
        let active = self.active.clone();
        let updates = self.local_typing.on_input(&active, text);
        if updates.is_empty() {
            return;
        }
        for update in updates {
            self.broadcast_typing(update);
        }
        self.bump();
    }

    /// Stop following `channel`. Its log is kept.
    pub fn leave(&mut self, channel: &str) -> Result<()> {
        self.ensure_known(channel)?;
        if self.channels.len() == 1 {
            return Err(ChatError::Config(format!("cannot leave {}, it is the only channel", channel)));
        }

        self.channels.retain(|c| c != channel);
        self.typing.forget(channel);
        self.unread.forget(channel);
        if self.local_typing.channel() == Some(channel) {
            if let Some(update) = self.local_typing.stop() {
                self.broadcast_typing(update);
            }
        }
        self.hydration.remove(channel);
        self.spawn_unsubscribe(channel);
        info!(channel = %channel, "left channel");

        if self.active == channel {
            if let Some(next) = self.channels.first().cloned() {
                self.select_channel(&next)?;
            }
        }
        self.bump();
        Ok(())
    }

    /// Withdraw our typing state, cancel every timer and unsubscribe.
    pub async fn shutdown(&mut self) {
        if let Some(update) = self.local_typing.stop() {
            let state = PresenceState::typing(self.identity.clone(), false);
            if let Err(e) = self
                .transport
                .set_presence_state(&[update.channel.clone()], &state)
                .await
            {
                warn!(channel = %update.channel, error = %e, "failed to withdraw typing state");
            }
        }
        self.typing.clear();

        if let Err(e) = self.transport.unsubscribe(&self.channels).await {
            warn!(error = %e, "failed to unsubscribe on shutdown");
        }
        info!("session shut down");
    }

    // ==================== Inbound events ====================

    /// Drain queued transport events, finished background work and fired
    /// timers. Returns how many items were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;

        while let Ok(event) = self.inbound_rx.try_recv() {
            self.handle_transport_event(event);
            handled += 1;
        }

        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            self.handle_outcome(outcome);
            handled += 1;
        }

        let expired = self.typing.poll_expired();
        if !expired.is_empty() {
            handled += expired.len();
            self.bump();
        }

        if let Some(update) = self.local_typing.poll_expired() {
            self.broadcast_typing(update);
            handled += 1;
            self.bump();
        }

        handled
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match InboundEvent::try_from(event) {
            Ok(InboundEvent::Message { channel, message }) => self.on_transport_message(&channel, message),
            Ok(InboundEvent::Presence { channel, state }) => self.on_transport_presence(&channel, &state),
            Err(e) => debug!(error = %e, "dropping inbound event"),
        }
    }

    pub fn on_transport_message(&mut self, channel: &str, message: Message) {
        if !self.is_configured(channel) {
            debug!(channel = %channel, "ignoring message for unsubscribed channel");
            return;
        }

        if self.store.ingest_live(channel, message) {
            let is_active = channel == self.active;
            self.unread.on_inbound_accepted(channel, is_active);
            self.bump();
        }
    }

    pub fn on_transport_presence(&mut self, channel: &str, state: &PresenceState) {
        if !self.is_configured(channel) {
            debug!(channel = %channel, "ignoring presence for unsubscribed channel");
            return;
        }
        if state.sender == self.identity {
            trace!(channel = %channel, "ignoring own presence");
            return;
        }

        if self.typing.on_presence_signal(channel, state) {
            self.bump();
        }
    }

    fn handle_outcome(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::History {
                channel,
                result: Ok(entries),
            } => {
                let mut messages = Vec::with_capacity(entries.len());
                for entry in entries {
                    match parse_message(entry) {
                        Ok(message) => messages.push(message),
                        Err(e) => debug!(channel = %channel, error = %e, "skipping history entry"),
                    }
                }
                let count = messages.len();
                self.store.ingest_history(&channel, messages);
                if self.is_configured(&channel) {
                    self.hydration.insert(channel.clone(), Hydration::Hydrated);
                }
                info!(channel = %channel, count, "history hydrated");
                self.bump();
            }
            TaskOutcome::History {
                channel,
                result: Err(e),
            } => {
                self.hydration.remove(&channel);
                let err = ChatError::transport("history fetch", &channel, e);
                warn!(error = %err, "history fetch failed, retrying on next activation");
                self.add_notice(err.to_string());
                self.bump();
            }
            TaskOutcome::Published { channel, result: Ok(()) } => {
                debug!(channel = %channel, "message published");
            }
            TaskOutcome::Published {
                channel,
                result: Err(e),
            } => {
                let err = ChatError::transport("publish", &channel, e);
                warn!(error = %err, "message not delivered");
                self.add_notice(format!("Message not delivered: {}", err));
                self.bump();
            }
            TaskOutcome::Presence {
                channel,
                is_typing,
                result,
            } => {
                if let Err(e) = result {
                    warn!(channel = %channel, is_typing, error = %e, "typing broadcast failed");
                }
            }
            TaskOutcome::Unsubscribed { channel, result } => {
                if let Err(e) = result {
                    warn!(channel = %channel, error = %e, "unsubscribe failed");
                }
            }
        }
    }

    // ==================== Background work ====================

    fn request_history(&mut self, channel: &str) {
        match self.hydration(channel) {
            Hydration::Fetching | Hydration::Hydrated => return,
            Hydration::Unhydrated => {}
        }
        self.hydration.insert(channel.to_string(), Hydration::Fetching);
        debug!(channel = %channel, limit = self.history_limit, "fetching history");

        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes_tx.clone();
        let channel = channel.to_string();
        let limit = self.history_limit;
        tokio::spawn(async move {
            let result = transport.fetch_history(&channel, limit).await;
            let _ = outcomes.send(TaskOutcome::History { channel, result });
        });
    }

    fn spawn_publish(&self, channel: &str, message: Message) {
        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes_tx.clone();
        let channel = channel.to_string();
        tokio::spawn(async move {
            let result = transport.publish(&channel, &message).await;
            let _ = outcomes.send(TaskOutcome::Published { channel, result });
        });
    }

    fn broadcast_typing(&self, update: TypingUpdate) {
        let TypingUpdate { channel, is_typing } = update;
        trace!(channel = %channel, is_typing, "broadcasting typing state");
        let state = PresenceState::typing(self.identity.clone(), is_typing);
        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .set_presence_state(std::slice::from_ref(&channel), &state)
                .await;
            let _ = outcomes.send(TaskOutcome::Presence {
                channel,
                is_typing,
                result,
            });
        });
    }

    fn spawn_unsubscribe(&self, channel: &str) {
        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes_tx.clone();
        let channel = channel.to_string();
        tokio::spawn(async move {
            let result = transport.unsubscribe(std::slice::from_ref(&channel)).await;
            let _ = outcomes.send(TaskOutcome::Unsubscribed { channel, result });
        });
    }

    // ==================== Helpers ====================

    fn is_configured(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    fn ensure_known(&mut self, channel: &str) -> Result<()> {
        if self.is_configured(channel) {
            return Ok(());
        }
        let err = ChatError::UnknownChannel(channel.to_string());
        warn!(channel = %channel, "rejecting unknown channel");
        self.add_notice(err.to_string());
        self.bump();
        Err(err)
    }

    pub fn add_notice(&mut self, notice: String) {
        self.notices
            .push(format!("[{}] {}", self.clock.notice_timestamp(), notice));

        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(0..excess);
        }
    }

    fn bump(&self) {
        self.changes.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    // ==================== Read-only snapshot ====================

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn active_channel(&self) -> &str {
        &self.active
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn messages<'a>(
        &'a self,
        channel: &str,
        filter: Option<&str>,
    ) -> impl Iterator<Item = &'a Message> + Clone + 'a {
        self.store.query(channel, filter)
    }

    pub fn message_count(&self, channel: &str) -> usize {
        self.store.len(channel)
    }

    pub fn is_typing(&self, channel: &str) -> bool {
        self.typing.is_typing(channel)
    }

    pub fn typist(&self, channel: &str) -> Option<&str> {
        self.typing.typist(channel)
    }

    pub fn typing_state(&self, channel: &str) -> TypingState {
        self.typing.state(channel)
    }

    pub fn is_local_typing(&self) -> bool {
        self.local_typing.is_published()
    }

    pub fn unread_count(&self, channel: &str) -> usize {
        self.unread.count(channel)
    }

    pub fn total_unread(&self) -> usize {
        self.unread.total()
    }

    pub fn hydration(&self, channel: &str) -> Hydration {
        self.hydration
            .get(channel)
            .copied()
            .unwrap_or(Hydration::Unhydrated)
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Receiver that sees a new revision after every observable change.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.changes.borrow()
    }
}
