//! Typing indicators.
//!
//! [`TypingTracker`] follows remote peers per channel (`Idle` / `Typing`, with
//! automatic expiry). [`LocalTyping`] decides when the local user's own typing
//! state has to be broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::timer::TimerTable;
use crate::transport::PresenceState;

pub use local::{LocalTyping, TypingUpdate};

mod local;

/// How long a typing signal stays valid without renewal.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingPhase {
    Idle,
    Typing,
}

/// Snapshot of one channel's remote typing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingState {
    pub phase: TypingPhase,
    pub sender: Option<String>,
    pub expires_at: Option<Instant>,
}

impl TypingState {
    pub fn is_typing(&self) -> bool {
        self.phase == TypingPhase::Typing
    }
}

/// Remote typing state per channel.
///
/// A channel is `Typing` exactly while its expiry deadline lies in the
/// future, whether or not the fired timer has been polled yet.
#[derive(Debug)]
pub struct TypingTracker {
    local_identity: String,
    timeout: Duration,
    typists: HashMap<String, String>,
    timers: TimerTable<String>,
}

impl TypingTracker {
    pub fn new(local_identity: impl Into<String>, timeout: Duration) -> Self {
        Self {
            local_identity: local_identity.into(),
            timeout,
            typists: HashMap::new(),
            timers: TimerTable::new(),
        }
    }

    /// Bump `revision` whenever an indicator expires.
    pub fn notify_changes(mut self, revision: Arc<watch::Sender<u64>>) -> Self {
        self.timers = TimerTable::new().notify_on_fire(revision);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Apply a presence signal. Returns whether the channel's phase changed.
    pub fn on_presence_signal(&mut self, channel: &str, signal: &PresenceState) -> bool {
        if signal.sender == self.local_identity {
            trace!(channel = %channel, "ignoring own presence echo");
            return false;
        }

        if signal.is_typing {
            let was_typing = self.is_typing(channel);
            self.timers.schedule(channel.to_string(), self.timeout);
            self.typists.insert(channel.to_string(), signal.sender.clone());
            if !was_typing {
                debug!(channel = %channel, sender = %signal.sender, "peer started typing");
            }
            !was_typing
        } else {
            let same_sender = self
                .typists
                .get(channel)
                .is_some_and(|typist| *typist == signal.sender);
            if !same_sender {
                return false;
            }
            self.timers.cancel(&channel.to_string());
            self.typists.remove(channel);
            debug!(channel = %channel, sender = %signal.sender, "peer stopped typing");
            true
        }
    }

    /// Expire channels whose timer fired. Returns the channels that went idle.
    pub fn poll_expired(&mut self) -> Vec<String> {
        let expired = self.timers.poll_fired();
        for channel in &expired {
            if self.typists.remove(channel).is_some() {
                debug!(channel = %channel, "typing indicator expired");
            }
        }
        expired
    }

    /// Current typist and deadline, treating an elapsed deadline as idle.
    fn live(&self, channel: &str) -> Option<(&str, Instant)> {
        let sender = self.typists.get(channel)?;
        let deadline = self.timers.deadline(&channel.to_string())?;
        (deadline > Instant::now()).then_some((sender.as_str(), deadline))
    }

    pub fn is_typing(&self, channel: &str) -> bool {
        self.live(channel).is_some()
    }

    pub fn typist(&self, channel: &str) -> Option<&str> {
        self.live(channel).map(|(sender, _)| sender)
    }

    pub fn state(&self, channel: &str) -> TypingState {
        match self.live(channel) {
            Some((sender, deadline)) => TypingState {
                phase: TypingPhase::Typing,
                sender: Some(sender.to_string()),
                expires_at: Some(deadline),
            },
            None => TypingState {
                phase: TypingPhase::Idle,
                sender: None,
                expires_at: None,
            },
        }
    }

    /// Drop all state for a channel that is no longer subscribed.
    pub fn forget(&mut self, channel: &str) {
        self.timers.cancel(&channel.to_string());
        self.typists.remove(channel);
    }

    pub fn clear(&mut self) {
        self.timers.cancel_all();
        self.typists.clear();
    }
}
