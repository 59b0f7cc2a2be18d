use std::time::Duration;

use tracing::debug;

use crate::timer::TimerTable;

/// A typing state the caller has to broadcast on `channel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUpdate {
    pub channel: String,
    pub is_typing: bool,
}

/// The local user's outgoing typing state.
///
/// Only transitions are broadcast. Any input change re-arms an inactivity
/// timer; when it fires while "typing" is published, a stop is due.
#[derive(Debug)]
pub struct LocalTyping {
    timeout: Duration,
    published: bool,
    channel: Option<String>,
    idle: TimerTable<String>,
}

impl LocalTyping {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            published: false,
            channel: None,
            idle: TimerTable::new(),
        }
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// React to the input box changing to `text` while `channel` is active.
    pub fn on_input(&mut self, channel: &str, text: &str) -> Vec<TypingUpdate> {
        let mut updates = Vec::new();

        if self.channel.as_deref() != Some(channel) {
            updates.extend(self.stop());
            self.channel = Some(channel.to_string());
        }

        let desired = !text.trim().is_empty();
        if desired != self.published {
            self.published = desired;
            updates.push(TypingUpdate {
                channel: channel.to_string(),
                is_typing: desired,
            });
        }

        self.idle.schedule(channel.to_string(), self.timeout);
        updates
    }

    /// Withdraw the typing state, e.g. after a send or a channel switch.
    pub fn stop(&mut self) -> Option<TypingUpdate> {
        self.idle.cancel_all();
        if !self.published {
            return None;
        }
        self.published = false;
        self.channel.clone().map(|channel| TypingUpdate {
            channel,
            is_typing: false,
        })
    }

    /// The stop that is due once the inactivity timer fired, if any.
    pub fn poll_expired(&mut self) -> Option<TypingUpdate> {
        let fired = self.idle.poll_fired();
        let current = self.channel.as_ref()?;
        if !self.published || !fired.contains(current) {
            return None;
        }
        debug!(channel = %current, "local input idle, withdrawing typing state");
        self.published = false;
        Some(TypingUpdate {
            channel: current.clone(),
            is_typing: false,
        })
    }
}
