use std::collections::HashMap;

/// Unread message counters per channel.
#[derive(Debug, Default)]
pub struct UnreadCounter {
    counts: HashMap<String, usize>,
}

impl UnreadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted inbound message, unless the user is looking at its channel.
    pub fn on_inbound_accepted(&mut self, channel: &str, is_active_channel: bool) {
        if is_active_channel {
            return;
        }
        *self.counts.entry(channel.to_string()).or_insert(0) += 1;
    }

    pub fn on_channel_activated(&mut self, channel: &str) {
        self.counts.insert(channel.to_string(), 0);
    }

    /// Drop the counter of a channel that is no longer followed.
    pub fn forget(&mut self, channel: &str) {
        self.counts.remove(channel);
    }

    pub fn count(&self, channel: &str) -> usize {
        self.counts.get(channel).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}
