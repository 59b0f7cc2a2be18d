use std::collections::HashMap;

use tracing::debug;

use super::{ChannelLog, FingerprintKey, Message};

/// Per-channel message logs, keyed by channel name.
///
/// Logs are created on first touch and never removed; a channel nobody has
/// heard of simply reads as empty.
#[derive(Debug, Default)]
pub struct MessageStore {
    channels: HashMap<String, ChannelLog>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn log_mut(&mut self, channel: &str) -> &mut ChannelLog {
        self.channels.entry(channel.to_string()).or_insert_with(|| {
            debug!(channel = %channel, "creating channel log");
            ChannelLog::new()
        })
    }

    /// Seed the log with replayed history.
    ///
    /// History comes first in the order given. Entries already in the log whose
    /// fingerprint is not part of the history (typically optimistic local sends
    /// and live messages newer than the replay window) follow it, keeping their
    /// relative order. Replaying the same history again leaves the log unchanged.
    pub fn ingest_history(&mut self, channel: &str, history: impl IntoIterator<Item = Message>) {
        let log = self.log_mut(channel);
        let mut merged = ChannelLog::new();
        for message in history {
            if !merged.contains(&message) {
                merged.push(message);
            }
        }
        let replayed = merged.len();
        let from_history = merged.fingerprints().clone();

        for message in log.take_messages() {
            if !from_history.contains(&FingerprintKey::of(&message)) {
                merged.push(message);
            }
        }
        debug!(channel = %channel, replayed, total = merged.len(), "merged history");
        *log = merged;
    }

    /// Append an inbound message unless the channel already holds one with the
    /// same fingerprint. Returns whether it was appended.
    pub fn ingest_live(&mut self, channel: &str, message: Message) -> bool {
        let log = self.log_mut(channel);
        if log.contains(&message) {
            debug!(channel = %channel, sender = %message.sender, "dropping duplicate message");
            return false;
        }
        log.push(message);
        true
    }

    /// Append a message the local user just sent. Never deduplicated.
    pub fn append_local(&mut self, channel: &str, message: Message) {
        self.log_mut(channel).push(message);
    }

    /// Messages of `channel` in arrival order, optionally narrowed to those whose
    /// text contains `filter` (case-insensitive, taken verbatim). An empty
    /// filter matches everything.
    pub fn query<'a>(
        &'a self,
        channel: &str,
        filter: Option<&str>,
    ) -> impl Iterator<Item = &'a Message> + Clone + 'a {
        let needle = filter.filter(|f| !f.is_empty()).map(str::to_lowercase);
        let messages = self
            .channels
            .get(channel)
            .map(ChannelLog::messages)
            .unwrap_or(&[]);

        messages.iter().filter(move |message| match &needle {
            Some(needle) => message.text.to_lowercase().contains(needle.as_str()),
            None => true,
        })
    }

    pub fn len(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, ChannelLog::len)
    }

    pub fn last_message(&self, channel: &str) -> Option<&Message> {
        self.channels.get(channel).and_then(|log| log.messages().last())
    }
}
