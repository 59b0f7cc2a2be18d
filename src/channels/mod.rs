use std::collections::HashSet;

pub use message::{Fingerprint, Message};
pub use store::MessageStore;
pub use unread::UnreadCounter;

mod message;
mod store;
mod unread;

/// Suffix every conversation channel carries after the participant's name.
pub const CHANNEL_SUFFIX: &str = "-channel";

/// Channel a participant talks on, e.g. `client1` -> `client1-channel`.
pub fn channel_for(participant: &str) -> String {
    format!("{}{}", participant, CHANNEL_SUFFIX)
}

/// Participant a channel belongs to, for display. Names without the suffix are
/// returned unchanged.
pub fn participant_name(channel: &str) -> &str {
    channel.strip_suffix(CHANNEL_SUFFIX).unwrap_or(channel)
}

/// Owned form of [`Fingerprint`] kept in a log's lookup set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FingerprintKey {
    text: String,
    timestamp: String,
    sender: String,
}

impl FingerprintKey {
    pub(crate) fn of(message: &Message) -> Self {
        let Fingerprint { text, timestamp, sender } = message.fingerprint();
        Self {
            text: text.to_string(),
            timestamp: timestamp.to_string(),
            sender: sender.to_string(),
        }
    }
}

/// Arrival-ordered message log of one channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelLog {
    messages: Vec<Message>,
    seen: HashSet<FingerprintKey>,
}

impl ChannelLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.seen.contains(&FingerprintKey::of(message))
    }

    pub(crate) fn fingerprints(&self) -> &HashSet<FingerprintKey> {
        &self.seen
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.seen.insert(FingerprintKey::of(&message));
        self.messages.push(message);
    }

    pub(crate) fn take_messages(&mut self) -> Vec<Message> {
        self.seen.clear();
        std::mem::take(&mut self.messages)
    }
}
