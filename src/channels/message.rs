use serde::{Deserialize, Serialize};

/// A single chat line as it travels over the wire and sits in a channel log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    /// Display-formatted `HH:MM` time of sending.
    pub timestamp: String,
    pub sender: String,
    #[serde(default, rename = "attachment", skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,
}

/// The `(text, timestamp, sender)` triple two messages must share to count as duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint<'a> {
    pub text: &'a str,
    pub timestamp: &'a str,
    pub sender: &'a str,
}

impl Message {
    pub fn new(text: impl Into<String>, timestamp: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: timestamp.into(),
            sender: sender.into(),
            attachment_ref: None,
        }
    }

    pub fn with_attachment(mut self, attachment_ref: impl Into<String>) -> Self {
        self.attachment_ref = Some(attachment_ref.into());
        self
    }

    pub fn fingerprint(&self) -> Fingerprint<'_> {
        Fingerprint {
            text: &self.text,
            timestamp: &self.timestamp,
            sender: &self.sender,
        }
    }

    pub fn is_duplicate_of(&self, other: &Message) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}
