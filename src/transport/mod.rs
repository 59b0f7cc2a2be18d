//! The boundary to the publish/subscribe network.
//!
//! Delivery over a [`Transport`] is at-least-once and unordered: the same
//! event may arrive twice and events may arrive out of order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channels::Message;
use crate::error::ChatError;

pub use memory::MemoryTransport;

mod memory;

/// Typing state a participant broadcasts on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    pub is_typing: bool,
    pub sender: String,
}

impl PresenceState {
    pub fn typing(sender: impl Into<String>, is_typing: bool) -> Self {
        Self {
            is_typing,
            sender: sender.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self, channels: &[String]) -> anyhow::Result<()>;

    async fn unsubscribe(&self, channels: &[String]) -> anyhow::Result<()>;

    async fn publish(&self, channel: &str, message: &Message) -> anyhow::Result<()>;

    /// Up to `limit` most recent raw entries of `channel`, oldest first.
    async fn fetch_history(&self, channel: &str, limit: usize) -> anyhow::Result<Vec<Value>>;

    async fn set_presence_state(&self, channels: &[String], state: &PresenceState) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Presence,
}

/// An event as the transport delivers it, before any validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl TransportEvent {
    pub fn message(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: EventKind::Message,
            channel: Some(channel.into()),
            payload,
        }
    }

    pub fn presence(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: EventKind::Presence,
            channel: Some(channel.into()),
            payload,
        }
    }
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message { channel: String, message: Message },
    Presence { channel: String, state: PresenceState },
}

impl TryFrom<TransportEvent> for InboundEvent {
    type Error = ChatError;

    fn try_from(event: TransportEvent) -> Result<Self, Self::Error> {
        let channel = event
            .channel
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ChatError::MalformedEvent("missing channel".to_string()))?;

        match event.kind {
            EventKind::Message => {
                let message = parse_message(event.payload)?;
                Ok(InboundEvent::Message { channel, message })
            }
            EventKind::Presence => {
                let state: PresenceState = serde_json::from_value(event.payload)
                    .map_err(|e| ChatError::MalformedEvent(format!("presence on {}: {}", channel, e)))?;
                Ok(InboundEvent::Presence { channel, state })
            }
        }
    }
}

/// Parse one raw message payload, as delivered live or replayed from history.
pub fn parse_message(payload: Value) -> Result<Message, ChatError> {
    serde_json::from_value(payload).map_err(|e| ChatError::MalformedEvent(format!("message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_message_event() {
        let raw = TransportEvent::message(
            "client1-channel",
            json!({ "text": "hi", "timestamp": "09:00", "sender": "client1" }),
        );
        let event = InboundEvent::try_from(raw).unwrap();
        assert_eq!(
            event,
            InboundEvent::Message {
                channel: "client1-channel".to_string(),
                message: Message::new("hi", "09:00", "client1"),
            }
        );
    }

    #[test]
    fn rejects_missing_channel_and_text() {
        let no_channel = TransportEvent {
            kind: EventKind::Message,
            channel: None,
            payload: json!({ "text": "hi", "timestamp": "09:00", "sender": "client1" }),
        };
        assert!(matches!(
            InboundEvent::try_from(no_channel),
            Err(ChatError::MalformedEvent(_))
        ));

        let blank_channel = TransportEvent::message("  ", json!({ "text": "hi" }));
        assert!(InboundEvent::try_from(blank_channel).is_err());

        let no_text = TransportEvent::message("a", json!({ "timestamp": "09:00", "sender": "x" }));
        assert!(matches!(
            InboundEvent::try_from(no_text),
            Err(ChatError::MalformedEvent(_))
        ));

        let text_not_string = TransportEvent::message("a", json!({ "text": 5, "timestamp": "09:00", "sender": "x" }));
        assert!(InboundEvent::try_from(text_not_string).is_err());
    }

    #[test]
    fn parses_presence_from_wire_json() {
        let raw: TransportEvent = serde_json::from_value(json!({
            "type": "presence",
            "channel": "client3-channel",
            "payload": { "isTyping": true, "sender": "client3" }
        }))
        .unwrap();

        match InboundEvent::try_from(raw).unwrap() {
            InboundEvent::Presence { channel, state } => {
                assert_eq!(channel, "client3-channel");
                assert_eq!(state, PresenceState::typing("client3", true));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
