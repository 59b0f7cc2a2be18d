use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use nostr_sdk::prelude::*;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Identity, CHAT_KIND, PRESENCE_KIND};
use crate::channels::Message;
use crate::transport::{PresenceState, Transport, TransportEvent};

/// Tag carrying the channel name on every event we publish.
const CHANNEL_TAG: &str = "g";
const CLIENT_TAG: &str = "hubchat";

#[derive(Debug, Clone)]
pub struct NostrSettings {
    pub relays: Vec<String>,
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
}

/// [`Transport`] over Nostr relays. Chat messages are stored events, presence
/// is ephemeral; both are addressed to a channel by a `g` tag.
pub struct NostrTransport {
    client: Client,
    identity: Identity,
    settings: NostrSettings,
    subscriptions: Mutex<HashMap<String, SubscriptionId>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl NostrTransport {
    pub async fn new(
        identity: &Identity,
        settings: NostrSettings,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        let client = Client::new(&identity.keys);
        for relay_url in &settings.relays {
            client.add_relay(relay_url.as_str()).await?;
        }

        Ok(Self {
            client,
            identity: identity.clone(),
            settings,
            subscriptions: Mutex::new(HashMap::new()),
            events_tx,
        })
    }

    pub fn relay_count(&self) -> usize {
        self.settings.relays.len()
    }

    /// Connect to the relays and start forwarding relay events.
    pub async fn connect(&self) -> Result<()> {
        info!(relays = self.settings.relays.len(), "connecting to relays");

        if timeout(self.settings.connect_timeout, self.client.connect())
            .await
            .is_err()
        {
            // Continue with whatever relays did come up.
            warn!("relay connection timed out, continuing with partial connectivity");
        }

        self.start_notification_listener();
        Ok(())
    }

    fn start_notification_listener(&self) {
        let mut notifications = self.client.notifications();
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            while let Ok(notification) = notifications.recv().await {
                if let RelayPoolNotification::Event { event, .. } = notification {
                    if let Some(inbound) = Self::to_transport_event(&event) {
                        if events_tx.send(inbound).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("relay notification listener stopped");
        });
    }

    fn to_transport_event(event: &Event) -> Option<TransportEvent> {
        let kind = event.kind();
        if kind != CHAT_KIND && kind != PRESENCE_KIND {
            return None;
        }

        let channel = channel_of(event)?;
        let payload = content_json(event);
        if kind == CHAT_KIND {
            Some(TransportEvent::message(channel, payload))
        } else {
            Some(TransportEvent::presence(channel, payload))
        }
    }

    fn channel_filter(kind: Kind, channels: &[String]) -> Filter {
        Filter::new()
            .kind(kind)
            .custom_tag(SingleLetterTag::lowercase(Alphabet::G), channels.to_vec())
    }

    fn signed_event(&self, kind: Kind, channel: &str, content: String) -> Result<Event> {
        let tags = vec![
            Tag::parse(vec![CHANNEL_TAG, channel])?,
            Tag::parse(vec!["client", CLIENT_TAG])?,
        ];
        self.identity.sign_event(EventBuilder::new(kind, content, tags))
    }

    async fn send(&self, event: Event) -> Result<()> {
        match timeout(self.settings.publish_timeout, self.client.send_event(event)).await {
            Ok(Ok(_event_id)) => Ok(()),
            Ok(Err(e)) => Err(anyhow!(e)),
            Err(_) => bail!("timed out after {:?}", self.settings.publish_timeout),
        }
    }
}

#[async_trait]
impl Transport for NostrTransport {
    async fn subscribe(&self, channels: &[String]) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        for channel in channels {
            if subscriptions.contains_key(channel) {
                continue;
            }
            let scope = std::slice::from_ref(channel);
            // Live traffic only; history comes through `fetch_history`.
            let filters = vec![
                Self::channel_filter(CHAT_KIND, scope).since(Timestamp::now()),
                Self::channel_filter(PRESENCE_KIND, scope),
            ];
            let subscription_id = self.client.subscribe(filters, None).await;
            debug!(channel = %channel, "subscribed");
            subscriptions.insert(channel.clone(), subscription_id);
        }
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[String]) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        for channel in channels {
            if let Some(subscription_id) = subscriptions.remove(channel) {
                self.client.unsubscribe(subscription_id).await;
                debug!(channel = %channel, "unsubscribed");
            }
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &Message) -> Result<()> {
        let content = serde_json::to_string(message)?;
        let event = self.signed_event(CHAT_KIND, channel, content)?;
        self.send(event).await
    }

    async fn fetch_history(&self, channel: &str, limit: usize) -> Result<Vec<Value>> {
        let filter = Self::channel_filter(CHAT_KIND, &[channel.to_string()]).limit(limit);
        let mut events = timeout(
            self.settings.connect_timeout,
            self.client.get_events_of(vec![filter], None),
        )
        .await
        .map_err(|_| anyhow!("history request timed out"))??;

        events.sort_by_key(|event| event.created_at());
        let skip = events.len().saturating_sub(limit);
        Ok(events.iter().skip(skip).map(content_json).collect())
    }

    async fn set_presence_state(&self, channels: &[String], state: &PresenceState) -> Result<()> {
        let content = serde_json::to_string(state)?;
        for channel in channels {
            let event = self.signed_event(PRESENCE_KIND, channel, content.clone())?;
            self.send(event).await?;
        }
        Ok(())
    }
}

fn channel_of(event: &Event) -> Option<String> {
    event.tags().iter().find_map(|tag| match tag.as_vec() {
        vec if vec.len() >= 2 && vec[0] == CHANNEL_TAG => Some(vec[1].to_string()),
        _ => None,
    })
}

/// Event content as JSON; anything unparsable becomes `null` and is rejected
/// downstream as malformed.
fn content_json(event: &Event) -> Value {
    serde_json::from_str(event.content()).unwrap_or(Value::Null)
}
