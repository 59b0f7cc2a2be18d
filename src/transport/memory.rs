use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{PresenceState, Transport, TransportEvent};
use crate::channels::Message;

#[derive(Debug, Default)]
struct Inner {
    history: HashMap<String, Vec<Value>>,
    subscribed: BTreeSet<String>,
    published: Vec<(String, Message)>,
    presence: Vec<(String, PresenceState)>,
    history_requests: Vec<String>,
    fail_publish: bool,
    fail_history: bool,
}

/// In-process transport: keeps history in memory and, when given an echo
/// channel, loops published messages and presence back as inbound events the
/// way a real broker delivers a subscriber's own publications.
///
/// Used for offline mode and as the recording transport in tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
    echo: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo(echo: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            inner: Mutex::default(),
            echo: Some(echo),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed_history(&self, channel: &str, messages: impl IntoIterator<Item = Message>) {
        let mut inner = self.inner();
        let entries = inner.history.entry(channel.to_string()).or_default();
        for message in messages {
            if let Ok(value) = serde_json::to_value(&message) {
                entries.push(value);
            }
        }
    }

    /// Store a raw history entry as-is, valid or not.
    pub fn seed_raw_history(&self, channel: &str, entry: Value) {
        self.inner().history.entry(channel.to_string()).or_default().push(entry);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.inner().fail_publish = fail;
    }

    pub fn fail_history(&self, fail: bool) {
        self.inner().fail_history = fail;
    }

    pub fn published(&self) -> Vec<(String, Message)> {
        self.inner().published.clone()
    }

    pub fn presence_updates(&self) -> Vec<(String, PresenceState)> {
        self.inner().presence.clone()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.inner().subscribed.iter().cloned().collect()
    }

    pub fn history_requests(&self) -> Vec<String> {
        self.inner().history_requests.clone()
    }

    fn send_echo(&self, event: TransportEvent) {
        if let Some(echo) = &self.echo {
            let _ = echo.send(event);
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&self, channels: &[String]) -> anyhow::Result<()> {
        self.inner().subscribed.extend(channels.iter().cloned());
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[String]) -> anyhow::Result<()> {
        let mut inner = self.inner();
        for channel in channels {
            inner.subscribed.remove(channel);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &Message) -> anyhow::Result<()> {
        let value = serde_json::to_value(message)?;
        {
            let mut inner = self.inner();
            if inner.fail_publish {
                bail!("publish rejected");
            }
            inner.published.push((channel.to_string(), message.clone()));
            inner
                .history
                .entry(channel.to_string())
                .or_default()
                .push(value.clone());
        }
        self.send_echo(TransportEvent::message(channel, value));
        Ok(())
    }

    async fn fetch_history(&self, channel: &str, limit: usize) -> anyhow::Result<Vec<Value>> {
        let mut inner = self.inner();
        inner.history_requests.push(channel.to_string());
        if inner.fail_history {
            bail!("history unavailable");
        }
        let entries = inner.history.get(channel).cloned().unwrap_or_default();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }

    async fn set_presence_state(&self, channels: &[String], state: &PresenceState) -> anyhow::Result<()> {
        let value = serde_json::to_value(state)?;
        {
            let mut inner = self.inner();
            for channel in channels {
                inner.presence.push((channel.clone(), state.clone()));
            }
        }
        for channel in channels {
            self.send_echo(TransportEvent::presence(channel.clone(), value.clone()));
        }
        Ok(())
    }
}
