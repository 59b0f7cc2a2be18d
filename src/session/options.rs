use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::{ChatError, Result};
use crate::typing::DEFAULT_TYPING_TIMEOUT;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Everything a [`ChatSession`](super::ChatSession) needs besides its transport.
#[derive(Clone)]
pub struct SessionOptions {
    pub(crate) identity: String,
    pub(crate) channels: Vec<String>,
    pub(crate) initial_channel: Option<String>,
    pub(crate) typing_timeout: Duration,
    pub(crate) history_limit: usize,
    pub(crate) clock: Arc<dyn Clock>,
}

impl SessionOptions {
    pub fn new(identity: impl Into<String>, channels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            identity: identity.into(),
            channels: channels.into_iter().map(Into::into).collect(),
            initial_channel: None,
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn initial_channel(mut self, channel: impl Into<String>) -> Self {
        self.initial_channel = Some(channel.into());
        self
    }

    pub fn typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn validate(&mut self) -> Result<()> {
        if self.identity.trim().is_empty() {
            return Err(ChatError::Config("identity must not be empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        self.channels.retain(|c| !c.trim().is_empty() && seen.insert(c.clone()));
        if self.channels.is_empty() {
            return Err(ChatError::Config("at least one channel is required".to_string()));
        }

        if let Some(initial) = &self.initial_channel {
            if !self.channels.contains(initial) {
                return Err(ChatError::UnknownChannel(initial.clone()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("identity", &self.identity)
            .field("channels", &self.channels)
            .field("initial_channel", &self.initial_channel)
            .field("typing_timeout", &self.typing_timeout)
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_drops_blank_and_repeated_channels() {
        let mut options = SessionOptions::new("admin", ["a", " ", "b", "a"]);
        options.validate().unwrap();
        assert_eq!(options.channels, vec!["a", "b"]);
    }

    #[test]
    fn validation_rejects_bad_setups() {
        let mut no_identity = SessionOptions::new("  ", ["a"]);
        assert!(matches!(no_identity.validate(), Err(ChatError::Config(_))));

        let mut no_channels = SessionOptions::new("admin", Vec::<String>::new());
        assert!(matches!(no_channels.validate(), Err(ChatError::Config(_))));

        let mut stray_initial = SessionOptions::new("admin", ["a"]).initial_channel("z");
        assert!(matches!(stray_initial.validate(), Err(ChatError::UnknownChannel(_))));
    }
}
