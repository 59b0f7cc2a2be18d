use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channels::channel_for;
use crate::clock::Clock;
use crate::error::{ChatError, Result};
use crate::session::SessionOptions;

// Well-connected public relays.
const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://relay.primal.net",
    "wss://offchain.pub",
    "wss://nostr21.com",
];

const DEFAULT_CLIENTS: &[&str] = &["client1", "client2", "client3"];

/// Who is running the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Watches every configured client channel.
    Admin,
    /// Talks to the admin on its own channel.
    Client(String),
}

impl Role {
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Config("participant name must not be empty".to_string()));
        }
        if name.eq_ignore_ascii_case("admin") {
            Ok(Role::Admin)
        } else {
            Ok(Role::Client(name.to_string()))
        }
    }

    pub fn identity(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Client(name) => name,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub relays: Vec<String>,
    /// Channels the admin watches.
    pub channels: Vec<String>,
    pub typing_timeout_ms: u64,
    pub history_limit: usize,
    pub connect_timeout_secs: u64,
    pub publish_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect(),
            channels: DEFAULT_CLIENTS.iter().map(|c| channel_for(c)).collect(),
            typing_timeout_ms: 3000,
            history_limit: 100,
            connect_timeout_secs: 10,
            publish_timeout_secs: 5,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("hubchat")
            .join("config.toml")
    }

    /// Read `path`, or the default location when `None`. A missing file means
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml(&contents)
                .map_err(|e| ChatError::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ChatError::Config(format!("cannot read {}: {}", path.display(), e))),
        }
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn channels_for(&self, role: &Role) -> Vec<String> {
        match role {
            Role::Admin => self.channels.clone(),
            Role::Client(name) => vec![channel_for(name)],
        }
    }

    pub fn session_options(&self, role: &Role, clock: Arc<dyn Clock>) -> SessionOptions {
        SessionOptions::new(role.identity(), self.channels_for(role))
            .typing_timeout(self.typing_timeout())
            .history_limit(self.history_limit)
            .clock(clock)
    }
}
