//! Client-side state for a multi-channel chat: per-channel message logs,
//! unread counters, typing presence and history hydration, driven by a
//! pluggable [`transport::Transport`].

pub mod channels;
pub mod clock;
pub mod config;
pub mod error;
pub mod nostr;
pub mod session;
pub mod timer;
pub mod transport;
pub mod typing;

pub use channels::Message;
pub use error::{ChatError, Result};
pub use session::{ChatSession, Hydration, SessionOptions};
pub use transport::{MemoryTransport, Transport, TransportEvent};
