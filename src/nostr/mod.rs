use nostr_sdk::Kind;

pub use client::{NostrSettings, NostrTransport};
pub use identity::Identity;

mod client;
mod identity;

/// Stored, so relays can replay channel history.
pub const CHAT_KIND: Kind = Kind::Regular(4242);

/// Typing state is never worth keeping.
pub const PRESENCE_KIND: Kind = Kind::Ephemeral(20042);
