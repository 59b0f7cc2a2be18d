use anyhow::{anyhow, Result};
use nostr_sdk::prelude::*;

/// Signing keys the transport publishes with.
#[derive(Debug, Clone)]
pub struct Identity {
    pub keys: Keys,
    pub pubkey: String,
    pub is_ephemeral: bool,
}

impl Identity {
    /// Create an ephemeral identity (generates new keypair each session)
    pub fn ephemeral() -> Self {
        let keys = Keys::generate();
        let pubkey = keys.public_key().to_hex();

        Self {
            keys,
            pubkey,
            is_ephemeral: true,
        }
    }

    pub fn from_nsec(nsec: &str) -> Result<Self> {
        let secret_key = SecretKey::from_bech32(nsec)
            .map_err(|_| anyhow!("Invalid nsec format"))?;
        let keys = Keys::new(secret_key);
        let pubkey = keys.public_key().to_hex();

        Ok(Self {
            keys,
            pubkey,
            is_ephemeral: false,
        })
    }

    pub fn sign_event(&self, event_builder: EventBuilder) -> Result<Event> {
        Ok(event_builder.to_event(&self.keys)?)
    }

    /// First characters of the public key, for display.
    pub fn short_pubkey(&self) -> &str {
        let end = self.pubkey.len().min(16);
        &self.pubkey[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_keys_are_fresh() {
        let a = Identity::ephemeral();
        let b = Identity::ephemeral();
        assert!(a.is_ephemeral);
        assert_ne!(a.pubkey, b.pubkey);
        assert_eq!(a.short_pubkey().len(), 16);
    }

    #[test]
    fn rejects_garbage_nsec() {
        assert!(Identity::from_nsec("not-a-key").is_err());
    }
}
