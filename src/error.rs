use thiserror::Error;

/// Errors surfaced by the chat session. None of them leave the session unusable.
#[derive(Error, Debug)]
pub enum ChatError {
    /// A transport call failed or timed out.
    #[error("Transport unavailable during {operation} on {channel}: {reason}")]
    TransportUnavailable {
        operation: &'static str,
        channel: String,
        reason: String,
    },

    /// An inbound event lacked a required field or did not parse.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// The channel is not one this session is configured for.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChatError {
    pub(crate) fn transport(operation: &'static str, channel: &str, reason: impl ToString) -> Self {
        Self::TransportUnavailable {
            operation,
            channel: channel.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
