//! Error types for direct channels

use thiserror::Error;

/// Main error type for direct channel operations
#[derive(Error, Debug)]
pub enum ChannelError {
    /// A participant identifier was empty or absent
    #[error("Missing {0} peer ID")]
    MissingPeerId(&'static str),

    /// A participant identifier cannot be embedded in a channel topic
    #[error("Invalid peer ID: {0}")]
    InvalidPeerId(String),

    /// The protocol namespace cannot prefix a channel topic
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// The supplied node handle exposes no publish/subscribe capability
    #[error("This node does not support pubsub")]
    PubSubUnsupported,

    /// Resolving the local peer identity failed
    #[error("Identity error: {0}")]
    Identity(String),

    /// The pub/sub substrate rejected a subscribe, unsubscribe, publish or peer query
    #[error("Transport error: {0}")]
    Transport(String),

    /// The channel has been closed
    #[error("Channel is closed")]
    Closed,

    /// Operation not allowed in the channel's current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A bounded wait expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A received envelope failed to decode or verify
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}

impl ChannelError {
    /// Construction-time failures that are never worth retrying.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ChannelError::MissingPeerId(_)
                | ChannelError::InvalidPeerId(_)
                | ChannelError::InvalidNamespace(_)
                | ChannelError::PubSubUnsupported
                | ChannelError::Config(_)
        )
    }

    /// Failures reported by the underlying pub/sub substrate.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChannelError::Transport(_))
    }
}

/// Result type alias using ChannelError
pub type ChannelResult<T> = Result<T, ChannelError>;
