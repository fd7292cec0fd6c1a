//! Channel configuration
//!
//! Resolution order: explicit builder calls → environment variables → defaults.
//!
//! Environment overrides:
//!   - `DIRECT_CHANNEL_NAMESPACE`: protocol namespace segment of channel topics
//!   - `DIRECT_CHANNEL_POLL_INTERVAL_MS`: rendezvous polling interval

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ChannelResult};

/// Default protocol namespace prefixed to every channel topic.
pub const DEFAULT_NAMESPACE: &str = "direct-channel-v1";

/// Default interval between peer-list queries while waiting for a counterpart.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const NAMESPACE_ENV: &str = "DIRECT_CHANNEL_NAMESPACE";
const POLL_INTERVAL_ENV: &str = "DIRECT_CHANNEL_POLL_INTERVAL_MS";

/// Configuration shared by both ends of a channel.
///
/// Both participants must use the same `namespace`, otherwise they derive
/// different topics and never meet. `poll_interval` is local and only trades
/// responsiveness against query load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Protocol namespace segment, without slashes.
    pub namespace: String,
    /// How often `connect()` re-queries the topic's peer list.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ChannelConfig {
    /// Defaults overlaid with any environment overrides.
    pub fn from_env() -> ChannelResult<Self> {
        let mut config = Self::default();

        if let Ok(namespace) = std::env::var(NAMESPACE_ENV) {
            config.namespace = namespace;
        }

        if let Ok(raw) = std::env::var(POLL_INTERVAL_ENV) {
            let ms: u64 = raw.trim().parse().map_err(|e| {
                ChannelError::Config(format!("{POLL_INTERVAL_ENV}={raw:?}: {e}"))
            })?;
            config.poll_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the protocol namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the rendezvous polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Namespace with surrounding slashes removed, as it appears in topics.
    pub fn namespace_segment(&self) -> &str {
        self.namespace.trim().trim_matches('/')
    }

    /// Check that the configuration can produce well-formed topics.
    pub fn validate(&self) -> ChannelResult<()> {
        let segment = self.namespace_segment();
        if segment.is_empty() {
            return Err(ChannelError::InvalidNamespace(
                "namespace must not be empty".to_string(),
            ));
        }
        if segment.contains('/') {
            return Err(ChannelError::InvalidNamespace(format!(
                "namespace {segment:?} must be a single path segment"
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ChannelError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
