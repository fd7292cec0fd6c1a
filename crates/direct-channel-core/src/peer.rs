//! Participant identifiers
//!
//! Peers reach this crate in several shapes: base58 strings from a config file,
//! iroh `PublicKey`s from a gossip event, owned `String`s from a test. They are
//! all reduced to one canonical string form so that equality never depends on
//! which representation a caller happened to hold.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a participant in the pub/sub substrate.
///
/// Equality, ordering and hashing all operate on the canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer ID from any string representation.
    ///
    /// Surrounding whitespace is not part of an identifier and is dropped.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Create a peer ID from any type whose `Display` output is its identifier.
    pub fn from_display(id: &impl fmt::Display) -> Self {
        Self::new(id.to_string())
    }

    /// Get the canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short form for log output (first 8 chars)
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<&String> for PeerId {
    fn from(id: &String) -> Self {
        Self::new(id.as_str())
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

#[cfg(feature = "iroh")]
impl From<iroh::PublicKey> for PeerId {
    fn from(key: iroh::PublicKey) -> Self {
        Self::from_display(&key)
    }
}

#[cfg(feature = "iroh")]
impl From<&iroh::PublicKey> for PeerId {
    fn from(key: &iroh::PublicKey) -> Self {
        Self::from_display(key)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PeerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PeerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.trim()
    }
}

impl PartialEq<&str> for PeerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.trim()
    }
}
