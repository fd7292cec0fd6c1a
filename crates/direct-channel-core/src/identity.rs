//! Channel identity derivation
//!
//! Both participants compute the channel topic on their own, with no
//! handshake, so the derivation must be a pure function of the unordered
//! pair of peer IDs.
//!
//! ## Topic Layout
//!
//! ```text
//! /<namespace>/<lower peer id>/<higher peer id>
//! ```
//!
//! The two IDs are ordered byte-wise on their canonical string form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ChannelResult};
use crate::peer::PeerId;

/// Canonical topic string shared by the two ends of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    /// Derive the channel ID for a pair of peers.
    ///
    /// `derive(ns, a, b) == derive(ns, b, a)` for every pair. Fails if either
    /// identifier is empty or contains `/`, or if the namespace is not a
    /// single non-empty path segment.
    pub fn derive(namespace: &str, local: &PeerId, remote: &PeerId) -> ChannelResult<Self> {
        check_peer_id(local, "local")?;
        check_peer_id(remote, "remote")?;

        let namespace = namespace.trim().trim_matches('/');
        if namespace.is_empty() || namespace.contains('/') {
            return Err(ChannelError::InvalidNamespace(format!(
                "{namespace:?} is not a single path segment"
            )));
        }

        let (first, second) = sorted_pair(local, remote);
        Ok(Self(format!(
            "/{}/{}/{}",
            namespace,
            first.as_str(),
            second.as_str()
        )))
    }

    /// Get the topic string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `peer` is one of the two participants encoded in this ID.
    pub fn involves(&self, peer: &PeerId) -> bool {
        self.0
            .rsplitn(3, '/')
            .take(2)
            .any(|segment| segment == peer.as_str())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Order two peers byte-wise on their canonical form.
pub fn sorted_pair<'a>(a: &'a PeerId, b: &'a PeerId) -> (&'a PeerId, &'a PeerId) {
    if a.as_str() <= b.as_str() {
        (a, b)
    } else {
        (b, a)
    }
}

fn check_peer_id(peer: &PeerId, role: &'static str) -> ChannelResult<()> {
    if peer.is_empty() {
        return Err(ChannelError::MissingPeerId(role));
    }
    if peer.as_str().contains('/') {
        return Err(ChannelError::InvalidPeerId(format!(
            "{role} peer ID {:?} contains '/'",
            peer.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "direct-channel-v1";

    #[test]
    fn test_derive_is_symmetric() {
        let alice = PeerId::new("QmAlice");
        let bob = PeerId::new("QmBob");

        let ab = ChannelId::derive(NS, &alice, &bob).unwrap();
        let ba = ChannelId::derive(NS, &bob, &alice).unwrap();

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_derive_layout() {
        let id = ChannelId::derive(NS, &PeerId::new("zeta"), &PeerId::new("alpha")).unwrap();
        assert_eq!(id.as_str(), "/direct-channel-v1/alpha/zeta");
    }

    #[test]
    fn test_derive_normalizes_namespace() {
        let a = PeerId::new("a");
        let b = PeerId::new("b");

        let plain = ChannelId::derive("ns", &a, &b).unwrap();
        let slashed = ChannelId::derive("/ns/", &a, &b).unwrap();
        assert_eq!(plain, slashed);
    }

    #[test]
    fn test_derive_orders_bytewise() {
        // Uppercase sorts before lowercase byte-wise
        let id = ChannelId::derive(NS, &PeerId::new("bob"), &PeerId::new("Bob")).unwrap();
        assert_eq!(id.as_str(), "/direct-channel-v1/Bob/bob");
    }

    #[test]
    fn test_derive_rejects_missing_peer() {
        let alice = PeerId::new("QmAlice");
        let empty = PeerId::new("");

        assert!(matches!(
            ChannelId::derive(NS, &empty, &alice),
            Err(ChannelError::MissingPeerId("local"))
        ));
        assert!(matches!(
            ChannelId::derive(NS, &alice, &empty),
            Err(ChannelError::MissingPeerId("remote"))
        ));
    }

    #[test]
    fn test_derive_rejects_slash_in_peer() {
        let result = ChannelId::derive(NS, &PeerId::new("a/b"), &PeerId::new("c"));
        assert!(matches!(result, Err(ChannelError::InvalidPeerId(_))));
    }

    #[test]
    fn test_derive_rejects_bad_namespace() {
        let a = PeerId::new("a");
        let b = PeerId::new("b");
        assert!(ChannelId::derive("", &a, &b).is_err());
        assert!(ChannelId::derive("x/y", &a, &b).is_err());
    }

    #[test]
    fn test_involves() {
        let alice = PeerId::new("QmAlice");
        let bob = PeerId::new("QmBob");
        let carol = PeerId::new("QmCarol");
        let id = ChannelId::derive(NS, &alice, &bob).unwrap();

        assert!(id.involves(&alice));
        assert!(id.involves(&bob));
        assert!(!id.involves(&carol));
    }

    #[test]
    fn test_same_peer_on_both_ends() {
        let alice = PeerId::new("QmAlice");
        let id = ChannelId::derive(NS, &alice, &alice).unwrap();
        assert_eq!(id.as_str(), "/direct-channel-v1/QmAlice/QmAlice");
    }
}
