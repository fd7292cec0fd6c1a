//! Publish/subscribe capability required by direct channels
//!
//! ## Overview
//!
//! A channel never talks to the network directly. It needs four primitives
//! from whatever substrate it runs on:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  PubSub                                                         │
//! │  ├── subscribe(topic, handler)   → HandlerId                    │
//! │  ├── unsubscribe(topic, HandlerId)                              │
//! │  ├── publish(topic, bytes)                                      │
//! │  └── list_peers(topic)           → peers subscribed to topic    │
//! │                                                                 │
//! │  Node (capability negotiation + local identity)                 │
//! │  ├── pubsub()                    → Option<Arc<dyn PubSub>>      │
//! │  └── local_peer_id()             → PeerId                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations:
//!
//! - [`memory::MemoryNetwork`]: in-process fan-out for tests and local wiring
//! - [`gossip::GossipPubSub`]: iroh-gossip topics with signed envelopes (feature `iroh`)

#[cfg(feature = "iroh")]
pub mod envelope;
#[cfg(feature = "iroh")]
pub mod gossip;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ChannelResult;
use crate::peer::PeerId;

/// Message delivered by the substrate to a topic subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The sender's peer ID, as attached by the substrate
    pub from: PeerId,
    /// Raw payload bytes
    pub data: Bytes,
    /// Topics the message was delivered on
    pub topics: Vec<String>,
}

impl InboundMessage {
    /// Create a message delivered on a single topic
    pub fn new(from: impl Into<PeerId>, data: impl Into<Bytes>, topic: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            data: data.into(),
            topics: vec![topic.into()],
        }
    }
}

/// Callback invoked by the substrate for every message on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Token identifying one handler registration, used to unsubscribe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Topic-based publish/subscribe primitives.
///
/// Implementations report every rejection as `ChannelError::Transport`.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Register `handler` for messages on `topic`.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> ChannelResult<HandlerId>;

    /// Remove a handler registered with [`PubSub::subscribe`].
    async fn unsubscribe(&self, topic: &str, handler: HandlerId) -> ChannelResult<()>;

    /// Publish `payload` to every subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: Bytes) -> ChannelResult<()>;

    /// Peers currently known to be subscribed to `topic`, excluding ourselves.
    async fn list_peers(&self, topic: &str) -> ChannelResult<Vec<PeerId>>;
}

/// A handle onto a participant of the substrate.
///
/// Not every node exposes pub/sub; channels check [`Node::pubsub`] once,
/// up front, and refuse to start without it.
#[async_trait]
pub trait Node: Send + Sync {
    /// The node's pub/sub capability, if it has one.
    fn pubsub(&self) -> Option<Arc<dyn PubSub>>;

    /// Resolve this node's own stable identifier.
    async fn local_peer_id(&self) -> ChannelResult<PeerId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_new() {
        let msg = InboundMessage::new("QmAlice", &b"hello"[..], "/ns/QmAlice/QmBob");
        assert_eq!(msg.from, PeerId::new("QmAlice"));
        assert_eq!(msg.data, Bytes::from_static(b"hello"));
        assert_eq!(msg.topics, vec!["/ns/QmAlice/QmBob".to_string()]);
    }

    #[test]
    fn test_handler_id_display() {
        assert_eq!(HandlerId(7).to_string(), "handler-7");
    }
}
