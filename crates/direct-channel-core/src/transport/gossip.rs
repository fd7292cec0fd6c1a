//! iroh-gossip backed pub/sub
//!
//! Maps string topics onto gossip swarms. Each topic is joined once, however
//! many handlers subscribe to it, and left when the last handler goes.
//!
//! ## Topic Mapping
//!
//! ```text
//! topic_id = BLAKE3("direct-channel-topic-v1:" || topic)
//! ```
//!
//! ## Sender Identity
//!
//! Every payload travels in a [`SignedEnvelope`] signed with the publishing
//! endpoint's secret key. The receive loop verifies it and reports the signing
//! key as the sender, whichever neighbor relayed it. Envelopes that fail to
//! decode or verify are dropped before any handler sees them.
//!
//! ## Peer Lists
//!
//! iroh-gossip has no "who is subscribed" query. A background task per topic
//! tracks `NeighborUp` / `NeighborDown` events and `list_peers` reports that
//! neighbor set. Only direct neighbors are listed, so a subscriber reachable
//! solely through a relay does not appear until it becomes a neighbor. On a
//! two-party channel topic the counterpart is a direct neighbor once both
//! have joined.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use iroh::{EndpointId, SecretKey};
use iroh_gossip::api::{GossipReceiver, GossipSender};
use iroh_gossip::net::Gossip;
use iroh_gossip::proto::TopicId;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::envelope::SignedEnvelope;
use super::{HandlerId, InboundMessage, MessageHandler, Node, PubSub};
use crate::error::{ChannelError, ChannelResult};
use crate::peer::PeerId;

/// Domain separation prefix for channel topics.
const TOPIC_PREFIX: &[u8] = b"direct-channel-topic-v1:";

/// Derive the gossip topic ID for a string topic.
pub fn gossip_topic(topic: &str) -> TopicId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(TOPIC_PREFIX);
    hasher.update(topic.as_bytes());
    TopicId::from_bytes(*hasher.finalize().as_bytes())
}

type Handlers = Arc<RwLock<HashMap<HandlerId, MessageHandler>>>;
type Neighbors = Arc<RwLock<HashSet<PeerId>>>;

/// State for one joined gossip topic
struct JoinedTopic {
    sender: Arc<Mutex<GossipSender>>,
    handlers: Handlers,
    neighbors: Neighbors,
    /// Stops the receive loop, which drops the receiver and leaves the swarm
    cancel: CancellationToken,
}

struct Inner {
    gossip: Gossip,
    /// Signs every published envelope; its public half is our endpoint ID
    secret: SecretKey,
    bootstrap: RwLock<Vec<EndpointId>>,
    topics: Mutex<HashMap<String, JoinedTopic>>,
    next_handler: AtomicU64,
}

/// [`PubSub`] implementation over an iroh-gossip instance.
///
/// Cheap to clone; clones share joined topics.
#[derive(Clone)]
pub struct GossipPubSub {
    inner: Arc<Inner>,
}

impl GossipPubSub {
    /// Wrap a spawned gossip protocol owned by the endpoint with `secret_key`
    pub fn new(gossip: Gossip, secret_key: SecretKey) -> Self {
        Self {
            inner: Arc::new(Inner {
                gossip,
                secret: secret_key,
                bootstrap: RwLock::new(Vec::new()),
                topics: Mutex::new(HashMap::new()),
                next_handler: AtomicU64::new(1),
            }),
        }
    }

    /// Peers to contact when joining a topic swarm.
    ///
    /// Only affects topics joined afterwards.
    pub fn with_bootstrap(self, peers: impl IntoIterator<Item = EndpointId>) -> Self {
        self.inner.bootstrap.write().extend(peers);
        self
    }

    /// Add a single bootstrap peer
    pub fn add_bootstrap_peer(&self, peer: EndpointId) {
        let mut bootstrap = self.inner.bootstrap.write();
        if !bootstrap.contains(&peer) {
            bootstrap.push(peer);
        }
    }

    /// This node's endpoint ID
    pub fn endpoint_id(&self) -> EndpointId {
        self.inner.secret.public()
    }

    async fn join(&self, topic: &str) -> ChannelResult<JoinedTopic> {
        let topic_id = gossip_topic(topic);
        let bootstrap = self.inner.bootstrap.read().clone();
        info!(topic, ?topic_id, peer_count = bootstrap.len(), "Joining gossip topic");

        let (sender, receiver) = self
            .inner
            .gossip
            .subscribe(topic_id, bootstrap)
            .await
            .map_err(|e| ChannelError::Transport(format!("Failed to subscribe: {}", e)))?
            .split();

        let joined = JoinedTopic {
            sender: Arc::new(Mutex::new(sender)),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            neighbors: Arc::new(RwLock::new(HashSet::new())),
            cancel: CancellationToken::new(),
        };

        tokio::spawn(receive_loop(
            topic.to_string(),
            receiver,
            Arc::clone(&joined.handlers),
            Arc::clone(&joined.neighbors),
            joined.cancel.clone(),
        ));

        Ok(joined)
    }
}

/// Dispatch gossip events for one topic until cancelled or the stream ends.
async fn receive_loop(
    topic: String,
    mut receiver: GossipReceiver,
    handlers: Handlers,
    neighbors: Neighbors,
    cancel: CancellationToken,
) {
    use iroh_gossip::api::Event;
    use n0_future::StreamExt;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = receiver.try_next() => next,
        };

        match next {
            Ok(Some(event)) => match event {
                Event::Received(msg) => {
                    let opened = SignedEnvelope::from_bytes(&msg.content)
                        .and_then(|envelope| envelope.open(&topic));
                    let (author, data) = match opened {
                        Ok(verified) => verified,
                        Err(e) => {
                            debug!(topic = %topic, via = ?msg.delivered_from, error = %e, "Dropping unverifiable message");
                            continue;
                        }
                    };

                    debug!(topic = %topic, from = ?author, via = ?msg.delivered_from, len = data.len(), "Received message");
                    let message = InboundMessage {
                        from: PeerId::from(author),
                        data,
                        topics: vec![topic.clone()],
                    };
                    let targets: Vec<MessageHandler> =
                        handlers.read().values().cloned().collect();
                    for handler in targets {
                        handler(message.clone());
                    }
                }
                Event::NeighborUp(peer) => {
                    info!(topic = %topic, ?peer, "Neighbor joined");
                    neighbors.write().insert(PeerId::from(peer));
                }
                Event::NeighborDown(peer) => {
                    info!(topic = %topic, ?peer, "Neighbor left");
                    neighbors.write().remove(&PeerId::from(peer));
                }
                Event::Lagged => {
                    warn!(topic = %topic, "Lagged behind on topic");
                }
            },
            Ok(None) => {
                debug!(topic = %topic, "Topic subscription closed");
                break;
            }
            Err(e) => {
                warn!(topic = %topic, error = ?e, "Error receiving from topic");
                break;
            }
        }
    }

    neighbors.write().clear();
    debug!(topic = %topic, "Receive loop stopped");
}

#[async_trait]
impl PubSub for GossipPubSub {
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> ChannelResult<HandlerId> {
        let mut topics = self.inner.topics.lock().await;

        if !topics.contains_key(topic) {
            let joined = self.join(topic).await?;
            topics.insert(topic.to_string(), joined);
        }

        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::Relaxed));
        if let Some(joined) = topics.get(topic) {
            joined.handlers.write().insert(id, handler);
        }

        debug!(topic, %id, "Handler subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, topic: &str, handler: HandlerId) -> ChannelResult<()> {
        let mut topics = self.inner.topics.lock().await;

        let Some(joined) = topics.get(topic) else {
            debug!(topic, %handler, "Unsubscribe from topic not joined");
            return Ok(());
        };

        let remaining = {
            let mut handlers = joined.handlers.write();
            handlers.remove(&handler);
            handlers.len()
        };

        if remaining == 0 {
            if let Some(joined) = topics.remove(topic) {
                joined.cancel.cancel();
                info!(topic, "Left gossip topic");
            }
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> ChannelResult<()> {
        let sender = {
            let topics = self.inner.topics.lock().await;
            let joined = topics.get(topic).ok_or_else(|| {
                ChannelError::Transport(format!("Failed to broadcast: not subscribed to {topic}"))
            })?;
            Arc::clone(&joined.sender)
        };

        let envelope = SignedEnvelope::seal(topic, &payload, &self.inner.secret).to_bytes()?;

        debug!(topic, len = payload.len(), "Broadcasting message");
        let result = sender
            .lock()
            .await
            .broadcast(Bytes::from(envelope))
            .await
            .map_err(|e| ChannelError::Transport(format!("Failed to broadcast: {}", e)));
        result
    }

    async fn list_peers(&self, topic: &str) -> ChannelResult<Vec<PeerId>> {
        let topics = self.inner.topics.lock().await;
        let mut peers: Vec<PeerId> = topics
            .get(topic)
            .map(|joined| joined.neighbors.read().iter().cloned().collect())
            .unwrap_or_default();
        peers.sort();
        Ok(peers)
    }
}

#[async_trait]
impl Node for GossipPubSub {
    fn pubsub(&self) -> Option<Arc<dyn PubSub>> {
        Some(Arc::new(self.clone()))
    }

    async fn local_peer_id(&self) -> ChannelResult<PeerId> {
        Ok(PeerId::from(self.endpoint_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gossip_topic_deterministic() {
        let a = gossip_topic("/direct-channel-v1/QmAlice/QmBob");
        let b = gossip_topic("/direct-channel-v1/QmAlice/QmBob");
        assert_eq!(a, b);
    }

    #[test]
    fn test_gossip_topic_unique() {
        let a = gossip_topic("/direct-channel-v1/QmAlice/QmBob");
        let b = gossip_topic("/direct-channel-v1/QmAlice/QmCarol");
        assert_ne!(a, b);
    }

    #[test]
    fn test_gossip_topic_domain_separated() {
        let topic = "/direct-channel-v1/QmAlice/QmBob";
        let raw = TopicId::from_bytes(*blake3::hash(topic.as_bytes()).as_bytes());
        assert_ne!(gossip_topic(topic), raw);
    }
}
