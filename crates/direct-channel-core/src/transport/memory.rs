//! In-process pub/sub network
//!
//! Every [`MemoryNode`] created from the same [`MemoryNetwork`] shares one
//! topic table. Publishing fans the payload out synchronously to every handler
//! subscribed to the topic, the publisher's own handlers included, with the
//! publisher's ID attached as sender.
//!
//! Nodes carry fault switches and call counters so tests can exercise
//! transport failures and count unsubscribe calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use super::{HandlerId, InboundMessage, MessageHandler, Node, PubSub};
use crate::error::{ChannelError, ChannelResult};
use crate::peer::PeerId;

struct Subscription {
    id: HandlerId,
    owner: PeerId,
    handler: MessageHandler,
}

#[derive(Default)]
struct NetworkInner {
    /// topic → registered handlers, in subscription order
    topics: HashMap<String, Vec<Subscription>>,
}

/// Shared topic table connecting a set of in-memory nodes.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<RwLock<NetworkInner>>,
    next_handler: Arc<AtomicU64>,
}

impl MemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node with the given identity
    pub fn node(&self, id: impl Into<PeerId>) -> MemoryNode {
        MemoryNode {
            id: id.into(),
            network: self.clone(),
            pubsub_enabled: true,
            faults: Arc::new(Faults::default()),
            stats: Arc::new(Stats::default()),
        }
    }

    /// Number of handlers currently registered on `topic`, across all nodes
    pub fn handler_count(&self, topic: &str) -> usize {
        self.inner
            .read()
            .topics
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn next_handler_id(&self) -> HandlerId {
        HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[derive(Default)]
struct Faults {
    subscribe: AtomicBool,
    unsubscribe: AtomicBool,
    publish: AtomicBool,
    list_peers: AtomicBool,
}

#[derive(Default)]
struct Stats {
    subscribe: AtomicUsize,
    unsubscribe: AtomicUsize,
    publish: AtomicUsize,
    list_peers: AtomicUsize,
}

/// Which primitive a fault switch or counter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// [`PubSub::subscribe`]
    Subscribe,
    /// [`PubSub::unsubscribe`]
    Unsubscribe,
    /// [`PubSub::publish`]
    Publish,
    /// [`PubSub::list_peers`]
    ListPeers,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Publish => "publish",
            Operation::ListPeers => "list peers",
        }
    }
}

/// One participant of a [`MemoryNetwork`].
///
/// Clones share identity, fault switches and counters.
#[derive(Clone)]
pub struct MemoryNode {
    id: PeerId,
    network: MemoryNetwork,
    pubsub_enabled: bool,
    faults: Arc<Faults>,
    stats: Arc<Stats>,
}

impl MemoryNode {
    /// This node's peer ID
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// A handle to the same node that reports no pub/sub capability.
    pub fn without_pubsub(&self) -> Self {
        Self {
            pubsub_enabled: false,
            ..self.clone()
        }
    }

    /// Make every subsequent call to `op` fail (or succeed again).
    pub fn set_failing(&self, op: Operation, failing: bool) {
        self.fault(op).store(failing, Ordering::SeqCst);
    }

    /// How many times `op` has been invoked on this node.
    pub fn calls(&self, op: Operation) -> usize {
        self.counter(op).load(Ordering::SeqCst)
    }

    fn counter(&self, op: Operation) -> &AtomicUsize {
        match op {
            Operation::Subscribe => &self.stats.subscribe,
            Operation::Unsubscribe => &self.stats.unsubscribe,
            Operation::Publish => &self.stats.publish,
            Operation::ListPeers => &self.stats.list_peers,
        }
    }

    fn fault(&self, op: Operation) -> &AtomicBool {
        match op {
            Operation::Subscribe => &self.faults.subscribe,
            Operation::Unsubscribe => &self.faults.unsubscribe,
            Operation::Publish => &self.faults.publish,
            Operation::ListPeers => &self.faults.list_peers,
        }
    }

    fn enter(&self, op: Operation) -> ChannelResult<()> {
        self.counter(op).fetch_add(1, Ordering::SeqCst);

        if self.fault(op).load(Ordering::SeqCst) {
            return Err(ChannelError::Transport(format!(
                "Failed to {}: injected fault on {}",
                op.name(),
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PubSub for MemoryNode {
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> ChannelResult<HandlerId> {
        self.enter(Operation::Subscribe)?;

        let id = self.network.next_handler_id();
        self.network
            .inner
            .write()
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscription {
                id,
                owner: self.id.clone(),
                handler,
            });

        debug!(peer = %self.id, topic, %id, "Subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, topic: &str, handler: HandlerId) -> ChannelResult<()> {
        self.enter(Operation::Unsubscribe)?;

        let mut inner = self.network.inner.write();
        if let Some(subs) = inner.topics.get_mut(topic) {
            subs.retain(|s| !(s.id == handler && s.owner == self.id));
            if subs.is_empty() {
                inner.topics.remove(topic);
            }
        }

        debug!(peer = %self.id, topic, %handler, "Unsubscribed");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> ChannelResult<()> {
        self.enter(Operation::Publish)?;

        // Snapshot handlers so none run under the lock
        let handlers: Vec<MessageHandler> = self
            .network
            .inner
            .read()
            .topics
            .get(topic)
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        debug!(peer = %self.id, topic, len = payload.len(), receivers = handlers.len(), "Publishing");

        let message = InboundMessage::new(self.id.clone(), payload, topic);
        for handler in handlers {
            handler(message.clone());
        }
        Ok(())
    }

    async fn list_peers(&self, topic: &str) -> ChannelResult<Vec<PeerId>> {
        self.enter(Operation::ListPeers)?;

        let inner = self.network.inner.read();
        let mut peers: Vec<PeerId> = inner
            .topics
            .get(topic)
            .map(|subs| {
                subs.iter()
                    .map(|s| s.owner.clone())
                    .filter(|owner| *owner != self.id)
                    .collect()
            })
            .unwrap_or_default();
        peers.sort();
        peers.dedup();
        Ok(peers)
    }
}

#[async_trait]
impl Node for MemoryNode {
    fn pubsub(&self) -> Option<Arc<dyn PubSub>> {
        if self.pubsub_enabled {
            Some(Arc::new(self.clone()))
        } else {
            None
        }
    }

    async fn local_peer_id(&self) -> ChannelResult<PeerId> {
        if self.id.is_empty() {
            return Err(ChannelError::Identity(
                "memory node has no peer ID".to_string(),
            ));
        }
        Ok(self.id.clone())
    }
}
