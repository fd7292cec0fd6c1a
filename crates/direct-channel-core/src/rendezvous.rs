//! Peer rendezvous by polling
//!
//! A topic's peer list only shows peers that have already subscribed and been
//! gossiped to the local node. There is no "peer joined" push, so waiting for
//! a counterpart means asking again until it shows up.
//!
//! ## Algorithm
//!
//! ```text
//! query list_peers(topic) ──► all expected present? ──yes──► Connected
//!        ▲                           │ no
//!        │                           ▼
//!   next tick ◄──────────── cancelled? ──yes──► Cancelled
//! ```
//!
//! The first query runs immediately, with no interval delay. Every call owns
//! its own ticker and observes its own cancellation token, so cancelling one
//! wait never touches another.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::ChannelResult;
use crate::identity::ChannelId;
use crate::peer::PeerId;
use crate::transport::PubSub;

/// Shortest interval the poller will honour.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How a rendezvous wait ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousOutcome {
    /// Every expected peer is subscribed to the topic
    Connected,
    /// The caller stopped waiting before that happened
    Cancelled,
}

impl RendezvousOutcome {
    /// Whether the expected peers were found
    pub fn is_connected(self) -> bool {
        self == RendezvousOutcome::Connected
    }
}

/// Wait until every peer in `expected` appears in `topic`'s peer list.
///
/// Returns `Connected` as soon as a query shows all expected peers,
/// `Cancelled` once `cancel` fires (including mid-query), and the transport's
/// error if a query fails. Cancellation is checked before the first query, so
/// an already-cancelled token never touches the transport.
pub async fn wait_for_peers(
    pubsub: &dyn PubSub,
    topic: &ChannelId,
    expected: &[PeerId],
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> ChannelResult<RendezvousOutcome> {
    if cancel.is_cancelled() {
        return Ok(RendezvousOutcome::Cancelled);
    }

    let expected: HashSet<&str> = expected.iter().map(PeerId::as_str).collect();
    if expected.is_empty() {
        return Ok(RendezvousOutcome::Connected);
    }

    // First tick completes immediately
    let mut ticker = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut polls: u64 = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(topic = %topic, polls, "Rendezvous cancelled");
                return Ok(RendezvousOutcome::Cancelled);
            }
            _ = ticker.tick() => {}
        }

        let peers = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(topic = %topic, polls, "Rendezvous cancelled during query");
                return Ok(RendezvousOutcome::Cancelled);
            }
            result = pubsub.list_peers(topic.as_str()) => result?,
        };
        polls += 1;

        if contains_all(&peers, &expected) {
            debug!(topic = %topic, polls, "Rendezvous complete");
            return Ok(RendezvousOutcome::Connected);
        }
        trace!(topic = %topic, polls, present = peers.len(), "Expected peers not yet subscribed");
    }
}

/// Whether `peers` includes every identifier in `expected`.
fn contains_all(peers: &[PeerId], expected: &HashSet<&str>) -> bool {
    let present: HashSet<&str> = peers.iter().map(PeerId::as_str).collect();
    expected.is_subset(&present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::transport::{HandlerId, MessageHandler};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Peer list that reveals the expected peer after a number of queries.
    struct ScriptedPeers {
        reveal_after: usize,
        fail_on: Option<usize>,
        peer: PeerId,
        queries: AtomicUsize,
        query_log: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ScriptedPeers {
        fn new(reveal_after: usize) -> Self {
            Self {
                reveal_after,
                fail_on: None,
                peer: PeerId::new("QmBob"),
                queries: AtomicUsize::new(0),
                query_log: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PubSub for ScriptedPeers {
        async fn subscribe(&self, _: &str, _: MessageHandler) -> ChannelResult<HandlerId> {
            Ok(HandlerId(1))
        }

        async fn unsubscribe(&self, _: &str, _: HandlerId) -> ChannelResult<()> {
            Ok(())
        }

        async fn publish(&self, _: &str, _: Bytes) -> ChannelResult<()> {
            Ok(())
        }

        async fn list_peers(&self, _: &str) -> ChannelResult<Vec<PeerId>> {
            let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
            self.query_log.lock().push(tokio::time::Instant::now());
            if self.fail_on == Some(n) {
                return Err(ChannelError::Transport("peer query rejected".into()));
            }
            if n > self.reveal_after {
                Ok(vec![PeerId::new("QmOther"), self.peer.clone()])
            } else {
                Ok(vec![PeerId::new("QmOther")])
            }
        }
    }

    fn topic() -> ChannelId {
        ChannelId::derive("ns", &PeerId::new("QmAlice"), &PeerId::new("QmBob")).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_path_without_delay() {
        let pubsub = ScriptedPeers::new(0);
        let start = tokio::time::Instant::now();

        let outcome = wait_for_peers(
            &pubsub,
            &topic(),
            &[PeerId::new("QmBob")],
            Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, RendezvousOutcome::Connected);
        assert_eq!(pubsub.queries(), 1);
        assert_eq!(tokio::time::Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_until_found() {
        let pubsub = ScriptedPeers::new(3);
        let start = tokio::time::Instant::now();

        let outcome = wait_for_peers(
            &pubsub,
            &topic(),
            &[PeerId::new("QmBob")],
            Duration::from_millis(50),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, RendezvousOutcome::Connected);
        assert_eq!(pubsub.queries(), 4);

        let log = pubsub.query_log.lock();
        assert_eq!(log[0], start);
        assert_eq!(log[3] - start, Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let pubsub = Arc::new(ScriptedPeers::new(usize::MAX));
        let cancel = CancellationToken::new();

        let task = {
            let pubsub = Arc::clone(&pubsub);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                wait_for_peers(
                    pubsub.as_ref(),
                    &topic(),
                    &[PeerId::new("QmBob")],
                    Duration::from_millis(10),
                    &cancel,
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, RendezvousOutcome::Cancelled);

        let after_cancel = pubsub.queries();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pubsub.queries(), after_cancel, "no polls after cancellation");
    }

    #[tokio::test]
    async fn test_already_cancelled_never_queries() {
        let pubsub = ScriptedPeers::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = wait_for_peers(
            &pubsub,
            &topic(),
            &[PeerId::new("QmBob")],
            Duration::from_millis(10),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome, RendezvousOutcome::Cancelled);
        assert_eq!(pubsub.queries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failure_surfaces() {
        let mut pubsub = ScriptedPeers::new(usize::MAX);
        pubsub.fail_on = Some(2);

        let result = wait_for_peers(
            &pubsub,
            &topic(),
            &[PeerId::new("QmBob")],
            Duration::from_millis(10),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(ChannelError::Transport(_))));
        assert_eq!(pubsub.queries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_waits() {
        let pubsub = Arc::new(ScriptedPeers::new(5));
        let cancel_a = CancellationToken::new();
        let cancel_b = CancellationToken::new();

        let wait_a = {
            let pubsub = Arc::clone(&pubsub);
            let cancel = cancel_a.clone();
            tokio::spawn(async move {
                wait_for_peers(
                    pubsub.as_ref(),
                    &topic(),
                    &[PeerId::new("QmBob")],
                    Duration::from_millis(10),
                    &cancel,
                )
                .await
            })
        };
        let wait_b = {
            let pubsub = Arc::clone(&pubsub);
            let cancel = cancel_b.clone();
            tokio::spawn(async move {
                wait_for_peers(
                    pubsub.as_ref(),
                    &topic(),
                    &[PeerId::new("QmBob")],
                    Duration::from_millis(10),
                    &cancel,
                )
                .await
            })
        };

        cancel_a.cancel();

        assert_eq!(wait_a.await.unwrap().unwrap(), RendezvousOutcome::Cancelled);
        assert_eq!(wait_b.await.unwrap().unwrap(), RendezvousOutcome::Connected);
        assert!(!cancel_b.is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_expectation_is_connected() {
        let pubsub = ScriptedPeers::new(usize::MAX);
        let outcome = wait_for_peers(
            &pubsub,
            &topic(),
            &[],
            Duration::from_millis(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, RendezvousOutcome::Connected);
        assert_eq!(pubsub.queries(), 0);
    }

    #[test]
    fn test_contains_all_is_representation_agnostic() {
        let expected: HashSet<&str> = ["QmBob", "QmCarol"].into_iter().collect();
        let peers = vec![
            PeerId::new(" QmBob"),
            PeerId::from(String::from("QmCarol")),
            PeerId::new("QmDave"),
        ];
        assert!(contains_all(&peers, &expected));
        assert!(!contains_all(&peers[..1], &expected));
    }
}
