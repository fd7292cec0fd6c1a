//! Direct channel between two peers over a shared pub/sub topic
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  new()      validate peers, derive ChannelId        → Closed    │
//! │  open()     subscribe with gated handler   Opening  → Open      │
//! │  connect()  poll peer list until counterpart is listening       │
//! │  send()     publish on the channel topic                        │
//! │  messages() single consumer stream of accepted messages         │
//! │  close()    cancel rendezvous, unsubscribe once     → Closed    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Closed` is both the initial and the terminal state. Once a channel has
//! been closed it cannot be opened again; build a new one instead.
//!
//! ## Send Policy
//!
//! `send()` on a closed channel fails with [`ChannelError::Closed`]. Before
//! `open()` has completed it fails with [`ChannelError::InvalidOperation`].
//!
//! ## Usage
//!
//! ```ignore
//! let channel = DirectChannel::open_with_node(&node, bob_id, ChannelConfig::default()).await?;
//! let mut messages = channel.messages()?;
//!
//! if channel.connect().await?.is_connected() {
//!     channel.send("hello").await?;
//! }
//!
//! while let Some(msg) = messages.recv().await {
//!     println!("{}: {:?}", msg.from, msg.data);
//! }
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::gate::MessageGate;
use crate::identity::{sorted_pair, ChannelId};
use crate::peer::PeerId;
use crate::rendezvous::{self, RendezvousOutcome};
use crate::transport::{HandlerId, InboundMessage, MessageHandler, Node, PubSub};

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Not subscribed; initial and terminal
    #[default]
    Closed,
    /// Subscribe call in flight
    Opening,
    /// Subscribed and forwarding messages
    Open,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Closed => write!(f, "Closed"),
            ChannelState::Opening => write!(f, "Opening"),
            ChannelState::Open => write!(f, "Open"),
        }
    }
}

/// Where accepted messages go. `None` until a consumer attaches, and again
/// after close.
type MessageSink = Arc<Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>>;

struct Lifecycle {
    state: ChannelState,
    handler: Option<HandlerId>,
    stream_taken: bool,
}

/// Point-to-point channel between the local peer and one counterpart.
///
/// All methods take `&self`; share the channel behind an `Arc` to call
/// `close()` while another task is blocked in `connect()`.
pub struct DirectChannel {
    pubsub: Arc<dyn PubSub>,
    id: ChannelId,
    local: PeerId,
    remote: PeerId,
    config: ChannelConfig,
    lifecycle: Mutex<Lifecycle>,
    sink: MessageSink,
    /// Fired exactly once, by the first close (or drop)
    closed: CancellationToken,
    state_tx: watch::Sender<ChannelState>,
}

impl DirectChannel {
    /// Construct a channel without touching the transport.
    ///
    /// Validates the configuration and both identifiers and derives the
    /// channel ID. The channel starts `Closed`; call [`DirectChannel::open`].
    pub fn new(
        pubsub: Arc<dyn PubSub>,
        local: impl Into<PeerId>,
        remote: impl Into<PeerId>,
        config: ChannelConfig,
    ) -> ChannelResult<Self> {
        let local = local.into();
        let remote = remote.into();

        config.validate()?;
        let id = ChannelId::derive(config.namespace_segment(), &local, &remote)?;
        let (state_tx, _) = watch::channel(ChannelState::Closed);

        debug!(channel = %id, local = %local.short(), remote = %remote.short(), "Channel created");

        Ok(Self {
            pubsub,
            id,
            local,
            remote,
            config,
            lifecycle: Mutex::new(Lifecycle {
                state: ChannelState::Closed,
                handler: None,
                stream_taken: false,
            }),
            sink: Arc::new(Mutex::new(None)),
            closed: CancellationToken::new(),
            state_tx,
        })
    }

    /// Negotiate pub/sub on `node`, resolve its identity, then construct and
    /// open a channel to `remote`.
    pub async fn open_with_node(
        node: &dyn Node,
        remote: impl Into<PeerId>,
        config: ChannelConfig,
    ) -> ChannelResult<Self> {
        let pubsub = node.pubsub().ok_or(ChannelError::PubSubUnsupported)?;
        let local = node.local_peer_id().await?;

        let channel = Self::new(pubsub, local, remote, config)?;
        channel.open().await?;
        Ok(channel)
    }

    /// Subscribe to the channel topic.
    ///
    /// Moves `Closed → Opening → Open`. Fails if the channel was opened
    /// before, or if the transport rejects the subscription; in the latter
    /// case the channel ends up closed for good.
    pub async fn open(&self) -> ChannelResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if self.closed.is_cancelled() {
                return Err(ChannelError::Closed);
            }
            if lifecycle.state != ChannelState::Closed {
                return Err(ChannelError::InvalidOperation(format!(
                    "cannot open a channel that is {}",
                    lifecycle.state
                )));
            }
            lifecycle.state = ChannelState::Opening;
        }
        self.state_tx.send_replace(ChannelState::Opening);
        info!(channel = %self.id, "Opening channel");

        let handler = match self.pubsub.subscribe(self.id.as_str(), self.gated_handler()).await {
            Ok(handler) => handler,
            Err(e) => {
                warn!(channel = %self.id, error = %e, "Subscribe failed");
                self.terminate();
                return Err(e);
            }
        };

        // close() may have run while the subscribe was in flight
        let raced = {
            let mut lifecycle = self.lifecycle.lock();
            if self.closed.is_cancelled() {
                true
            } else {
                lifecycle.state = ChannelState::Open;
                lifecycle.handler = Some(handler);
                false
            }
        };

        if raced {
            debug!(channel = %self.id, "Closed while opening, dropping subscription");
            self.pubsub.unsubscribe(self.id.as_str(), handler).await?;
            return Err(ChannelError::Closed);
        }

        self.state_tx.send_replace(ChannelState::Open);
        info!(channel = %self.id, "Channel open");
        Ok(())
    }

    /// Wait until the counterpart is subscribed to the channel topic.
    ///
    /// Returns `Cancelled` if the channel is closed while waiting. Fails with
    /// the transport's error if a peer-list query fails.
    pub async fn connect(&self) -> ChannelResult<RendezvousOutcome> {
        self.ensure_open()?;

        // Own token per call; close() cancels the parent
        let cancel = self.closed.child_token();
        let outcome = rendezvous::wait_for_peers(
            self.pubsub.as_ref(),
            &self.id,
            std::slice::from_ref(&self.remote),
            self.config.poll_interval,
            &cancel,
        )
        .await?;

        match outcome {
            RendezvousOutcome::Connected => {
                info!(channel = %self.id, peer = %self.remote.short(), "Counterpart connected")
            }
            RendezvousOutcome::Cancelled => {
                debug!(channel = %self.id, "Connect cancelled by close")
            }
        }
        Ok(outcome)
    }

    /// [`DirectChannel::connect`] bounded by `timeout`.
    pub async fn connect_timeout(&self, timeout: Duration) -> ChannelResult<RendezvousOutcome> {
        tokio::time::timeout(timeout, self.connect())
            .await
            .map_err(|_| {
                ChannelError::Timeout(format!(
                    "peer {} not seen on {} within {:?}",
                    self.remote, self.id, timeout
                ))
            })?
    }

    /// Publish `payload` on the channel topic.
    pub async fn send(&self, payload: impl Into<Bytes>) -> ChannelResult<()> {
        self.ensure_open()?;

        let data = encode(payload);
        debug!(channel = %self.id, len = data.len(), "Sending message");

        self.pubsub
            .publish(self.id.as_str(), data)
            .await
            .inspect_err(|e| warn!(channel = %self.id, error = %e, "Publish failed"))
    }

    /// Close the channel.
    ///
    /// Idempotent: only the first call unblocks pending `connect()` calls,
    /// ends the message stream and unsubscribes. Later calls return `Ok(())`
    /// without touching the transport.
    pub async fn close(&self) -> ChannelResult<()> {
        let Some(handler) = self.terminate() else {
            return Ok(());
        };

        if let Some(handler) = handler {
            self.pubsub.unsubscribe(self.id.as_str(), handler).await?;
        }
        info!(channel = %self.id, "Channel closed");
        Ok(())
    }

    /// Attach the single consumer of accepted messages.
    ///
    /// Only messages delivered after this call are seen. The stream ends as
    /// soon as the channel closes; messages still buffered at that point are
    /// discarded. A second call fails.
    pub fn messages(&self) -> ChannelResult<MessageStream> {
        let mut lifecycle = self.lifecycle.lock();
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        if lifecycle.stream_taken {
            return Err(ChannelError::InvalidOperation(
                "message stream already taken".to_string(),
            ));
        }
        lifecycle.stream_taken = true;

        let (tx, rx) = mpsc::unbounded_channel();
        *self.sink.lock() = Some(tx);
        Ok(MessageStream {
            rx,
            closed: self.closed.clone(),
        })
    }

    /// Channel topic
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Both participants, sorted the same way as in the channel ID
    pub fn peers(&self) -> [&PeerId; 2] {
        let (first, second) = sorted_pair(&self.local, &self.remote);
        [first, second]
    }

    /// Our own peer ID
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// The counterpart's peer ID
    pub fn remote_peer(&self) -> &PeerId {
        &self.remote
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChannelState {
        self.lifecycle.lock().state
    }

    /// Whether the channel is open
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Observe state transitions, e.g. to wait for `Open`.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    fn ensure_open(&self) -> ChannelResult<()> {
        let state = self.lifecycle.lock().state;
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        if state != ChannelState::Open {
            return Err(ChannelError::InvalidOperation(format!(
                "channel is {state}, not Open"
            )));
        }
        Ok(())
    }

    /// Move to the terminal state.
    ///
    /// Returns `None` if the channel was already terminated, otherwise the
    /// subscription handler (if any) that still has to be removed.
    fn terminate(&self) -> Option<Option<HandlerId>> {
        let handler = {
            let mut lifecycle = self.lifecycle.lock();
            if self.closed.is_cancelled() {
                return None;
            }
            self.closed.cancel();
            lifecycle.state = ChannelState::Closed;
            lifecycle.handler.take()
        };

        // Dropping the sender ends the consumer's stream
        self.sink.lock().take();
        self.state_tx.send_replace(ChannelState::Closed);
        Some(handler)
    }

    fn gated_handler(&self) -> MessageHandler {
        let gate = MessageGate::new(self.remote.clone());
        let sink = Arc::clone(&self.sink);
        let topic = self.id.clone();

        Arc::new(move |message: InboundMessage| {
            if !gate.accept(&message) {
                debug!(channel = %topic, from = %message.from.short(), "Dropping message from unexpected sender");
                return;
            }
            if let Some(tx) = sink.lock().as_ref() {
                // A dropped stream just means nobody is listening any more
                let _ = tx.send(message);
            }
        })
    }
}

impl fmt::Debug for DirectChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectChannel")
            .field("id", &self.id)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for DirectChannel {
    fn drop(&mut self) {
        let Some(Some(handler)) = self.terminate() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pubsub = Arc::clone(&self.pubsub);
                let topic = self.id.clone();
                runtime.spawn(async move {
                    if let Err(e) = pubsub.unsubscribe(topic.as_str(), handler).await {
                        warn!(channel = %topic, error = %e, "Unsubscribe on drop failed");
                    }
                });
            }
            Err(_) => {
                warn!(channel = %self.id, "Channel dropped while open outside a runtime; subscription leaked");
            }
        }
    }
}

/// Turn a caller payload into the bytes the transport carries.
fn encode(payload: impl Into<Bytes>) -> Bytes {
    payload.into()
}

/// Live stream of messages accepted by a channel.
///
/// Yields `None` from the moment the channel closes, even if messages
/// delivered earlier were never read.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    /// The owning channel's terminal flag
    closed: CancellationToken,
}

impl MessageStream {
    /// Receive the next accepted message
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            message = self.rx.recv() => message,
        }
    }

    /// Take a message if one is already waiting
    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        if self.closed.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

impl Stream for MessageStream {
    type Item = InboundMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // close() cancels before dropping the sender, and that drop wakes us
        if self.closed.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}
