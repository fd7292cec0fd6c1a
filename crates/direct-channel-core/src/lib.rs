//! Direct Channel Core Library
//!
//! Point-to-point channels between two peers that can only talk through a
//! shared publish/subscribe substrate.
//!
//! ## Overview
//!
//! Any subscriber can see any topic on a pub/sub network. A direct channel
//! carves a private-by-convention conversation out of it:
//!
//! - **Channel identity**: both peers derive the same topic from their two
//!   peer IDs, with no handshake
//! - **Sender filtering**: messages not sent by the counterpart are dropped
//! - **Rendezvous**: `connect()` waits until the counterpart is actually
//!   subscribed before the caller relies on delivery
//!
//! ## Quick Start
//!
//! ```ignore
//! use direct_channel_core::{ChannelConfig, DirectChannel};
//! use direct_channel_core::transport::memory::MemoryNetwork;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let net = MemoryNetwork::new();
//!     let alice = net.node("QmAlice");
//!     let bob = net.node("QmBob");
//!
//!     let a = DirectChannel::open_with_node(&alice, "QmBob", ChannelConfig::default()).await?;
//!     let b = DirectChannel::open_with_node(&bob, "QmAlice", ChannelConfig::default()).await?;
//!     let mut inbox = b.messages()?;
//!
//!     a.connect().await?;
//!     a.send("hello").await?;
//!
//!     let msg = inbox.recv().await.expect("channel open");
//!     assert_eq!(msg.from, "QmAlice");
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod logging;
pub mod peer;
pub mod rendezvous;
pub mod transport;

// Re-exports
pub use channel::{ChannelState, DirectChannel, MessageStream};
pub use config::ChannelConfig;
pub use error::{ChannelError, ChannelResult};
pub use gate::MessageGate;
pub use identity::ChannelId;
pub use peer::PeerId;
pub use rendezvous::{wait_for_peers, RendezvousOutcome};
pub use transport::{HandlerId, InboundMessage, MessageHandler, Node, PubSub};
