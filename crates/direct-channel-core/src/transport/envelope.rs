//! Signed gossip payloads
//!
//! Gossip only tells a receiver which neighbor handed it a message, and in a
//! swarm that may be a relay. Every payload published through
//! [`GossipPubSub`](super::gossip::GossipPubSub) is therefore wrapped in an
//! envelope signed with the author's endpoint key. The receiver verifies the
//! signature and reports the signing key as the sender.
//!
//! ## Wire Format
//!
//! ```text
//! +----------+----------+---------+---------+-----------+
//! | version  | author   | nonce   | payload | signature |
//! | (1 byte) | (32)     | (16)    | (var)   | (64)      |
//! +----------+----------+---------+---------+-----------+
//! ```
//!
//! Encoded with postcard. The signature covers
//! `version || topic || author || nonce || payload`, so an envelope cannot be
//! replayed onto another channel's topic. The random nonce keeps two sends of
//! the same payload distinct; gossip would otherwise deduplicate them.

use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use iroh::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ChannelResult};

/// Current envelope protocol version
pub const ENVELOPE_VERSION: u8 = 1;

/// Domain separation for signed data
const SIGNING_CONTEXT: &[u8] = b"direct-channel-envelope-v1:";

/// A payload together with its author's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Protocol version for forward compatibility
    pub version: u8,
    /// Author's endpoint public key
    pub author: [u8; 32],
    /// Random per-message value
    pub nonce: [u8; 16],
    /// Caller payload, untouched
    pub payload: Vec<u8>,
    /// Ed25519 signature over the signed data
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    /// Wrap `payload` for publication on `topic`, signed by `secret`.
    pub fn seal(topic: &str, payload: &[u8], secret: &SecretKey) -> Self {
        let signing_key = SigningKey::from_bytes(&secret.to_bytes());

        let mut envelope = Self {
            version: ENVELOPE_VERSION,
            author: *secret.public().as_bytes(),
            nonce: rand::random(),
            payload: payload.to_vec(),
            signature: Vec::new(),
        };

        let signed_data = envelope.signed_data(topic);
        envelope.signature = signing_key.sign(&signed_data).to_bytes().to_vec();
        envelope
    }

    /// Verify the envelope as received on `topic`.
    ///
    /// Returns the verified author and the payload.
    pub fn open(self, topic: &str) -> ChannelResult<(PublicKey, Bytes)> {
        if self.version != ENVELOPE_VERSION {
            return Err(ChannelError::InvalidEnvelope(format!(
                "unsupported version {}",
                self.version
            )));
        }

        let verifying_key = VerifyingKey::from_bytes(&self.author)
            .map_err(|e| ChannelError::InvalidEnvelope(format!("bad author key: {}", e)))?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|e| ChannelError::InvalidEnvelope(format!("bad signature: {}", e)))?;

        verifying_key
            .verify_strict(&self.signed_data(topic), &signature)
            .map_err(|_| {
                ChannelError::InvalidEnvelope(
                    "signature does not match the claimed author".to_string(),
                )
            })?;

        let author = PublicKey::from_bytes(&self.author)
            .map_err(|e| ChannelError::InvalidEnvelope(format!("bad author key: {}", e)))?;
        Ok((author, Bytes::from(self.payload)))
    }

    /// The data that is signed: context || version || topic || author || nonce || payload.
    ///
    /// Variable-length fields are length-prefixed (4 bytes, little-endian).
    fn signed_data(&self, topic: &str) -> Vec<u8> {
        let mut data = Vec::with_capacity(
            SIGNING_CONTEXT.len() + 1 + 4 + topic.len() + 32 + 16 + 4 + self.payload.len(),
        );
        data.extend_from_slice(SIGNING_CONTEXT);
        data.push(self.version);

        data.extend_from_slice(&(topic.len() as u32).to_le_bytes());
        data.extend_from_slice(topic.as_bytes());

        data.extend_from_slice(&self.author);
        data.extend_from_slice(&self.nonce);

        data.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.payload);
        data
    }

    /// Encode the envelope for broadcast.
    pub fn to_bytes(&self) -> ChannelResult<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| ChannelError::InvalidEnvelope(format!("Failed to encode envelope: {}", e)))
    }

    /// Decode an envelope received from the wire.
    pub fn from_bytes(bytes: &[u8]) -> ChannelResult<Self> {
        postcard::from_bytes(bytes)
            .map_err(|e| ChannelError::InvalidEnvelope(format!("Failed to decode envelope: {}", e)))
    }
}
