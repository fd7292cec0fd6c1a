//! Sender filtering
//!
//! A channel topic is not secret: anyone who can compute or observe it may
//! subscribe and publish. The gate is what restricts a channel to its one
//! counterpart. Messages from anyone else are dropped without a trace in the
//! consumer-visible stream.

use crate::peer::PeerId;
use crate::transport::InboundMessage;

/// Accepts only messages whose declared sender is the expected counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageGate {
    expected: PeerId,
}

impl MessageGate {
    /// Create a gate for `expected`
    pub fn new(expected: PeerId) -> Self {
        Self { expected }
    }

    /// The only sender this gate lets through
    pub fn expected_sender(&self) -> &PeerId {
        &self.expected
    }

    /// Whether `message` came from the expected sender.
    pub fn accept(&self, message: &InboundMessage) -> bool {
        accept(message, &self.expected)
    }
}

/// Whether `message` was sent by `expected_sender`.
///
/// Both sides are compared in canonical form, so an iroh key and its string
/// rendering match.
pub fn accept(message: &InboundMessage, expected_sender: &PeerId) -> bool {
    message.from == *expected_sender
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "/direct-channel-v1/QmAlice/QmBob";

    #[test]
    fn test_accepts_expected_sender() {
        let gate = MessageGate::new(PeerId::new("QmBob"));
        let msg = InboundMessage::new("QmBob", &b"hi"[..], TOPIC);
        assert!(gate.accept(&msg));
    }

    #[test]
    fn test_rejects_third_party() {
        let gate = MessageGate::new(PeerId::new("QmBob"));
        let msg = InboundMessage::new("QmMallory", &b"hi"[..], TOPIC);
        assert!(!gate.accept(&msg));
    }

    #[test]
    fn test_rejects_own_echo() {
        // The substrate may echo our own publications back to us
        let gate = MessageGate::new(PeerId::new("QmBob"));
        let msg = InboundMessage::new("QmAlice", &b"hi"[..], TOPIC);
        assert!(!gate.accept(&msg));
    }

    #[test]
    fn test_normalized_comparison() {
        let gate = MessageGate::new(PeerId::new("QmBob"));
        let msg = InboundMessage::new(String::from(" QmBob "), &b"hi"[..], TOPIC);
        assert!(gate.accept(&msg));
    }

    #[test]
    fn test_case_sensitive() {
        let gate = MessageGate::new(PeerId::new("QmBob"));
        let msg = InboundMessage::new("qmbob", &b"hi"[..], TOPIC);
        assert!(!gate.accept(&msg));
    }
}
