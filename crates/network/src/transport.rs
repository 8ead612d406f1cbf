//! Transport boundary
//!
//! Connection handling lives outside this workspace; everything above the
//! transport only needs addressed, protocol-tagged messages and connection
//! events.

use async_trait::async_trait;
use mixcraft_core::PublicKey;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Protocol for onion packets
pub const PACKET_PROTOCOL: &str = "/mixcraft/packet/1.0.0";

/// Protocol for acknowledgements travelling back one hop
pub const ACK_PROTOCOL: &str = "/mixcraft/ack/1.0.0";

/// Protocol for heartbeat probes
pub const HEARTBEAT_PROTOCOL: &str = "/mixcraft/heartbeat/1.0.0";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Peer {0} is unreachable")]
    Unreachable(String),

    #[error("Peer {peer} does not handle {protocol}")]
    UnsupportedProtocol { peer: String, protocol: String },

    #[error("Peer {0} dropped the request without responding")]
    NoResponse(String),
}

/// A message delivered to a protocol subscriber
#[derive(Debug)]
pub struct InboundMessage {
    pub sender: PublicKey,
    pub payload: Vec<u8>,
    /// Present when the sender used `request` and awaits a response
    pub reply: Option<oneshot::Sender<Vec<u8>>>,
}

impl InboundMessage {
    /// Answer a request. Returns false for one-way messages or when the
    /// requester has given up.
    pub fn respond(self, response: Vec<u8>) -> bool {
        match self.reply {
            Some(reply) => reply.send(response).is_ok(),
            None => false,
        }
    }
}

/// Connection lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(PublicKey),
    Disconnected(PublicKey),
}

/// Message transport between nodes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity of the local node on this transport
    fn local_peer(&self) -> PublicKey;

    /// One-way delivery
    async fn send(
        &self,
        dest: &PublicKey,
        protocol: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Request/response delivery
    async fn request(
        &self,
        dest: &PublicKey,
        protocol: &str,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError>;

    /// Receive every inbound message for `protocol`. A later subscription to
    /// the same protocol replaces the earlier one.
    fn subscribe(&self, protocol: &str) -> mpsc::UnboundedReceiver<InboundMessage>;

    /// Receive connection events
    fn peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent>;

    /// Close the connection to a peer
    async fn hang_up(&self, peer: &PublicKey);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_respond_to_request() {
        let (tx, mut rx) = oneshot::channel();
        let msg = InboundMessage {
            sender: PublicKey::new([1u8; 32]),
            payload: vec![1, 2, 3],
            reply: Some(tx),
        };

        assert!(msg.respond(vec![4, 5]));
        assert_eq!(rx.try_recv().unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_respond_to_one_way_message() {
        let msg = InboundMessage {
            sender: PublicKey::new([1u8; 32]),
            payload: vec![],
            reply: None,
        };
        assert!(!msg.respond(vec![1]));
    }

    #[test]
    fn test_protocol_ids_distinct() {
        assert_ne!(PACKET_PROTOCOL, ACK_PROTOCOL);
        assert_ne!(ACK_PROTOCOL, HEARTBEAT_PROTOCOL);
        assert!(PACKET_PROTOCOL.starts_with("/mixcraft/"));
    }
}
