//! In-process transport hub
//!
//! Every `MemoryTransport` registered on the same `MemoryNetwork` can reach
//! every other one that is online. Used by tests and local simulation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mixcraft_core::{FixedBytes, PublicKey};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::transport::{InboundMessage, PeerEvent, Transport, TransportError};

#[derive(Default)]
struct NodeState {
    online: bool,
    handlers: HashMap<String, mpsc::UnboundedSender<InboundMessage>>,
    event_subscribers: Vec<mpsc::UnboundedSender<PeerEvent>>,
}

impl NodeState {
    fn emit(&mut self, event: PeerEvent) {
        self.event_subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<PublicKey, NodeState>,
}

/// Shared hub the in-memory transports talk through
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and return its transport. The node starts online.
    pub fn register(&self, peer: PublicKey) -> MemoryTransport {
        let mut state = self.state.lock();
        state.nodes.entry(peer).or_default().online = true;
        MemoryTransport {
            local: peer,
            network: self.clone(),
        }
    }

    /// Take a node off the network or bring it back
    pub fn set_online(&self, peer: &PublicKey, online: bool) {
        if let Some(node) = self.state.lock().nodes.get_mut(peer) {
            node.online = online;
        }
    }

    /// Announce a connection between two registered nodes to both sides
    pub fn connect(&self, a: &PublicKey, b: &PublicKey) {
        let mut state = self.state.lock();
        if let Some(node) = state.nodes.get_mut(a) {
            node.emit(PeerEvent::Connected(*b));
        }
        if let Some(node) = state.nodes.get_mut(b) {
            node.emit(PeerEvent::Connected(*a));
        }
    }

    fn disconnect(&self, a: &PublicKey, b: &PublicKey) {
        let mut state = self.state.lock();
        if let Some(node) = state.nodes.get_mut(a) {
            node.emit(PeerEvent::Disconnected(*b));
        }
        if let Some(node) = state.nodes.get_mut(b) {
            node.emit(PeerEvent::Disconnected(*a));
        }
    }

    fn route(
        &self,
        from: &PublicKey,
        dest: &PublicKey,
        protocol: &str,
    ) -> Result<mpsc::UnboundedSender<InboundMessage>, TransportError> {
        let state = self.state.lock();

        let sender_online = state.nodes.get(from).map(|n| n.online).unwrap_or(false);
        let node = state
            .nodes
            .get(dest)
            .filter(|n| n.online && sender_online)
            .ok_or_else(|| TransportError::Unreachable(dest.short_hex()))?;

        node.handlers
            .get(protocol)
            .filter(|tx| !tx.is_closed())
            .cloned()
            .ok_or_else(|| TransportError::UnsupportedProtocol {
                peer: dest.short_hex(),
                protocol: protocol.to_string(),
            })
    }
}

/// One node's view of a `MemoryNetwork`
#[derive(Clone)]
pub struct MemoryTransport {
    local: PublicKey,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_peer(&self) -> PublicKey {
        self.local
    }

    async fn send(
        &self,
        dest: &PublicKey,
        protocol: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let handler = self.network.route(&self.local, dest, protocol)?;
        let message = InboundMessage {
            sender: self.local,
            payload,
            reply: None,
        };

        handler
            .send(message)
            .map_err(|_| TransportError::Unreachable(dest.short_hex()))
    }

    async fn request(
        &self,
        dest: &PublicKey,
        protocol: &str,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        let handler = self.network.route(&self.local, dest, protocol)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = InboundMessage {
            sender: self.local,
            payload,
            reply: Some(reply_tx),
        };

        handler
            .send(message)
            .map_err(|_| TransportError::Unreachable(dest.short_hex()))?;

        reply_rx
            .await
            .map_err(|_| TransportError::NoResponse(dest.short_hex()))
    }

    fn subscribe(&self, protocol: &str) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.network.state.lock();
        state
            .nodes
            .entry(self.local)
            .or_default()
            .handlers
            .insert(protocol.to_string(), tx);
        rx
    }

    fn peer_events(&self) -> mpsc::UnboundedReceiver<PeerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.network.state.lock();
        state
            .nodes
            .entry(self.local)
            .or_default()
            .event_subscribers
            .push(tx);
        rx
    }

    async fn hang_up(&self, peer: &PublicKey) {
        debug!("Hanging up on {}", peer.short_hex());
        self.network.disconnect(&self.local, peer);
    }
}
