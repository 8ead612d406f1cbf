//! Packet relaying
//!
//! Every inbound packet is decoded, its ticket kept until the next hop
//! acknowledges, then forwarded (or delivered locally) and acknowledged to
//! the hop it came from.

use std::sync::Arc;

use mixcraft_core::{FixedBytes, PathHop, PublicKey};
use mixcraft_crypto::Identity;
use mixcraft_network::{Transport, TransportError, PACKET_PROTOCOL};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::acknowledgement::send_acknowledgement;
use crate::error::{PacketError, Result};
use crate::packet::{Packet, TicketIssuer};
use crate::store::TicketStore;

/// A message that reached us as the final hop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub payload: Vec<u8>,
}

/// What became of one inbound packet
#[derive(Debug)]
pub enum ForwardOutcome {
    /// We were the receiver
    Delivered,
    Forwarded { next_hop: PublicKey },
    /// Rejected before any state changed; no acknowledgement was sent
    Dropped(PacketError),
    /// The next hop could not be reached. Our ticket stays pending and the
    /// previous hop was still acknowledged.
    ForwardFailed(TransportError),
}

pub struct PacketForwardInteraction {
    identity: Arc<Identity>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TicketStore>,
    issuer: Arc<TicketIssuer>,
    delivered_tx: mpsc::Sender<DeliveredMessage>,
}

impl PacketForwardInteraction {
    pub fn new(
        identity: Arc<Identity>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TicketStore>,
        issuer: Arc<TicketIssuer>,
        delivered_tx: mpsc::Sender<DeliveredMessage>,
    ) -> Self {
        Self {
            identity,
            transport,
            store,
            issuer,
            delivered_tx,
        }
    }

    /// Hand a packet to `counterparty`
    pub async fn interact(&self, counterparty: &PublicKey, packet: &Packet) -> Result<()> {
        self.transport
            .send(counterparty, PACKET_PROTOCOL, packet.to_bytes())
            .await?;
        Ok(())
    }

    /// Send `message` along `path`; the last hop is the receiver
    pub async fn send_message(&self, message: &[u8], path: &[PathHop]) -> Result<()> {
        let first_hop = path.first().ok_or(PacketError::EmptyPath)?.public_key;
        let packet =
            Packet::create(message, path, &self.identity, &self.issuer, self.store.as_ref())
                .await?;

        if let Err(e) = self.interact(&first_hop, &packet).await {
            // No acknowledgement can come for a packet that never left
            if let Err(store_err) = self
                .store
                .mark_resolved(&packet.challenge.challenge, None)
                .await
            {
                warn!("Failed to clear pending record after send failure: {}", store_err);
            }
            return Err(e);
        }
        info!(
            "Sent {} byte message via {} hop(s), first hop {}",
            message.len(),
            path.len(),
            first_hop.short_hex()
        );
        Ok(())
    }

    /// Process one packet received from `sender`
    pub async fn handle_packet(&self, sender: &PublicKey, bytes: &[u8]) -> ForwardOutcome {
        let decoded = match Packet::from_bytes(bytes)
            .and_then(|packet| packet.decode(&self.identity, sender))
        {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!("Dropping packet from {}: {}", sender.short_hex(), e);
                return ForwardOutcome::Dropped(e);
            }
        };

        if let Err(e) = decoded.store_unacknowledged_ticket(self.store.as_ref()).await {
            warn!("Dropping packet from {}, ticket not stored: {}", sender.short_hex(), e);
            return ForwardOutcome::Dropped(e);
        }

        let outcome = match decoded.next_packet(&self.identity, &self.issuer) {
            Some((next_hop, packet)) => match self.interact(&next_hop, &packet).await {
                Ok(()) => {
                    debug!("Forwarded packet to {}", next_hop.short_hex());
                    ForwardOutcome::Forwarded { next_hop }
                }
                Err(PacketError::Transport(e)) => {
                    warn!("Failed to forward packet to {}: {}", next_hop.short_hex(), e);
                    ForwardOutcome::ForwardFailed(e)
                }
                Err(e) => ForwardOutcome::Dropped(e),
            },
            None => {
                debug!("Received {} byte message", decoded.payload.len());
                let message = DeliveredMessage {
                    payload: decoded.payload.clone(),
                };
                match self.delivered_tx.try_send(message) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("Incoming message channel full, dropping message");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!("Incoming message channel closed");
                    }
                }
                ForwardOutcome::Delivered
            }
        };

        if let Err(e) = send_acknowledgement(&decoded, self.transport.as_ref(), sender).await {
            debug!("Failed to acknowledge packet to {}: {}", sender.short_hex(), e);
        }

        outcome
    }

    /// Handle packets from the transport until it closes
    pub fn subscribe(self: Arc<Self>) -> JoinHandle<()> {
        let mut inbound = self.transport.subscribe(PACKET_PROTOCOL);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let interaction = self.clone();
                tokio::spawn(async move {
                    interaction
                        .handle_packet(&message.sender, &message.payload)
                        .await;
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Acknowledgement;
    use crate::store::MemoryTicketStore;
    use mixcraft_core::PendingAcknowledgement;
    use mixcraft_network::{MemoryNetwork, ACK_PROTOCOL};

    struct TestNode {
        identity: Arc<Identity>,
        interaction: PacketForwardInteraction,
        store: Arc<MemoryTicketStore>,
        delivered: mpsc::Receiver<DeliveredMessage>,
    }

    fn node(network: &MemoryNetwork) -> TestNode {
        let identity = Arc::new(Identity::generate());
        let transport = Arc::new(network.register(identity.public_key()));
        let store = Arc::new(MemoryTicketStore::new());
        let (tx, delivered) = mpsc::channel(16);
        TestNode {
            interaction: PacketForwardInteraction::new(
                identity.clone(),
                transport,
                store.clone(),
                Arc::new(TicketIssuer::default()),
                tx,
            ),
            identity,
            store,
            delivered,
        }
    }

    #[tokio::test]
    async fn test_receiver_delivers_and_acknowledges() {
        let network = MemoryNetwork::new();
        let sender = node(&network);
        let mut receiver = node(&network);

        let sender_transport = network.register(sender.identity.public_key());
        let mut packets = network
            .register(receiver.identity.public_key())
            .subscribe(PACKET_PROTOCOL);
        let mut acks = sender_transport.subscribe(ACK_PROTOCOL);

        sender
            .interaction
            .send_message(b"hello", &[receiver.identity.path_hop()])
            .await
            .unwrap();
        let inbound = packets.recv().await.unwrap();

        let outcome = receiver
            .interaction
            .handle_packet(&inbound.sender, &inbound.payload)
            .await;
        assert!(matches!(outcome, ForwardOutcome::Delivered));
        assert_eq!(receiver.delivered.recv().await.unwrap().payload, b"hello");

        // The final hop keeps no ticket but still acknowledges
        assert_eq!(receiver.store.pending_count(), 0);
        let ack = Acknowledgement::from_bytes(&acks.recv().await.unwrap().payload).unwrap();
        let pending = sender
            .store
            .get_unacknowledged_ticket(&ack.challenge().unwrap())
            .await
            .unwrap();
        assert_eq!(pending, Some(PendingAcknowledgement::WaitingAsSender));
    }

    #[tokio::test]
    async fn test_relay_stores_ticket_before_forwarding() {
        let network = MemoryNetwork::new();
        let sender = node(&network);
        let relay = node(&network);
        let receiver = node(&network);

        let mut relay_packets = network.register(relay.identity.public_key()).subscribe(PACKET_PROTOCOL);
        let mut receiver_packets = network
            .register(receiver.identity.public_key())
            .subscribe(PACKET_PROTOCOL);
        let _sender_acks = network
            .register(sender.identity.public_key())
            .subscribe(ACK_PROTOCOL);

        let path = [relay.identity.path_hop(), receiver.identity.path_hop()];
        sender.interaction.send_message(b"relay me", &path).await.unwrap();

        let inbound = relay_packets.recv().await.unwrap();
        let outcome = relay
            .interaction
            .handle_packet(&inbound.sender, &inbound.payload)
            .await;
        match outcome {
            ForwardOutcome::Forwarded { next_hop } => {
                assert_eq!(next_hop, receiver.identity.public_key())
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(relay.store.pending_count(), 1);
        assert!(receiver_packets.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_forward_failure_still_acknowledges() {
        let network = MemoryNetwork::new();
        let sender = node(&network);
        let relay = node(&network);
        let receiver = node(&network);

        let mut relay_packets = network.register(relay.identity.public_key()).subscribe(PACKET_PROTOCOL);
        let mut sender_acks = network
            .register(sender.identity.public_key())
            .subscribe(ACK_PROTOCOL);
        network.set_online(&receiver.identity.public_key(), false);

        let path = [relay.identity.path_hop(), receiver.identity.path_hop()];
        sender.interaction.send_message(b"lost", &path).await.unwrap();

        let inbound = relay_packets.recv().await.unwrap();
        let outcome = relay
            .interaction
            .handle_packet(&inbound.sender, &inbound.payload)
            .await;
        assert!(matches!(outcome, ForwardOutcome::ForwardFailed(TransportError::Unreachable(_))));
        assert_eq!(relay.store.pending_count(), 1);
        assert!(sender_acks.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_garbage_dropped_without_ack() {
        let network = MemoryNetwork::new();
        let relay = node(&network);
        let peer = Identity::generate();
        let mut peer_acks = network.register(peer.public_key()).subscribe(ACK_PROTOCOL);

        let outcome = relay
            .interaction
            .handle_packet(&peer.public_key(), &[0u8; 600])
            .await;
        assert!(matches!(outcome, ForwardOutcome::Dropped(_)));
        assert!(peer_acks.try_recv().is_err());
        assert_eq!(relay.store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_send_message_empty_path() {
        let network = MemoryNetwork::new();
        let sender = node(&network);
        let err = sender.interaction.send_message(b"x", &[]).await.unwrap_err();
        assert!(matches!(err, PacketError::EmptyPath));
    }

    #[tokio::test]
    async fn test_failed_send_leaves_nothing_pending() {
        let network = MemoryNetwork::new();
        let sender = node(&network);
        let receiver = node(&network);
        network.set_online(&receiver.identity.public_key(), false);

        let err = sender
            .interaction
            .send_message(b"unsent", &[receiver.identity.path_hop()])
            .await
            .unwrap_err();
        assert!(matches!(err, PacketError::Transport(TransportError::Unreachable(_))));
        assert_eq!(sender.store.pending_count(), 0);
    }
}
