//! Integration tests for packets travelling over an in-memory network
//!
//! 1. Two-party acknowledgement of a held ticket
//! 2. Five node delivery with every relay acknowledged
//! 3. Tampered, truncated and misrouted packets are dropped without an ack

use std::sync::Arc;
use std::time::Duration;

use mixcraft_core::{FixedBytes, PendingAcknowledgement, UnacknowledgedTicket};
use mixcraft_crypto::{
    create_por_values_for_sender, derive_ack_key_share, derive_shared_secret, half_key_challenge,
    EncryptionKeypair, Identity, SharedSecret,
};
use mixcraft_network::{InboundMessage, MemoryNetwork, Transport, ACK_PROTOCOL};
use mixcraft_node::Node;
use mixcraft_packet::{
    Acknowledgement, AcknowledgementEvent, AcknowledgementInteraction, ForwardOutcome,
    MemoryTicketStore, Packet, PacketError, TicketIssuer, TicketStore,
};
use mixcraft_settings::Settings;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

// =============================================================================
// HELPERS
// =============================================================================

fn started_node(network: &MemoryNetwork) -> Node {
    let identity = Identity::generate();
    let transport = Arc::new(network.register(identity.public_key()));
    let node = Node::new(identity, transport, &Settings::default());
    node.start().unwrap();
    node
}

fn random_secret() -> SharedSecret {
    let a = EncryptionKeypair::generate();
    let b = EncryptionKeypair::generate();
    derive_shared_secret(&a.secret_key_bytes(), &b.public_key_bytes())
}

async fn recv<T>(rx: &mut mpsc::Receiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<InboundMessage>) {
    assert!(timeout(QUIET, rx.recv()).await.is_err(), "unexpected message");
}

/// A packet from a stand-alone sender for `path`, plus the sender's key and
/// an acknowledgement inbox for it
async fn raw_packet(
    network: &MemoryNetwork,
    message: &[u8],
    path: &[mixcraft_core::PathHop],
) -> (Packet, mixcraft_core::PublicKey, mpsc::UnboundedReceiver<InboundMessage>) {
    let sender = Identity::generate();
    let transport = network.register(sender.public_key());
    let acks = transport.subscribe(ACK_PROTOCOL);
    let packet = Packet::create(
        message,
        path,
        &sender,
        &TicketIssuer::default(),
        &MemoryTicketStore::new(),
    )
    .await
    .unwrap();
    (packet, sender.public_key(), acks)
}

// =============================================================================
// 1. Two-party acknowledgement
// =============================================================================

#[tokio::test]
async fn test_two_party_acknowledgement_resolves_once() {
    mixcraft_logging::init_test_logging();
    let network = MemoryNetwork::new();

    let relay = Identity::generate();
    let counterparty = Identity::generate();
    let relay_transport = Arc::new(network.register(relay.public_key()));
    let counterparty_transport = network.register(counterparty.public_key());

    let store = Arc::new(MemoryTicketStore::new());
    let (events_tx, mut events) = mpsc::channel(16);
    let interaction = Arc::new(AcknowledgementInteraction::new(
        store.clone(),
        relay_transport,
        events_tx,
    ));
    let _handle = interaction.subscribe();

    // The relay holds a ticket paid by some previous hop, answerable by the
    // counterparty's ack share
    let own_secret = random_secret();
    let next_secret = random_secret();
    let por = create_por_values_for_sender(&own_secret, Some(&next_secret));
    let payer = Identity::generate();
    let ticket =
        TicketIssuer::default().issue(&payer.signing, relay.address(), por.ticket_challenge);

    let ack_key = derive_ack_key_share(&next_secret);
    let challenge = half_key_challenge(&ack_key).unwrap();
    store
        .store_unacknowledged_ticket(
            challenge,
            PendingAcknowledgement::WaitingAsRelayer(UnacknowledgedTicket::new(
                ticket.clone(),
                por.own_key,
                payer.public_key(),
            )),
        )
        .await
        .unwrap();

    let ack = Acknowledgement::new(ack_key).to_bytes();
    for _ in 0..2 {
        counterparty_transport
            .send(&relay.public_key(), ACK_PROTOCOL, ack.clone())
            .await
            .unwrap();
    }

    match recv(&mut events).await {
        AcknowledgementEvent::TicketAcknowledged { challenge: c, ticket: acked } => {
            assert_eq!(c, challenge);
            assert_eq!(acked.ticket, ticket);
            assert_eq!(acked.signer, payer.public_key());
            assert_eq!(
                half_key_challenge(&acked.response).unwrap().as_slice(),
                ticket.challenge.as_slice()
            );
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(timeout(QUIET, events.recv()).await.is_err());

    assert_eq!(store.acknowledged_count(), 1);
    assert_eq!(store.pending_count(), 0);

    // Handing the ticket over for redemption releases it
    assert_eq!(store.take_acknowledged_tickets().await.unwrap().len(), 1);
    assert_eq!(store.acknowledged_count(), 0);
}

// =============================================================================
// 2. Five node delivery
// =============================================================================

#[tokio::test]
async fn test_five_node_delivery() {
    mixcraft_logging::init_test_logging();
    let network = MemoryNetwork::new();

    let sender = started_node(&network);
    let relays: Vec<Node> = (0..3).map(|_| started_node(&network)).collect();
    let receiver = started_node(&network);

    let mut incoming = receiver.take_incoming().unwrap();
    let mut sender_events = sender.take_acknowledgement_events().unwrap();
    let mut relay_events: Vec<_> = relays
        .iter()
        .map(|r| r.take_acknowledgement_events().unwrap())
        .collect();

    let mut path: Vec<_> = relays.iter().map(|r| r.path_hop()).collect();
    path.push(receiver.path_hop());

    sender.send_message(b"testMsg", &path).await.unwrap();

    assert_eq!(recv(&mut incoming).await.payload, b"testMsg");
    assert!(matches!(
        recv(&mut sender_events).await,
        AcknowledgementEvent::DeliveredToFirstHop { .. }
    ));

    for (relay, events) in relays.iter().zip(relay_events.iter_mut()) {
        match recv(events).await {
            AcknowledgementEvent::TicketAcknowledged { ticket, .. } => {
                assert_eq!(ticket.ticket.counterparty, relay.path_hop().public_key.to_address());
                assert!(ticket.is_winning());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(relay.acknowledged_tickets().await.unwrap().len(), 1);
        assert_eq!(relay.ticket_summaries().await.unwrap().len(), 1);
    }

    // Senders and receivers hold no tickets
    assert!(sender.acknowledged_tickets().await.unwrap().is_empty());
    assert!(receiver.acknowledged_tickets().await.unwrap().is_empty());

    for node in relays.iter().chain([&sender, &receiver]) {
        node.stop().await;
    }
}

#[tokio::test]
async fn test_consecutive_messages_each_delivered() {
    let network = MemoryNetwork::new();
    let sender = started_node(&network);
    let relay = started_node(&network);
    let receiver = started_node(&network);
    let mut incoming = receiver.take_incoming().unwrap();

    let path = [relay.path_hop(), receiver.path_hop()];
    for i in 0..5u8 {
        sender.send_message(&[i; 10], &path).await.unwrap();
    }

    let mut received: Vec<Vec<u8>> = Vec::new();
    for _ in 0..5 {
        received.push(recv(&mut incoming).await.payload);
    }
    received.sort();
    assert_eq!(received, (0..5u8).map(|i| vec![i; 10]).collect::<Vec<_>>());
}

// =============================================================================
// 3. Rejected packets
// =============================================================================

#[tokio::test]
async fn test_tampered_packet_dropped_without_ack() {
    let network = MemoryNetwork::new();
    let relay = started_node(&network);
    let receiver = started_node(&network);

    let (packet, sender, mut acks) =
        raw_packet(&network, b"tamper", &[relay.path_hop(), receiver.path_hop()]).await;

    let mut bytes = packet.to_bytes();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;

    let outcome = relay.handle_packet(&sender, &bytes).await;
    assert!(matches!(outcome, ForwardOutcome::Dropped(PacketError::DecryptionFailed)));
    assert_silent(&mut acks).await;
}

#[tokio::test]
async fn test_truncated_packet_dropped_without_ack() {
    let network = MemoryNetwork::new();
    let relay = started_node(&network);

    let (packet, sender, mut acks) = raw_packet(&network, b"short", &[relay.path_hop()]).await;
    let bytes = packet.to_bytes();

    let outcome = relay.handle_packet(&sender, &bytes[..Packet::HEADER_SIZE - 1]).await;
    assert!(matches!(outcome, ForwardOutcome::Dropped(PacketError::MalformedPacket(_))));
    assert_silent(&mut acks).await;
}

#[tokio::test]
async fn test_misrouted_packet_dropped_without_ack() {
    let network = MemoryNetwork::new();
    let intended = started_node(&network);
    let stranger = started_node(&network);

    let (packet, sender, mut acks) = raw_packet(&network, b"lost", &[intended.path_hop()]).await;

    let outcome = stranger.handle_packet(&sender, &packet.to_bytes()).await;
    assert!(matches!(outcome, ForwardOutcome::Dropped(PacketError::DecryptionFailed)));
    assert_silent(&mut acks).await;
}

#[tokio::test]
async fn test_replayed_by_wrong_previous_hop() {
    let network = MemoryNetwork::new();
    let relay = started_node(&network);

    let (packet, _sender, _acks) = raw_packet(&network, b"who", &[relay.path_hop()]).await;
    let impostor = Identity::generate();
    let mut impostor_acks = network.register(impostor.public_key()).subscribe(ACK_PROTOCOL);

    let outcome = relay
        .handle_packet(&impostor.public_key(), &packet.to_bytes())
        .await;
    assert!(matches!(outcome, ForwardOutcome::Dropped(PacketError::InvalidTicket(_))));
    assert_silent(&mut impostor_acks).await;
}

#[tokio::test]
async fn test_oversized_message_rejected() {
    let network = MemoryNetwork::new();
    let sender = started_node(&network);
    let receiver = started_node(&network);

    let err = sender
        .send_message(&[0u8; 501], &[receiver.path_hop()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exceeds"));
}
