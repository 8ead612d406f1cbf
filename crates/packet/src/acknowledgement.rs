//! Acknowledgement handling
//!
//! A hop that accepted a packet sends its ack key share back to the previous
//! hop. The previous hop either learns its packet was picked up (when it was
//! the sender) or completes the response that makes its held ticket
//! redeemable (when it relayed).

use std::sync::Arc;

use mixcraft_core::{AcknowledgedTicket, FixedBytes, HalfKeyChallenge, PendingAcknowledgement, PublicKey};
use mixcraft_crypto::validate_acknowledgement;
use mixcraft_network::{Transport, TransportError, ACK_PROTOCOL};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::messages::Acknowledgement;
use crate::packet::DecodedPacket;
use crate::store::TicketStore;

/// Send our ack key share for `packet` back to `destination`
pub async fn send_acknowledgement(
    packet: &DecodedPacket,
    transport: &dyn Transport,
    destination: &PublicKey,
) -> Result<(), TransportError> {
    transport
        .send(destination, ACK_PROTOCOL, packet.acknowledgement().to_bytes())
        .await
}

/// Emitted once per resolved pending record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcknowledgementEvent {
    /// The first hop accepted a packet we sent
    DeliveredToFirstHop { challenge: HalfKeyChallenge },
    /// A ticket we hold as a relay became redeemable
    TicketAcknowledged {
        challenge: HalfKeyChallenge,
        ticket: AcknowledgedTicket,
    },
}

pub struct AcknowledgementInteraction {
    store: Arc<dyn TicketStore>,
    transport: Arc<dyn Transport>,
    on_resolved: mpsc::Sender<AcknowledgementEvent>,
}

impl AcknowledgementInteraction {
    pub fn new(
        store: Arc<dyn TicketStore>,
        transport: Arc<dyn Transport>,
        on_resolved: mpsc::Sender<AcknowledgementEvent>,
    ) -> Self {
        Self {
            store,
            transport,
            on_resolved,
        }
    }

    /// Resolve the pending record an inbound acknowledgement answers.
    ///
    /// Unknown, malformed and mismatching acknowledgements are ignored. A
    /// mismatching one leaves the record pending.
    pub async fn handle_acknowledgement(
        &self,
        sender: &PublicKey,
        bytes: &[u8],
    ) -> Option<AcknowledgementEvent> {
        let ack = match Acknowledgement::from_bytes(bytes) {
            Ok(ack) => ack,
            Err(e) => {
                debug!("Malformed acknowledgement from {}: {}", sender.short_hex(), e);
                return None;
            }
        };
        let challenge = match ack.challenge() {
            Ok(challenge) => challenge,
            Err(e) => {
                debug!("Invalid ack key from {}: {}", sender.short_hex(), e);
                return None;
            }
        };

        let pending = match self.store.get_unacknowledged_ticket(&challenge).await {
            Ok(Some(pending)) => pending,
            Ok(None) => {
                debug!(
                    "No pending record for acknowledgement {} from {}",
                    challenge.short_hex(),
                    sender.short_hex()
                );
                return None;
            }
            Err(e) => {
                warn!("Ticket store lookup failed: {}", e);
                return None;
            }
        };

        let event = match pending {
            PendingAcknowledgement::WaitingAsSender => {
                match self.store.mark_resolved(&challenge, None).await {
                    Ok(true) => AcknowledgementEvent::DeliveredToFirstHop { challenge },
                    Ok(false) => return None,
                    Err(e) => {
                        warn!("Failed to resolve {}: {}", challenge.short_hex(), e);
                        return None;
                    }
                }
            }
            PendingAcknowledgement::WaitingAsRelayer(unacknowledged) => {
                let response = match validate_acknowledgement(
                    &unacknowledged.own_key,
                    &ack.ack_key,
                    &unacknowledged.ticket.challenge,
                ) {
                    Ok(response) => response,
                    Err(e) => {
                        debug!(
                            "Acknowledgement {} from {} does not complete ticket: {}",
                            challenge.short_hex(),
                            sender.short_hex(),
                            e
                        );
                        return None;
                    }
                };

                let ticket = AcknowledgedTicket::new(
                    unacknowledged.ticket,
                    response,
                    unacknowledged.signer,
                );
                match self.store.mark_resolved(&challenge, Some(ticket.clone())).await {
                    Ok(true) => AcknowledgementEvent::TicketAcknowledged { challenge, ticket },
                    Ok(false) => return None,
                    Err(e) => {
                        warn!("Failed to resolve {}: {}", challenge.short_hex(), e);
                        return None;
                    }
                }
            }
        };

        debug!("Resolved acknowledgement {}", challenge.short_hex());
        // The store already holds the outcome; the event is a notification
        match self.on_resolved.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Acknowledgement event channel full, dropping event for {}",
                    challenge.short_hex()
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Acknowledgement event channel closed");
            }
        }
        Some(event)
    }

    /// Handle acknowledgements from the transport until it closes
    pub fn subscribe(self: Arc<Self>) -> JoinHandle<()> {
        let mut inbound = self.transport.subscribe(ACK_PROTOCOL);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let interaction = self.clone();
                tokio::spawn(async move {
                    interaction
                        .handle_acknowledgement(&message.sender, &message.payload)
                        .await;
                });
            }
        })
    }
}
