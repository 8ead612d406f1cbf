//! Onion packets and the per-hop view of them
//!
//! Wire layout: alpha(32) || AcknowledgementChallenge(96) || Ticket(276) || onion

use std::sync::atomic::{AtomicU64, Ordering};

use mixcraft_core::{
    Address, Challenge, FixedBytes, HalfKey, NextHop, PathHop, PendingAcknowledgement,
    PorString, PublicKey, Ticket, UnacknowledgedTicket, U256,
};
use mixcraft_crypto::{
    build_onion, create_por_values_for_sender, derive_own_key_share, peel_onion_layer,
    sign_ticket, validate_ack_challenge, validate_por_hint, validate_public_key, verify_ticket,
    Identity, SigningKeypair,
};

use crate::error::{PacketError, Result};
use crate::messages::{Acknowledgement, AcknowledgementChallenge};
use crate::store::TicketStore;

/// Largest message payload a packet carries
pub const MAX_MESSAGE_SIZE: usize = 500;

const ALPHA_SIZE: usize = 32;

/// Terms of the tickets a node issues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketConfig {
    pub amount: U256,
    pub win_prob: U256,
    pub epoch: U256,
    pub channel_iteration: U256,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            amount: U256::one(),
            win_prob: Ticket::win_prob_from_inverse(1),
            epoch: U256::one(),
            channel_iteration: U256::one(),
        }
    }
}

/// Issues signed tickets with increasing indices
#[derive(Debug, Default)]
pub struct TicketIssuer {
    config: TicketConfig,
    next_index: AtomicU64,
}

impl TicketIssuer {
    pub fn new(config: TicketConfig) -> Self {
        Self {
            config,
            next_index: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TicketConfig {
        &self.config
    }

    pub fn issue(
        &self,
        keypair: &SigningKeypair,
        counterparty: Address,
        challenge: Challenge,
    ) -> Ticket {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let ticket = Ticket::new(
            counterparty,
            challenge,
            self.config.epoch,
            U256::from(index),
            self.config.amount,
            self.config.win_prob,
            self.config.channel_iteration,
        );
        sign_ticket(keypair, ticket)
    }
}

/// A packet as it travels between two hops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Ephemeral X25519 key for the receiving hop
    pub alpha: [u8; 32],
    /// Signed by the sending hop
    pub challenge: AcknowledgementChallenge,
    /// Pays the receiving hop, signed by the sending hop
    pub ticket: Ticket,
    pub onion: Vec<u8>,
}

impl Packet {
    pub const HEADER_SIZE: usize = ALPHA_SIZE + AcknowledgementChallenge::SIZE + Ticket::SIZE;

    /// Build a packet carrying `message` along `path`, whose last hop is the
    /// receiver.
    ///
    /// Records that the sender waits for the first hop's acknowledgement.
    pub async fn create(
        message: &[u8],
        path: &[PathHop],
        identity: &Identity,
        issuer: &TicketIssuer,
        store: &dyn TicketStore,
    ) -> Result<Self> {
        if message.len() > MAX_MESSAGE_SIZE {
            return Err(PacketError::MessageTooLarge {
                size: message.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let first_hop = path.first().ok_or(PacketError::EmptyPath)?;
        for hop in path {
            validate_public_key(&hop.public_key).map_err(|e| {
                PacketError::Crypto(format!("hop {}: {}", hop.public_key.short_hex(), e))
            })?;
        }

        let built = build_onion(path, message)?;
        let por = create_por_values_for_sender(&built.secrets[0], built.secrets.get(1));

        let ticket = issuer.issue(
            &identity.signing,
            first_hop.public_key.to_address(),
            por.ticket_challenge,
        );
        let challenge = AcknowledgementChallenge::create(por.ack_challenge, &identity.signing);

        store
            .store_unacknowledged_ticket(por.ack_challenge, PendingAcknowledgement::WaitingAsSender)
            .await?;

        Ok(Self {
            alpha: built.alpha,
            challenge,
            ticket,
            onion: built.onion,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::HEADER_SIZE + self.onion.len());
        data.extend_from_slice(&self.alpha);
        data.extend_from_slice(&self.challenge.to_bytes());
        data.extend_from_slice(&self.ticket.to_bytes());
        data.extend_from_slice(&self.onion);
        data
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= Self::HEADER_SIZE {
            return Err(PacketError::MalformedPacket(format!(
                "{} bytes is too short for a packet",
                bytes.len()
            )));
        }

        let (alpha, rest) = bytes.split_at(ALPHA_SIZE);
        let (challenge, rest) = rest.split_at(AcknowledgementChallenge::SIZE);
        let (ticket, onion) = rest.split_at(Ticket::SIZE);

        let mut alpha_bytes = [0u8; ALPHA_SIZE];
        alpha_bytes.copy_from_slice(alpha);

        Ok(Self {
            alpha: alpha_bytes,
            challenge: AcknowledgementChallenge::from_bytes(challenge)
                .map_err(|e| PacketError::MalformedPacket(e.to_string()))?,
            ticket: Ticket::from_bytes(ticket)
                .map_err(|e| PacketError::MalformedPacket(e.to_string()))?,
            onion: onion.to_vec(),
        })
    }

    /// Peel our layer and check everything the previous hop handed us
    pub fn decode(&self, identity: &Identity, previous_hop: &PublicKey) -> Result<DecodedPacket> {
        let (secret, layer) = peel_onion_layer(&identity.encryption, &self.alpha, &self.onion)?;

        if !self.challenge.verify(previous_hop) {
            return Err(PacketError::InvalidTicket(
                "acknowledgement challenge not signed by previous hop".to_string(),
            ));
        }
        let ack_key = validate_ack_challenge(&secret, &self.challenge.challenge)?;

        if !verify_ticket(&self.ticket, previous_hop) {
            return Err(PacketError::InvalidTicket(
                "ticket not signed by previous hop".to_string(),
            ));
        }
        if self.ticket.counterparty != identity.address() {
            return Err(PacketError::InvalidTicket("ticket not payable to us".to_string()));
        }

        let own_key = derive_own_key_share(&secret);
        if !validate_por_hint(&self.ticket.challenge, &own_key, &layer.por.ack_challenge) {
            return Err(PacketError::ChallengeMismatch(
                "ticket challenge does not match PoR hint".to_string(),
            ));
        }

        Ok(DecodedPacket {
            previous_hop: *previous_hop,
            own_key,
            ack_key,
            ticket: self.ticket.clone(),
            por: layer.por,
            next_hop: layer.next_hop,
            payload: layer.payload,
        })
    }
}

/// One hop's view of a packet after a successful decode
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub previous_hop: PublicKey,
    /// Our share of the ticket we were paid with
    pub own_key: HalfKey,
    /// Our ack share, sent back to the previous hop
    pub ack_key: HalfKey,
    /// The ticket payable to us
    pub ticket: Ticket,
    /// Challenges for the packet we forward
    pub por: PorString,
    /// `None` when we are the final receiver
    pub next_hop: Option<NextHop>,
    pub payload: Vec<u8>,
}

impl DecodedPacket {
    pub fn is_final(&self) -> bool {
        self.next_hop.is_none()
    }

    pub fn acknowledgement(&self) -> Acknowledgement {
        Acknowledgement::new(self.ack_key)
    }

    /// Keep the ticket we were paid with until the next hop acknowledges.
    /// Must happen before the packet is forwarded. The final receiver holds
    /// no ticket worth keeping, so this is a no-op there.
    pub async fn store_unacknowledged_ticket(&self, store: &dyn TicketStore) -> Result<()> {
        if self.is_final() {
            return Ok(());
        }

        let unacknowledged =
            UnacknowledgedTicket::new(self.ticket.clone(), self.own_key, self.previous_hop);
        store
            .store_unacknowledged_ticket(
                self.por.ack_challenge,
                PendingAcknowledgement::WaitingAsRelayer(unacknowledged),
            )
            .await?;
        Ok(())
    }

    /// The packet for the next hop, paid with a fresh ticket from us
    pub fn next_packet(&self, identity: &Identity, issuer: &TicketIssuer) -> Option<(PublicKey, Packet)> {
        let next_hop = self.next_hop.as_ref()?;

        let ticket = issuer.issue(
            &identity.signing,
            next_hop.public_key.to_address(),
            self.por.ticket_challenge,
        );
        let challenge = AcknowledgementChallenge::create(self.por.ack_challenge, &identity.signing);

        Some((
            next_hop.public_key,
            Packet {
                alpha: next_hop.alpha,
                challenge,
                ticket,
                onion: next_hop.remaining.clone(),
            },
        ))
    }
}
