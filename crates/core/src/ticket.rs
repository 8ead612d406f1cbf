//! Probabilistic payment tickets
//!
//! A ticket is issued by the hop that forwards a packet and is payable to the
//! hop receiving it. It only becomes redeemable once the receiving hop learns
//! the acknowledgement key share of the hop after it.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::types::{Address, Challenge, FixedBytes, HalfKey, Hash, PublicKey, Signature};
use crate::{CoreError, Result};

/// Width of every 256-bit ticket field on the wire
pub const UINT256_SIZE: usize = 32;

/// Signed, probabilistic payment promise
///
/// Wire layout (276 bytes):
/// counterparty(20) || challenge(32) || epoch(32) || index(32) || amount(32) ||
/// win_prob(32) || channel_iteration(32) || signature(64)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Address of the hop this ticket pays
    pub counterparty: Address,
    /// Commitment to own key share + next hop's ack key share
    pub challenge: Challenge,
    /// Channel epoch
    pub epoch: U256,
    /// Ticket epoch within the channel
    pub index: U256,
    /// Value paid out if the ticket wins
    pub amount: U256,
    /// Winning probability as `U256::MAX / inverse`
    pub win_prob: U256,
    /// Channel iteration
    pub channel_iteration: U256,
    /// Issuer's ed25519 signature over the first 212 bytes
    pub signature: Signature,
}

impl Ticket {
    pub const SIZE: usize =
        Address::SIZE + Challenge::SIZE + 5 * UINT256_SIZE + Signature::SIZE;

    /// Size of the signed prefix
    pub const SIGNED_SIZE: usize = Self::SIZE - Signature::SIZE;

    /// Create an unsigned ticket (signature zeroed)
    pub fn new(
        counterparty: Address,
        challenge: Challenge,
        epoch: U256,
        index: U256,
        amount: U256,
        win_prob: U256,
        channel_iteration: U256,
    ) -> Self {
        Self {
            counterparty,
            challenge,
            epoch,
            index,
            amount,
            win_prob,
            channel_iteration,
            signature: Signature::new([0u8; 64]),
        }
    }

    /// Encode a win probability given as its inverse (1 = always wins)
    pub fn win_prob_from_inverse(inverse: u64) -> U256 {
        U256::MAX / U256::from(inverse.max(1))
    }

    /// The bytes covered by the issuer's signature
    pub fn signable_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::SIGNED_SIZE);
        data.extend_from_slice(self.counterparty.as_slice());
        data.extend_from_slice(self.challenge.as_slice());
        for field in [
            &self.epoch,
            &self.index,
            &self.amount,
            &self.win_prob,
            &self.channel_iteration,
        ] {
            let mut buf = [0u8; UINT256_SIZE];
            field.to_big_endian(&mut buf);
            data.extend_from_slice(&buf);
        }
        data
    }

    /// Serialize to the fixed-width wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = self.signable_data();
        data.extend_from_slice(self.signature.as_slice());
        data
    }

    /// Deserialize from the fixed-width wire format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(CoreError::InvalidLength {
                name: "Ticket",
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let (counterparty, rest) = bytes.split_at(Address::SIZE);
        let (challenge, rest) = rest.split_at(Challenge::SIZE);
        let (epoch, rest) = rest.split_at(UINT256_SIZE);
        let (index, rest) = rest.split_at(UINT256_SIZE);
        let (amount, rest) = rest.split_at(UINT256_SIZE);
        let (win_prob, rest) = rest.split_at(UINT256_SIZE);
        let (channel_iteration, signature) = rest.split_at(UINT256_SIZE);

        let counterparty = Address::from_slice(counterparty)?;
        let challenge = Challenge::from_slice(challenge)?;
        let epoch = U256::from_big_endian(epoch);
        let index = U256::from_big_endian(index);
        let amount = U256::from_big_endian(amount);
        let win_prob = U256::from_big_endian(win_prob);
        let channel_iteration = U256::from_big_endian(channel_iteration);
        let signature = Signature::from_slice(signature)?;

        Ok(Self {
            counterparty,
            challenge,
            epoch,
            index,
            amount,
            win_prob,
            channel_iteration,
            signature,
        })
    }

    /// Hash of the signed fields
    pub fn hash(&self) -> Hash {
        Hash::create(&[self.signable_data().as_slice()])
    }

    /// A ticket wins if SHA-256(ticket_hash || response) <= win_prob
    pub fn is_winning(&self, response: &HalfKey) -> bool {
        let luck = Hash::create(&[self.hash().as_slice(), response.as_slice()]);
        U256::from_big_endian(luck.as_slice()) <= self.win_prob
    }
}

/// Ticket held by a relay until the next hop acknowledges the packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnacknowledgedTicket {
    pub ticket: Ticket,
    /// Our own half-key share for this packet
    pub own_key: HalfKey,
    /// Public key of the hop that issued (signed) the ticket
    pub signer: PublicKey,
}

impl UnacknowledgedTicket {
    pub fn new(ticket: Ticket, own_key: HalfKey, signer: PublicKey) -> Self {
        Self {
            ticket,
            own_key,
            signer,
        }
    }
}

/// Ticket whose PoR response is known, making it redeemable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgedTicket {
    pub ticket: Ticket,
    /// own_key + ack_key; commits to `ticket.challenge`
    pub response: HalfKey,
    pub signer: PublicKey,
}

impl AcknowledgedTicket {
    pub fn new(ticket: Ticket, response: HalfKey, signer: PublicKey) -> Self {
        Self {
            ticket,
            response,
            signer,
        }
    }

    /// Whether this ticket is worth submitting for redemption
    pub fn is_winning(&self) -> bool {
        self.ticket.is_winning(&self.response)
    }
}

/// What a node is waiting for under a given acknowledgement challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAcknowledgement {
    /// We created the packet; the first hop's acknowledgement confirms pickup
    WaitingAsSender,
    /// We relayed the packet and hold a ticket that needs the ack key share
    WaitingAsRelayer(UnacknowledgedTicket),
}

/// Serializable summary of an acknowledged ticket, for status output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketSummary {
    pub counterparty: Address,
    pub signer: PublicKey,
    pub amount: String,
    pub winning: bool,
}

impl From<&AcknowledgedTicket> for TicketSummary {
    fn from(acked: &AcknowledgedTicket) -> Self {
        Self {
            counterparty: acked.ticket.counterparty,
            signer: acked.signer,
            amount: acked.ticket.amount.to_string(),
            winning: acked.is_winning(),
        }
    }
}
