//! Onion routing types
//!
//! Each hop on a path decrypts exactly one `OnionLayer`. A relay layer names
//! the next hop and carries the still-encrypted remainder; the terminal layer
//! carries the message payload instead.

use serde::{Deserialize, Serialize};

use crate::types::{Challenge, HalfKeyChallenge, PublicKey};
use crate::{CoreError, Result};

/// A hop on a packet path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathHop {
    /// Ed25519 identity, used to address the hop on the transport
    pub public_key: PublicKey,
    /// X25519 key the onion layer for this hop is encrypted to
    pub encryption_pubkey: [u8; 32],
}

impl PathHop {
    pub fn new(public_key: PublicKey, encryption_pubkey: [u8; 32]) -> Self {
        Self {
            public_key,
            encryption_pubkey,
        }
    }
}

/// Proof-of-relay values a hop needs to build the packet for the next hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PorString {
    /// Challenge the next hop's acknowledgement must answer
    pub ack_challenge: HalfKeyChallenge,
    /// Challenge to put on the ticket issued to the next hop
    pub ticket_challenge: Challenge,
}

/// Routing information for a relay layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextHop {
    pub public_key: PublicKey,
    /// Ephemeral X25519 key the next hop derives its shared secret from
    pub alpha: [u8; 32],
    /// Encrypted layers for the rest of the path
    pub remaining: Vec<u8>,
}

/// Decrypted onion layer revealed when a hop peels one encryption layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnionLayer {
    /// `None` when this hop is the final receiver
    pub next_hop: Option<NextHop>,
    pub por: PorString,
    /// Message payload, empty on relay layers
    pub payload: Vec<u8>,
}

impl OnionLayer {
    pub fn is_final(&self) -> bool {
        self.next_hop.is_none()
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CoreError::SerializationError(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| CoreError::SerializationError(e.to_string()))
    }
}
