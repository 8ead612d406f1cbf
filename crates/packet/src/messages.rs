//! Fixed-width messages carried next to the onion

use mixcraft_core::{CoreError, FixedBytes, HalfKey, HalfKeyChallenge, PublicKey, Signature};
use mixcraft_crypto::{half_key_challenge, sign_data, verify_signature, PorError, SigningKeypair};

/// The challenge a hop expects the next hop to answer, signed by that hop
///
/// Wire layout (96 bytes): challenge(32) || signature(64)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgementChallenge {
    pub challenge: HalfKeyChallenge,
    pub signature: Signature,
}

impl AcknowledgementChallenge {
    pub const SIZE: usize = HalfKeyChallenge::SIZE + Signature::SIZE;

    /// Sign `challenge` as the hop that forwards the packet
    pub fn create(challenge: HalfKeyChallenge, keypair: &SigningKeypair) -> Self {
        Self {
            challenge,
            signature: sign_data(keypair, challenge.as_slice()),
        }
    }

    pub fn verify(&self, signer: &PublicKey) -> bool {
        verify_signature(signer, self.challenge.as_slice(), &self.signature)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::SIZE);
        data.extend_from_slice(self.challenge.as_slice());
        data.extend_from_slice(self.signature.as_slice());
        data
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != Self::SIZE {
            return Err(CoreError::InvalidLength {
                name: "AcknowledgementChallenge",
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let (challenge, signature) = bytes.split_at(HalfKeyChallenge::SIZE);
        Ok(Self {
            challenge: HalfKeyChallenge::from_slice(challenge)?,
            signature: Signature::from_slice(signature)?,
        })
    }
}

/// A hop's ack key share, sent back to the previous hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    pub ack_key: HalfKey,
}

impl Acknowledgement {
    pub const SIZE: usize = HalfKey::SIZE;

    pub fn new(ack_key: HalfKey) -> Self {
        Self { ack_key }
    }

    /// The challenge this acknowledgement answers
    pub fn challenge(&self) -> Result<HalfKeyChallenge, PorError> {
        half_key_challenge(&self.ack_key)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.ack_key.as_slice().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(Self {
            ack_key: HalfKey::from_slice(bytes)?,
        })
    }
}
