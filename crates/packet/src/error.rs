use mixcraft_crypto::{EncryptError, PorError};
use mixcraft_network::TransportError;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Challenge mismatch: {0}")]
    ChallengeMismatch(String),

    #[error("Invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("Message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Path is empty")]
    EmptyPath,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl From<EncryptError> for PacketError {
    fn from(e: EncryptError) -> Self {
        match e {
            EncryptError::DecryptionFailed | EncryptError::CiphertextTooShort => {
                PacketError::DecryptionFailed
            }
            EncryptError::MalformedLayer => PacketError::MalformedPacket(e.to_string()),
            EncryptError::EmptyPath => PacketError::EmptyPath,
            other => PacketError::Crypto(other.to_string()),
        }
    }
}

impl From<PorError> for PacketError {
    fn from(e: PorError) -> Self {
        match e {
            PorError::ChallengeMismatch => PacketError::ChallengeMismatch(e.to_string()),
            other => PacketError::MalformedPacket(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PacketError>;
