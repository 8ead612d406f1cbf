use ed25519_dalek::{SigningKey, VerifyingKey};
use mixcraft_core::{Address, PathHop, PublicKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid public key")]
    InvalidPublicKey,
}

/// Keypair for signing (Ed25519)
pub struct SigningKeypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
            verifying_key: self.verifying_key,
        }
    }
}

impl SigningKeypair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get the public key as bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Get the secret key as bytes
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Create from raw secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }
}

/// Keypair for onion layer encryption (X25519)
pub struct EncryptionKeypair {
    pub secret: StaticSecret,
    pub public: X25519PublicKey,
}

impl Clone for EncryptionKeypair {
    fn clone(&self) -> Self {
        let secret_bytes = self.secret.as_bytes();
        let secret = StaticSecret::from(*secret_bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }
}

impl EncryptionKeypair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the public key as bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Get the secret key as bytes
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        *self.secret.as_bytes()
    }

    /// Create from raw secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*secret);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Perform Diffie-Hellman key exchange
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        *shared.as_bytes()
    }
}

/// A node's long-lived keys: Ed25519 for identity and signatures, X25519 for
/// the onion layers addressed to it
#[derive(Clone)]
pub struct Identity {
    pub signing: SigningKeypair,
    pub encryption: EncryptionKeypair,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self {
            signing: SigningKeypair::generate(),
            encryption: EncryptionKeypair::generate(),
        }
    }

    /// Restore an identity from its two secret keys
    pub fn from_secret_bytes(signing_secret: &[u8; 32], encryption_secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKeypair::from_secret_bytes(signing_secret),
            encryption: EncryptionKeypair::from_secret_bytes(encryption_secret),
        }
    }

    /// The signing public key, which identifies the node on the transport
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.signing.public_key_bytes())
    }

    /// Account address tickets issued to this node are payable to
    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    /// How other nodes put this node on a packet path
    pub fn path_hop(&self) -> PathHop {
        PathHop::new(self.public_key(), self.encryption.public_key_bytes())
    }
}

/// Check that a public key is a valid Ed25519 point
pub fn validate_public_key(public_key: &PublicKey) -> Result<(), KeyError> {
    VerifyingKey::from_bytes(public_key.as_bytes())
        .map(|_| ())
        .map_err(|_| KeyError::InvalidPublicKey)
}

/// Hash data using SHA-256
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
