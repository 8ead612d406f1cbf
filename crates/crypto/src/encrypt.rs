use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::keys::hash;

const LAYER_KEY_SALT: &[u8] = b"mixcraft-onion-v1";
const LAYER_KEY_INFO: &[u8] = b"layer-key";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncryptError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key")]
    InvalidKey,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
    #[error("Malformed onion layer")]
    MalformedLayer,
    #[error("Onion path is empty")]
    EmptyPath,
}

/// Per-hop secret shared between a packet's creator and one hop on its path
///
/// Everything a hop learns about its position in the proof-of-relay scheme is
/// derived from this value.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Derive the shared secret between our X25519 secret and their public key
///
/// SHA-256 over the Diffie-Hellman output, so both sides arrive at the same
/// value regardless of which key was ephemeral.
pub fn derive_shared_secret(our_secret: &[u8; 32], their_public: &[u8; 32]) -> SharedSecret {
    let our_secret = StaticSecret::from(*our_secret);
    let their_public = PublicKey::from(*their_public);
    let dh = our_secret.diffie_hellman(&their_public);
    SharedSecret(hash(dh.as_bytes()))
}

fn layer_key(secret: &SharedSecret) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(LAYER_KEY_SALT), secret.as_bytes());
    let mut key = [0u8; 32];
    let res = hk.expand(LAYER_KEY_INFO, &mut key);
    debug_assert!(res.is_ok(), "HKDF expand cannot fail for 32-byte output");
    key
}

/// Encrypt one onion layer under the hop's shared secret
pub fn encrypt_with_secret(secret: &SharedSecret, plaintext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    encrypt_symmetric(&layer_key(secret), plaintext)
}

/// Decrypt one onion layer under the hop's shared secret
pub fn decrypt_with_secret(secret: &SharedSecret, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    decrypt_symmetric(&layer_key(secret), ciphertext)
}

/// Encrypt data with a symmetric key
///
/// Output: `[nonce: 12][ciphertext + tag]`
pub fn encrypt_symmetric(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    // Generate random nonce
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptError::InvalidKey)?;

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(12 + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt data with a symmetric key
pub fn decrypt_symmetric(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    if ciphertext.len() < 12 {
        return Err(EncryptError::CiphertextTooShort);
    }

    let nonce = Nonce::from_slice(&ciphertext[..12]);
    let ciphertext = &ciphertext[12..];

    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptError::InvalidKey)?;

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EncryptError::DecryptionFailed)
}
