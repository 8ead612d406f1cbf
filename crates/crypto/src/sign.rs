use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier, VerifyingKey};
use mixcraft_core::{PublicKey, Signature, Ticket};

use crate::keys::SigningKeypair;

/// Sign data with a signing keypair
pub fn sign_data(keypair: &SigningKeypair, data: &[u8]) -> Signature {
    let signature: Ed25519Signature = keypair.signing_key.sign(data);
    Signature::new(signature.to_bytes())
}

/// Verify a signature
pub fn verify_signature(pubkey: &PublicKey, data: &[u8], signature: &Signature) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(pubkey.as_bytes()) {
        Ok(vk) => vk,
        Err(_) => return false,
    };

    let signature = Ed25519Signature::from_bytes(signature.as_bytes());

    verifying_key.verify(data, &signature).is_ok()
}

/// Sign a ticket over its 212-byte signable prefix
pub fn sign_ticket(keypair: &SigningKeypair, mut ticket: Ticket) -> Ticket {
    ticket.signature = sign_data(keypair, &ticket.signable_data());
    ticket
}

/// Verify that `issuer` signed the ticket
pub fn verify_ticket(ticket: &Ticket, issuer: &PublicKey) -> bool {
    verify_signature(issuer, &ticket.signable_data(), &ticket.signature)
}
