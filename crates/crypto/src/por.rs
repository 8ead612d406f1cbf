//! Proof of relay
//!
//! Every hop on a path shares a secret with the packet's creator. From it the
//! hop derives two half-key shares: its *own* share, learned when it peels its
//! layer, and its *ack* share, which it reveals to the previous hop as the
//! acknowledgement. A ticket issued to hop `i` is locked to
//! `own_i·G + ack_{i+1}·G`, so the ticket only becomes redeemable once hop
//! `i + 1` has acknowledged the packet.
//!
//! Shares are Ristretto scalars, challenges are compressed Ristretto points.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use hkdf::Hkdf;
use mixcraft_core::{Challenge, HalfKey, HalfKeyChallenge, PorString};
use sha2::Sha256;
use thiserror::Error;

use crate::encrypt::SharedSecret;

const POR_SALT: &[u8] = b"mixcraft-por-v1";
const OWN_KEY_INFO: &[u8] = b"own-key";
const ACK_KEY_INFO: &[u8] = b"ack-key";
const FINAL_KEY_INFO: &[u8] = b"final-key";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PorError {
    #[error("Half key is not a canonical scalar")]
    InvalidHalfKey,
    #[error("Challenge is not a valid curve point")]
    InvalidChallenge,
    #[error("Challenge mismatch")]
    ChallengeMismatch,
}

/// Values the creator of a packet needs for one hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PorValues {
    /// Challenge the hop's acknowledgement answers
    pub ack_challenge: HalfKeyChallenge,
    /// The hop's own share
    pub own_key: HalfKey,
    /// Challenge of the ticket issued to the hop
    pub ticket_challenge: Challenge,
}

impl PorValues {
    pub fn por_string(&self) -> PorString {
        PorString {
            ack_challenge: self.ack_challenge,
            ticket_challenge: self.ticket_challenge,
        }
    }
}

fn derive_scalar(secret: &SharedSecret, info: &[u8]) -> Scalar {
    let hk = Hkdf::<Sha256>::new(Some(POR_SALT), secret.as_bytes());
    let mut okm = [0u8; 64];
    let res = hk.expand(info, &mut okm);
    debug_assert!(res.is_ok(), "HKDF expand cannot fail for 64-byte output");
    Scalar::from_bytes_mod_order_wide(&okm)
}

fn to_scalar(key: &HalfKey) -> Result<Scalar, PorError> {
    Option::<Scalar>::from(Scalar::from_canonical_bytes(key.to_bytes()))
        .ok_or(PorError::InvalidHalfKey)
}

fn to_point(challenge: &HalfKeyChallenge) -> Result<RistrettoPoint, PorError> {
    CompressedRistretto(challenge.to_bytes())
        .decompress()
        .ok_or(PorError::InvalidChallenge)
}

fn commit(scalar: &Scalar) -> RistrettoPoint {
    RistrettoPoint::mul_base(scalar)
}

/// The share a hop learns by peeling its own layer
pub fn derive_own_key_share(secret: &SharedSecret) -> HalfKey {
    HalfKey::new(derive_scalar(secret, OWN_KEY_INFO).to_bytes())
}

/// The share a hop reveals to the previous hop as its acknowledgement
pub fn derive_ack_key_share(secret: &SharedSecret) -> HalfKey {
    HalfKey::new(derive_scalar(secret, ACK_KEY_INFO).to_bytes())
}

/// Stand-in for the next hop's ack share when the next hop is the final receiver
fn derive_final_key_share(secret: &SharedSecret) -> Scalar {
    derive_scalar(secret, FINAL_KEY_INFO)
}

/// `key·G`
pub fn half_key_challenge(key: &HalfKey) -> Result<HalfKeyChallenge, PorError> {
    let scalar = to_scalar(key)?;
    Ok(HalfKeyChallenge::new(commit(&scalar).compress().to_bytes()))
}

/// Add two half-key shares
pub fn combine_half_keys(a: &HalfKey, b: &HalfKey) -> Result<HalfKey, PorError> {
    let sum = to_scalar(a)? + to_scalar(b)?;
    Ok(HalfKey::new(sum.to_bytes()))
}

/// PoR values for the hop holding `secret_b`, whose successor holds `secret_c`
///
/// `secret_c` is `None` when the successor is not a relay but the final
/// receiver, in which case the ticket is locked to a share only the creator
/// and the hop itself can compute.
pub fn create_por_values_for_sender(
    secret_b: &SharedSecret,
    secret_c: Option<&SharedSecret>,
) -> PorValues {
    let own = derive_scalar(secret_b, OWN_KEY_INFO);
    let ack = derive_scalar(secret_b, ACK_KEY_INFO);
    let next = match secret_c {
        Some(secret_c) => derive_scalar(secret_c, ACK_KEY_INFO),
        None => derive_final_key_share(secret_b),
    };

    PorValues {
        ack_challenge: HalfKeyChallenge::new(commit(&ack).compress().to_bytes()),
        own_key: HalfKey::new(own.to_bytes()),
        ticket_challenge: Challenge::new((commit(&own) + commit(&next)).compress().to_bytes()),
    }
}

/// PoR string carried in the final receiver's layer
///
/// Its ack challenge is the hint that lets the receiver check the ticket it
/// was handed. There is no further ticket, so the ticket challenge is the
/// identity point.
pub fn create_por_string_for_receiver(secret: &SharedSecret) -> PorString {
    let last = derive_final_key_share(secret);
    PorString {
        ack_challenge: HalfKeyChallenge::new(commit(&last).compress().to_bytes()),
        // Compressed identity point
        ticket_challenge: Challenge::new([0u8; 32]),
    }
}

/// Check the ack challenge a hop received against its own secret
///
/// Returns the hop's ack share, which it sends back as the acknowledgement.
pub fn validate_ack_challenge(
    secret: &SharedSecret,
    embedded: &HalfKeyChallenge,
) -> Result<HalfKey, PorError> {
    let ack_key = derive_ack_key_share(secret);
    if half_key_challenge(&ack_key)? != *embedded {
        return Err(PorError::ChallengeMismatch);
    }
    Ok(ack_key)
}

/// Whether `ticket_challenge == own_key·G + hint`
pub fn validate_por_hint(
    ticket_challenge: &Challenge,
    own_key: &HalfKey,
    hint: &HalfKeyChallenge,
) -> bool {
    let (Ok(own), Ok(hint)) = (to_scalar(own_key), to_point(hint)) else {
        return false;
    };
    (commit(&own) + hint).compress().to_bytes() == ticket_challenge.to_bytes()
}

/// Combine a held own share with a received ack share into the ticket response
///
/// Fails with `ChallengeMismatch` unless the response commits to the ticket's
/// challenge.
pub fn validate_acknowledgement(
    own_key: &HalfKey,
    ack_key: &HalfKey,
    ticket_challenge: &Challenge,
) -> Result<HalfKey, PorError> {
    let response = combine_half_keys(own_key, ack_key)?;
    if half_key_challenge(&response)?.to_bytes() != ticket_challenge.to_bytes() {
        return Err(PorError::ChallengeMismatch);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(byte: u8) -> SharedSecret {
        SharedSecret::from_bytes([byte; 32])
    }

    #[test]
    fn test_derivation_deterministic() {
        assert_eq!(derive_own_key_share(&secret(1)), derive_own_key_share(&secret(1)));
        assert_eq!(derive_ack_key_share(&secret(1)), derive_ack_key_share(&secret(1)));
        assert_ne!(derive_own_key_share(&secret(1)), derive_own_key_share(&secret(2)));
    }

    #[test]
    fn test_own_and_ack_shares_differ() {
        assert_ne!(derive_own_key_share(&secret(1)), derive_ack_key_share(&secret(1)));
    }

    #[test]
    fn test_sender_values_match_derivations() {
        let values = create_por_values_for_sender(&secret(1), Some(&secret(2)));

        assert_eq!(values.own_key, derive_own_key_share(&secret(1)));
        assert_eq!(
            values.ack_challenge,
            half_key_challenge(&derive_ack_key_share(&secret(1))).unwrap()
        );
    }

    #[test]
    fn test_relay_chain_validates() {
        // Hop b holds secret 1, its successor c holds secret 2
        let values = create_por_values_for_sender(&secret(1), Some(&secret(2)));
        let hint = create_por_values_for_sender(&secret(2), None).ack_challenge;

        let own = derive_own_key_share(&secret(1));
        assert!(validate_por_hint(&values.ticket_challenge, &own, &hint));

        let ack_of_c = derive_ack_key_share(&secret(2));
        let response = validate_acknowledgement(&own, &ack_of_c, &values.ticket_challenge).unwrap();
        assert_eq!(response, combine_half_keys(&own, &ack_of_c).unwrap());
    }

    #[test]
    fn test_receiver_hint_validates() {
        let values = create_por_values_for_sender(&secret(9), None);
        let por = create_por_string_for_receiver(&secret(9));

        assert!(validate_por_hint(
            &values.ticket_challenge,
            &derive_own_key_share(&secret(9)),
            &por.ack_challenge,
        ));
        assert_eq!(por.ticket_challenge, Challenge::new([0u8; 32]));
    }

    #[test]
    fn test_validate_ack_challenge() {
        let values = create_por_values_for_sender(&secret(3), None);

        let ack = validate_ack_challenge(&secret(3), &values.ack_challenge).unwrap();
        assert_eq!(ack, derive_ack_key_share(&secret(3)));

        assert_eq!(
            validate_ack_challenge(&secret(4), &values.ack_challenge),
            Err(PorError::ChallengeMismatch)
        );
    }

    #[test]
    fn test_forged_ack_share_rejected() {
        let values = create_por_values_for_sender(&secret(1), Some(&secret(2)));
        let own = derive_own_key_share(&secret(1));
        let forged = derive_ack_key_share(&secret(3));

        assert_eq!(
            validate_acknowledgement(&own, &forged, &values.ticket_challenge),
            Err(PorError::ChallengeMismatch)
        );
    }

    #[test]
    fn test_wrong_hint_rejected() {
        let values = create_por_values_for_sender(&secret(1), Some(&secret(2)));
        let own = derive_own_key_share(&secret(1));
        let wrong_hint = create_por_values_for_sender(&secret(5), None).ack_challenge;

        assert!(!validate_por_hint(&values.ticket_challenge, &own, &wrong_hint));
    }

    #[test]
    fn test_non_canonical_half_key_rejected() {
        let bogus = HalfKey::new([0xff; 32]);
        assert_eq!(half_key_challenge(&bogus), Err(PorError::InvalidHalfKey));

        let hint = create_por_values_for_sender(&secret(2), None).ack_challenge;
        assert!(!validate_por_hint(&Challenge::new([0u8; 32]), &bogus, &hint));
    }

    #[test]
    fn test_invalid_hint_point() {
        let values = create_por_values_for_sender(&secret(1), Some(&secret(2)));
        let own = derive_own_key_share(&secret(1));
        assert!(!validate_por_hint(
            &values.ticket_challenge,
            &own,
            &HalfKeyChallenge::new([0xff; 32])
        ));
    }
}
