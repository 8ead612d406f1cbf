//! Onion construction
//!
//! Builds and peels multi-layer onions using X25519 ECDH + ChaCha20-Poly1305.
//! Every layer is encrypted under a fresh ephemeral key, so the `alpha` a hop
//! sees is unrelated to the one the previous hop saw.

use mixcraft_core::{NextHop, OnionLayer, PathHop};

use crate::encrypt::{
    decrypt_with_secret, derive_shared_secret, encrypt_with_secret, EncryptError, SharedSecret,
};
use crate::keys::EncryptionKeypair;
use crate::por::{create_por_string_for_receiver, create_por_values_for_sender};

/// A freshly built onion, plus the per-hop secrets its creator keeps
pub struct BuiltOnion {
    /// Ephemeral key for the first hop's ECDH
    pub alpha: [u8; 32],
    /// Encrypted layers, outermost first
    pub onion: Vec<u8>,
    /// Shared secret with each hop, in path order
    pub secrets: Vec<SharedSecret>,
}

/// Build an onion for `path` carrying `payload` to its last hop.
///
/// The layer for hop `i` carries the PoR string it needs to issue the ticket
/// for hop `i + 1`; the last hop's layer carries the payload.
pub fn build_onion(path: &[PathHop], payload: &[u8]) -> Result<BuiltOnion, EncryptError> {
    if path.is_empty() {
        return Err(EncryptError::EmptyPath);
    }

    let ephemerals: Vec<EncryptionKeypair> =
        path.iter().map(|_| EncryptionKeypair::generate()).collect();
    let secrets: Vec<SharedSecret> = path
        .iter()
        .zip(&ephemerals)
        .map(|(hop, ephemeral)| {
            derive_shared_secret(&ephemeral.secret_key_bytes(), &hop.encryption_pubkey)
        })
        .collect();

    // Build from innermost to outermost, starting with the receiver's layer
    let last_idx = path.len() - 1;
    let innermost = OnionLayer {
        next_hop: None,
        por: create_por_string_for_receiver(&secrets[last_idx]),
        payload: payload.to_vec(),
    };
    let innermost_bytes = innermost
        .to_bytes()
        .map_err(|_| EncryptError::EncryptionFailed)?;
    let mut current = encrypt_with_secret(&secrets[last_idx], &innermost_bytes)?;

    for i in (0..last_idx).rev() {
        let next = i + 1;
        let por = create_por_values_for_sender(&secrets[next], secrets.get(next + 1));
        let layer = OnionLayer {
            next_hop: Some(NextHop {
                public_key: path[next].public_key,
                alpha: ephemerals[next].public_key_bytes(),
                remaining: current,
            }),
            por: por.por_string(),
            payload: Vec::new(),
        };

        let layer_bytes = layer
            .to_bytes()
            .map_err(|_| EncryptError::EncryptionFailed)?;
        current = encrypt_with_secret(&secrets[i], &layer_bytes)?;
    }

    Ok(BuiltOnion {
        alpha: ephemerals[0].public_key_bytes(),
        onion: current,
        secrets,
    })
}

/// Peel one onion layer.
///
/// The hop combines its encryption key with `alpha` to derive its shared
/// secret, which it also needs for the PoR checks.
pub fn peel_onion_layer(
    our_encryption: &EncryptionKeypair,
    alpha: &[u8; 32],
    onion: &[u8],
) -> Result<(SharedSecret, OnionLayer), EncryptError> {
    let secret = derive_shared_secret(&our_encryption.secret_key_bytes(), alpha);
    let decrypted = decrypt_with_secret(&secret, onion)?;
    let layer = OnionLayer::from_bytes(&decrypted).map_err(|_| EncryptError::MalformedLayer)?;
    Ok((secret, layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Identity;
    use crate::por::{derive_own_key_share, validate_por_hint};

    fn make_path(len: usize) -> (Vec<Identity>, Vec<PathHop>) {
        let identities: Vec<Identity> = (0..len).map(|_| Identity::generate()).collect();
        let path = identities.iter().map(|id| id.path_hop()).collect();
        (identities, path)
    }

    #[test]
    fn test_onion_single_hop() {
        let (ids, path) = make_path(1);
        let built = build_onion(&path, b"testMsg").unwrap();
        assert_eq!(built.secrets.len(), 1);

        let (secret, layer) = peel_onion_layer(&ids[0].encryption, &built.alpha, &built.onion).unwrap();
        assert_eq!(secret, built.secrets[0]);
        assert!(layer.is_final());
        assert_eq!(layer.payload, b"testMsg");
    }

    #[test]
    fn test_onion_3_hops() {
        let (ids, path) = make_path(3);
        let built = build_onion(&path, b"hello").unwrap();

        let (_, l1) = peel_onion_layer(&ids[0].encryption, &built.alpha, &built.onion).unwrap();
        let next1 = l1.next_hop.clone().unwrap();
        assert_eq!(next1.public_key, ids[1].public_key());
        assert!(l1.payload.is_empty());

        let (_, l2) = peel_onion_layer(&ids[1].encryption, &next1.alpha, &next1.remaining).unwrap();
        let next2 = l2.next_hop.clone().unwrap();
        assert_eq!(next2.public_key, ids[2].public_key());

        let (_, l3) = peel_onion_layer(&ids[2].encryption, &next2.alpha, &next2.remaining).unwrap();
        assert!(l3.is_final());
        assert_eq!(l3.payload, b"hello");
    }

    #[test]
    fn test_alpha_changes_per_hop() {
        let (ids, path) = make_path(2);
        let built = build_onion(&path, b"x").unwrap();

        let (_, l1) = peel_onion_layer(&ids[0].encryption, &built.alpha, &built.onion).unwrap();
        assert_ne!(l1.next_hop.unwrap().alpha, built.alpha);
    }

    #[test]
    fn test_layer_hints_match_ticket_challenges() {
        // Hop i's ticket is locked to por(s_i, s_{i+1}); the hint it needs sits
        // in the layer of hop i - 1, or for hop 0 in its own layer
        let (ids, path) = make_path(3);
        let built = build_onion(&path, b"x").unwrap();

        let (s0, l0) = peel_onion_layer(&ids[0].encryption, &built.alpha, &built.onion).unwrap();
        let ticket0 = create_por_values_for_sender(&built.secrets[0], Some(&built.secrets[1]));
        assert!(validate_por_hint(
            &ticket0.ticket_challenge,
            &derive_own_key_share(&s0),
            &l0.por.ack_challenge,
        ));

        let next = l0.next_hop.unwrap();
        let (s1, l1) = peel_onion_layer(&ids[1].encryption, &next.alpha, &next.remaining).unwrap();
        assert!(validate_por_hint(
            &l0.por.ticket_challenge,
            &derive_own_key_share(&s1),
            &l1.por.ack_challenge,
        ));
    }

    #[test]
    fn test_empty_path() {
        assert!(matches!(build_onion(&[], b"x"), Err(EncryptError::EmptyPath)));
    }

    #[test]
    fn test_wrong_key_cannot_peel() {
        let (_, path) = make_path(1);
        let wrong = EncryptionKeypair::generate();
        let built = build_onion(&path, b"x").unwrap();

        let result = peel_onion_layer(&wrong, &built.alpha, &built.onion);
        assert!(matches!(result, Err(EncryptError::DecryptionFailed)));
    }

    #[test]
    fn test_malformed_layer() {
        let hop = EncryptionKeypair::generate();
        let ephemeral = EncryptionKeypair::generate();
        let secret = derive_shared_secret(&ephemeral.secret_key_bytes(), &hop.public_key_bytes());
        let onion = encrypt_with_secret(&secret, &[0xff, 0xff]).unwrap();

        let result = peel_onion_layer(&hop, &ephemeral.public_key_bytes(), &onion);
        assert!(matches!(result, Err(EncryptError::MalformedLayer)));
    }
}
