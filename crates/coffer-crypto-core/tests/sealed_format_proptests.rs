#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for the combined `nonce ‖ ciphertext ‖ tag` format.

use coffer_crypto_core::symmetric::{open_combined, seal, SealedData, NONCE_LEN, TAG_LEN};
use coffer_crypto_core::{CryptoError, KEY_LEN};
use proptest::prelude::*;

/// Fixed key for property tests.
const PROP_KEY: [u8; KEY_LEN] = [0xDD; KEY_LEN];

proptest! {
    /// Seal→combined→open always recovers the original payload.
    #[test]
    fn roundtrip_preserves_payload(
        payload in proptest::collection::vec(any::<u8>(), 0..8192),
    ) {
        let sealed = seal(&payload, &PROP_KEY).expect("seal should succeed");
        let combined = sealed.to_bytes();
        let recovered = open_combined(&combined, &PROP_KEY)
            .expect("open should succeed");

        prop_assert_eq!(recovered.expose(), payload.as_slice());
    }

    /// Combined length is always payload + nonce + tag.
    #[test]
    fn combined_length_is_exact(
        payload in proptest::collection::vec(any::<u8>(), 0..8192),
    ) {
        let sealed = seal(&payload, &PROP_KEY).expect("seal should succeed");
        prop_assert_eq!(
            sealed.to_bytes().len(),
            payload.len() + NONCE_LEN + TAG_LEN
        );
    }

    /// to_bytes→from_bytes preserves every field.
    #[test]
    fn parse_roundtrip_preserves_fields(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
    ) {
        let sealed = seal(&payload, &PROP_KEY).expect("seal should succeed");
        let parsed = SealedData::from_bytes(&sealed.to_bytes())
            .expect("from_bytes should succeed");

        prop_assert_eq!(parsed.nonce, sealed.nonce);
        prop_assert_eq!(parsed.ciphertext, sealed.ciphertext);
        prop_assert_eq!(parsed.tag, sealed.tag);
    }

    /// Wrong key always produces the opaque Decryption error.
    #[test]
    fn wrong_key_always_fails(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
        wrong_key in proptest::array::uniform32(0u8..),
    ) {
        prop_assume!(wrong_key != PROP_KEY);

        let sealed = seal(&payload, &PROP_KEY).expect("seal should succeed");
        let result = open_combined(&sealed.to_bytes(), &wrong_key);

        prop_assert!(
            matches!(result, Err(CryptoError::Decryption)),
            "wrong key must yield CryptoError::Decryption, got: {:?}",
            result
        );
    }

    /// Any single flipped bit in the combined blob fails authentication.
    #[test]
    fn bit_flip_always_fails(
        payload in proptest::collection::vec(any::<u8>(), 1..1024),
        flip_index in any::<prop::sample::Index>(),
    ) {
        let sealed = seal(&payload, &PROP_KEY).expect("seal should succeed");
        let mut combined = sealed.to_bytes();
        let idx = flip_index.index(combined.len());
        combined[idx] ^= 0x01;

        let result = open_combined(&combined, &PROP_KEY);
        prop_assert!(
            matches!(result, Err(CryptoError::Decryption)),
            "flipped bit at {} must fail authentication",
            idx
        );
    }

    /// Truncated blobs are rejected as Decryption, never panic.
    #[test]
    fn truncation_is_rejected(
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        keep in 0usize..27,
    ) {
        let sealed = seal(&payload, &PROP_KEY).expect("seal should succeed");
        let combined = sealed.to_bytes();
        let truncated = &combined[..keep.min(combined.len())];

        if truncated.len() < NONCE_LEN + TAG_LEN {
            prop_assert!(matches!(
                SealedData::from_bytes(truncated),
                Err(CryptoError::Decryption)
            ));
        }
    }
}
