//! AES-256-GCM authenticated encryption.
//!
//! This module provides:
//! - [`seal`] — encrypt plaintext with a random nonce, returning [`SealedData`]
//! - [`open`] — decrypt and authenticate [`SealedData`], returning [`SecretBuffer`]
//! - [`SealedData`] — nonce + ciphertext + tag container with a combined
//!   wire form suitable for writing as a single `.cfr` blob
//!
//! The nonce and tag are carried as separate fields so the encryption
//! manifest can record them next to the combined blob.

use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::memory::SecretBuffer;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum valid combined length: nonce + empty ciphertext + tag.
const MIN_COMBINED_LEN: usize = NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Authenticated ciphertext container — nonce + ciphertext + tag.
///
/// Wire format: `nonce (12 bytes) || ciphertext (variable) || tag (16 bytes)`.
///
/// The nonce is randomly generated per [`seal`] call and must travel with
/// the ciphertext. The tag authenticates nonce and ciphertext both — any
/// modification causes [`open`] to fail.
#[must_use = "sealed data must be stored"]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedData {
    /// 96-bit random nonce, unique per seal.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted data (same length as the original plaintext).
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl SealedData {
    /// Serialize to the combined wire format: `nonce || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = NONCE_LEN
            .saturating_add(self.ciphertext.len())
            .saturating_add(TAG_LEN);
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Parse the combined wire format.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] if the input is shorter than 28
    /// bytes (12-byte nonce + 0-byte ciphertext + 16-byte tag). A malformed
    /// blob is indistinguishable from a failed authentication on purpose.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_COMBINED_LEN {
            return Err(CryptoError::Decryption);
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);

        // The length guard above guarantees this cannot underflow; the
        // checked form satisfies the workspace arithmetic lint.
        let ct_end = bytes
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(CryptoError::Decryption)?;
        let ciphertext = bytes[NONCE_LEN..ct_end].to_vec();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[ct_end..]);

        Ok(Self {
            nonce,
            ciphertext,
            tag,
        })
    }
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Encrypt plaintext using AES-256-GCM with a random 96-bit nonce.
///
/// Returns a [`SealedData`] carrying the nonce, ciphertext, and tag. The
/// nonce comes from `OsRng`; a CSPRNG failure is fatal (no fallback).
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if the key is not exactly 32
/// bytes, [`CryptoError::Rng`] if nonce generation fails, and
/// [`CryptoError::Encryption`] if the underlying seal operation fails.
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<SealedData, CryptoError> {
    let less_safe_key = gcm_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::Rng(format!("nonce generation failed: {e}")))?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Encrypt in place — the plaintext buffer becomes the ciphertext.
    let mut in_out = plaintext.to_vec();
    let Ok(tag) =
        less_safe_key.seal_in_place_separate_tag(nonce, aead::Aad::empty(), &mut in_out)
    else {
        in_out.zeroize();
        return Err(CryptoError::Encryption("AES-256-GCM seal failed".into()));
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedData {
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Decrypt AES-256-GCM authenticated ciphertext.
///
/// Returns the plaintext as a [`SecretBuffer`] (zeroized on drop). The
/// intermediate decryption buffer is zeroized after the copy.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if the key is not exactly 32
/// bytes. Returns [`CryptoError::Decryption`] if authentication fails —
/// tampered data or wrong key, deliberately indistinguishable.
pub fn open(sealed: &SealedData, key: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let less_safe_key = gcm_key(key)?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    // Build the ciphertext || tag buffer expected by open_in_place.
    let mut ct_tag = Vec::with_capacity(sealed.ciphertext.len().saturating_add(TAG_LEN));
    ct_tag.extend_from_slice(&sealed.ciphertext);
    ct_tag.extend_from_slice(&sealed.tag);

    let plaintext_slice = less_safe_key
        .open_in_place(nonce, aead::Aad::empty(), &mut ct_tag)
        .map_err(|_| CryptoError::Decryption)?;

    let result = SecretBuffer::new(plaintext_slice);
    ct_tag.zeroize();
    Ok(result)
}

/// Parse a combined blob and decrypt it in one step.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] on a malformed blob, tampered data,
/// or wrong key — a single error kind for all three.
pub fn open_combined(combined: &[u8], key: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let sealed = SealedData::from_bytes(combined)?;
    open(&sealed, key)
}

/// Build an AES-256-GCM key, validating the key length.
fn gcm_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
