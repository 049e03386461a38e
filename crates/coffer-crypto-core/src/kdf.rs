//! Password key derivation via HKDF-SHA256.
//!
//! Derives the 256-bit wrapping key from the user's password and a per-vault
//! salt. The HKDF info label is part of the on-disk contract: changing it
//! invalidates every existing vault, which makes it the version lever for a
//! future KDF upgrade.
//!
//! # Key Hierarchy
//!
//! ```text
//! Password ──► HKDF-SHA256 ──► Wrapping Key ──► unwraps ──► Master Key
//! ```

use ring::hkdf;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::keys::SALT_LEN;
use crate::memory::SecretBytes;

/// HKDF info label — the `v1` suffix versions the derivation scheme.
const HKDF_INFO: &[u8] = b"com.loganross.coffer.v1";

/// Wrapping key length in bytes (256 bits).
pub const WRAPPING_KEY_LEN: usize = 32;

/// Marker type for `ring::hkdf::Prk::expand` — requests 32-byte output.
struct WrappingKeyType;

impl hkdf::KeyType for WrappingKeyType {
    fn len(&self) -> usize {
        WRAPPING_KEY_LEN
    }
}

/// Derive the 256-bit wrapping key from a password and salt.
///
/// The password's UTF-8 bytes are the HKDF input keying material directly —
/// no pre-hashing. Any password is accepted, including empty; strength
/// policy belongs to the caller.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if the salt is not exactly 16
/// bytes or the HKDF expand/fill steps fail.
pub fn derive_wrapping_key(
    password: &str,
    salt: &[u8],
) -> Result<SecretBytes<WRAPPING_KEY_LEN>, CryptoError> {
    if salt.len() != SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "invalid salt length: {} bytes (expected {SALT_LEN})",
            salt.len()
        )));
    }

    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(password.as_bytes());
    let okm = prk
        .expand(&[HKDF_INFO], WrappingKeyType)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".into()))?;

    let mut key_bytes = [0u8; WRAPPING_KEY_LEN];
    okm.fill(&mut key_bytes)
        .map_err(|_| CryptoError::KeyDerivation("HKDF fill failed".into()))?;

    let key = SecretBytes::new(key_bytes);
    key_bytes.zeroize();
    Ok(key)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
