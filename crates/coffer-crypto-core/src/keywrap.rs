//! Master-key wrap / unwrap.
//!
//! The vault master key is persisted in two forms: raw (biometric-gated OS
//! slot) and wrapped — the 32 key bytes sealed with the password-derived
//! wrapping key. Unwrap failure is the sole wrong-password signal.

use crate::error::CryptoError;
use crate::kdf::WRAPPING_KEY_LEN;
use crate::keys::MASTER_KEY_LEN;
use crate::memory::SecretBytes;
use crate::symmetric::{self, SealedData};

/// Wrap a master key with the password-derived wrapping key.
///
/// The sealed output is what the secret store persists as
/// *wrapped-master-key*.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if either key is not exactly
/// 32 bytes, or [`CryptoError::Encryption`] if sealing fails.
pub fn wrap_master_key(
    master_key: &[u8],
    wrapping_key: &[u8],
) -> Result<SealedData, CryptoError> {
    if master_key.len() != MASTER_KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid master key length: {} bytes (expected {MASTER_KEY_LEN})",
            master_key.len()
        )));
    }
    if wrapping_key.len() != WRAPPING_KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid wrapping key length: {} bytes (expected {WRAPPING_KEY_LEN})",
            wrapping_key.len()
        )));
    }

    symmetric::seal(master_key, wrapping_key)
}

/// Unwrap a sealed master key blob with the wrapping key.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] if the blob is malformed or the
/// wrapping key is wrong — the caller reports this as wrong-password.
pub fn unwrap_master_key(
    wrapped: &[u8],
    wrapping_key: &[u8],
) -> Result<SecretBytes<MASTER_KEY_LEN>, CryptoError> {
    if wrapping_key.len() != WRAPPING_KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid wrapping key length: {} bytes (expected {WRAPPING_KEY_LEN})",
            wrapping_key.len()
        )));
    }

    let master = symmetric::open_combined(wrapped, wrapping_key)?;
    // A well-formed wrapped blob always holds exactly 32 bytes; anything
    // else means the blob was not produced by wrap_master_key.
    SecretBytes::from_slice(master.expose()).map_err(|_| CryptoError::Decryption)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
