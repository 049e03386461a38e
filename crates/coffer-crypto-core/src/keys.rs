//! Generation of master keys and salts.
//!
//! Master keys come from the OS CSPRNG with no fallback — a failed draw is
//! fatal. Salts are public values, so a failed CSPRNG draw falls back to the
//! thread-local PRNG rather than aborting vault setup.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::memory::SecretBytes;

/// Master key length in bytes (256 bits).
pub const MASTER_KEY_LEN: usize = 32;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Generate a fresh random 256-bit master key.
///
/// # Errors
///
/// Returns [`CryptoError::Rng`] if the OS CSPRNG fails. Key material has no
/// fallback source.
pub fn generate_master_key() -> Result<SecretBytes<MASTER_KEY_LEN>, CryptoError> {
    let mut bytes = [0u8; MASTER_KEY_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Rng(format!("CSPRNG fill failed: {e}")))?;
    let key = SecretBytes::new(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Generate a fresh random 16-byte salt.
///
/// Salts are stored unprotected alongside the wrapped master key, so a
/// CSPRNG failure falls back to the thread-local PRNG instead of failing
/// vault setup.
#[must_use]
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    if OsRng.try_fill_bytes(&mut salt).is_err() {
        rand::thread_rng().fill_bytes(&mut salt);
    }
    salt
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_keys_are_unique() {
        let a = generate_master_key().expect("generation should succeed");
        let b = generate_master_key().expect("generation should succeed");
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn master_key_is_32_bytes() {
        let key = generate_master_key().expect("generation should succeed");
        assert_eq!(key.expose().len(), MASTER_KEY_LEN);
    }

    #[test]
    fn salts_are_unique() {
        let a = generate_salt();
        let b = generate_salt();
        assert_ne!(a, b);
    }

    #[test]
    fn salt_is_16_bytes() {
        assert_eq!(generate_salt().len(), SALT_LEN);
    }
}
