//! Secure memory types for cryptographic key material.
//!
//! Wrappers that zero their contents on drop via [`zeroize`] and mask all
//! `Debug`/`Display` output so key bytes cannot leak through logging or
//! error formatting.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

// ---------------------------------------------------------------------------
// SecretBuffer — variable-length
// ---------------------------------------------------------------------------

/// Variable-length buffer for sensitive data (decrypted plaintext,
/// derived keys).
///
/// Wraps [`SecretSlice<u8>`] from the `secrecy` crate: zeroized on drop,
/// masked `Debug` output (`SecretBuffer(***)`).
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
}

impl SecretBuffer {
    /// Create a new `SecretBuffer` by copying `data`.
    ///
    /// The caller should zeroize the source after calling this.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        Self {
            inner: data.to_vec().into(),
        }
    }

    /// Create a `SecretBuffer` filled with cryptographically random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Rng`] if the OS CSPRNG fails. There is no
    /// fallback source for key material.
    pub fn random(len: usize) -> Result<Self, CryptoError> {
        let mut bytes = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Rng(format!("CSPRNG fill failed: {e}")))?;
        let result = Self::new(&bytes);
        bytes.zeroize();
        Ok(result)
    }

    /// Expose the underlying bytes. Use sparingly — only when the raw bytes
    /// are needed for a cryptographic operation or an I/O write.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Returns the number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// SecretBytes<N> — fixed-size
// ---------------------------------------------------------------------------

/// Fixed-size buffer for keys and other fixed-length secrets.
///
/// Derives `Zeroize` + `ZeroizeOnDrop` so the bytes are securely erased
/// when the value goes out of scope.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> SecretBytes<N> {
    /// Take ownership of `bytes`. The caller should zeroize its own copy.
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Copy from a slice of exactly `N` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if `data` is not exactly
    /// `N` bytes long.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != N {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "expected {N} bytes, got {}",
                data.len()
            )));
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(data);
        Ok(Self { bytes })
    }

    /// Expose the raw bytes for a cryptographic operation.
    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }
}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBytes(***)")
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_roundtrip() {
        let buf = SecretBuffer::new(b"key material");
        assert_eq!(buf.expose(), b"key material");
        assert_eq!(buf.len(), 12);
        assert!(!buf.is_empty());
    }

    #[test]
    fn buffer_debug_is_masked() {
        let buf = SecretBuffer::new(b"top secret");
        assert_eq!(format!("{buf:?}"), "SecretBuffer(***)");
        assert_eq!(format!("{buf}"), "SecretBuffer(***)");
    }

    #[test]
    fn random_buffers_differ() {
        let a = SecretBuffer::random(32).expect("random should succeed");
        let b = SecretBuffer::random(32).expect("random should succeed");
        assert_eq!(a.len(), 32);
        assert_ne!(a.expose(), b.expose());
    }

    #[test]
    fn bytes_from_slice_enforces_length() {
        let ok = SecretBytes::<4>::from_slice(&[1, 2, 3, 4]);
        assert!(ok.is_ok());

        let short = SecretBytes::<4>::from_slice(&[1, 2, 3]);
        assert!(
            matches!(short, Err(CryptoError::InvalidKeyMaterial(_))),
            "short slice should yield CryptoError::InvalidKeyMaterial"
        );
    }

    #[test]
    fn bytes_debug_is_masked() {
        let bytes = SecretBytes::new([0xAB_u8; 8]);
        assert_eq!(format!("{bytes:?}"), "SecretBytes(***)");
    }
}
