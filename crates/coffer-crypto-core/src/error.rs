//! Cryptographic error types for `coffer-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (HKDF expand/fill).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure (AES-256-GCM seal path).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authenticated decryption failed — malformed blob, tampered data, or
    /// wrong key. Deliberately carries no detail: this single variant is the
    /// wrong-password detector and must not leak which check failed.
    #[error("decryption failed")]
    Decryption,

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The OS CSPRNG failed while generating key material. Fatal — keys and
    /// nonces have no fallback source.
    #[error("random generation failed: {0}")]
    Rng(String),
}
