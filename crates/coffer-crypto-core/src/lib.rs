//! `coffer-crypto-core` — Pure cryptographic primitives for COFFER.
//!
//! This crate is the audit target: zero filesystem access, zero process
//! spawning, zero OS-keychain dependencies. Everything here operates on
//! byte slices and returns owned values.
//!
//! # Key Hierarchy
//!
//! ```text
//! Password ──► HKDF-SHA256 ──► Wrapping Key ──► unwraps ──► Master Key
//!                                                              │
//!                                              AES-256-GCM per file
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod kdf;
pub mod keys;
pub mod keywrap;
pub mod symmetric;

pub use error::CryptoError;
pub use kdf::{derive_wrapping_key, WRAPPING_KEY_LEN};
pub use keys::{generate_master_key, generate_salt, MASTER_KEY_LEN, SALT_LEN};
pub use keywrap::{unwrap_master_key, wrap_master_key};
pub use memory::{SecretBuffer, SecretBytes};
pub use symmetric::{open, open_combined, seal, SealedData, KEY_LEN, NONCE_LEN, TAG_LEN};
