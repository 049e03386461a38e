//! `coffer-vault` — The COFFER vault engine.
//!
//! Protects designated folders by transforming every regular file in place
//! into an authenticated ciphertext and back, gated by a password and
//! (optionally) a platform biometric authenticator.
//!
//! The engine is UI-free: the graphical shell, onboarding, and the
//! idle/sleep observer drive it exclusively through [`VaultManager`] and
//! the collaborator traits ([`CredentialStore`], [`BiometricEvaluator`],
//! [`OpenHandleProbe`]), so a test harness can drive it identically.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod authenticator;
pub mod biometric;
pub mod config;
pub mod error;
pub mod handles;
pub mod manager;
pub mod manifest;
pub mod pipeline;
pub mod store;

mod util;

pub use authenticator::Authenticator;
pub use biometric::{
    BiometricEvalError, BiometricEvaluator, NullBiometricEvaluator, StaticBiometricEvaluator,
};
pub use config::{ConfigStore, GlobalSettings, Vault, VaultConfig, VaultState, CONFIG_FILE};
pub use error::VaultError;
pub use handles::{LsofProbe, NullProbe, OpenHandleProbe};
pub use manager::{AddVaultRequest, VaultManager};
pub use manifest::{
    has_interrupted_manifest, read_manifest, write_manifest, FileEntry, Manifest, ManifestStatus,
    MANIFEST_FILE, MANIFEST_VERSION,
};
pub use pipeline::{
    collect_encrypted_files, collect_regular_files, decrypt_directory, encrypt_directory,
    folder_stats, secure_delete, FolderStats, ProgressFn, CIPHERTEXT_EXT, INDEX_BLOCKER_FILE,
};
pub use store::{
    AccessPolicy, AuthContext, CredentialError, CredentialStore, KeyringCredentialStore,
    MemoryCredentialStore, SecretStore, SERVICE,
};
pub use util::{generate_vault_id, now_iso8601};
