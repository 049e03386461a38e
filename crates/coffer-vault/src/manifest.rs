//! The per-vault encryption manifest — source of truth for crash recovery.
//!
//! One manifest lives inside each vault folder as
//! `.coffer-manifest.json`. It is rewritten atomically after every sealed
//! file during a lock pass, so at any quiescent point it describes exactly
//! which files are ciphertext and which are still plaintext.
//!
//! Struct fields are declared alphabetically: serde serializes in
//! declaration order, which keeps the pretty-printed JSON key-sorted.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;
use crate::util::now_iso8601;

/// Manifest filename inside the vault folder.
pub const MANIFEST_FILE: &str = ".coffer-manifest.json";

/// Current manifest schema version. A streaming-encryption variant would
/// bump this.
pub const MANIFEST_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Progress state of an encryption pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestStatus {
    /// A lock pass is running (or was killed while running).
    InProgress,
    /// Every entry is sealed and the pass finished.
    Completed,
    /// A pass was explicitly marked as abandoned.
    Interrupted,
}

/// Per-file record in the manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Combined blob size in bytes; 0 until the file is sealed.
    pub encrypted_size: u64,
    /// True once the ciphertext is on disk and this entry's nonce/tag are
    /// recorded.
    pub is_encrypted: bool,
    /// AES-GCM nonce, empty until sealed.
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// Plaintext size in bytes at enumeration time.
    pub original_size: u64,
    /// POSIX permission bits of the original file (e.g. 420 = `0o644`).
    pub posix_permissions: u32,
    /// Path relative to the vault root, forward-slash separated.
    pub relative_path: String,
    /// AES-GCM tag, empty until sealed.
    #[serde(with = "base64_bytes")]
    pub tag: Vec<u8>,
}

impl FileEntry {
    /// Fresh unencrypted entry for a discovered plaintext file.
    #[must_use]
    pub fn pending(relative_path: String, original_size: u64, posix_permissions: u32) -> Self {
        Self {
            encrypted_size: 0,
            is_encrypted: false,
            nonce: Vec::new(),
            original_size,
            posix_permissions,
            relative_path,
            tag: Vec::new(),
        }
    }
}

/// The manifest document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Set when the pass finished; `None` while in progress.
    pub completed_at: Option<String>,
    /// One entry per regular file discovered at enumeration time, ordered
    /// lexicographically by relative path.
    pub files: Vec<FileEntry>,
    /// When the pass began.
    pub started_at: String,
    /// Progress state.
    pub status: ManifestStatus,
    /// Identifier of the owning vault.
    #[serde(rename = "vaultID")]
    pub vault_id: String,
    /// Schema version.
    pub version: u32,
}

impl Manifest {
    /// New in-progress manifest for the given vault and entries.
    #[must_use]
    pub fn begin(vault_id: String, files: Vec<FileEntry>) -> Self {
        Self {
            completed_at: None,
            files,
            started_at: now_iso8601(),
            status: ManifestStatus::InProgress,
            vault_id,
            version: MANIFEST_VERSION,
        }
    }

    /// Mark the pass finished: every entry sealed, completion stamped.
    pub fn complete(&mut self) {
        self.status = ManifestStatus::Completed;
        self.completed_at = Some(now_iso8601());
    }
}

// ---------------------------------------------------------------------------
// I/O
// ---------------------------------------------------------------------------

/// Path of the manifest inside `folder`.
#[must_use]
pub fn manifest_path(folder: &Path) -> std::path::PathBuf {
    folder.join(MANIFEST_FILE)
}

/// Write the manifest atomically: temp sibling, flush, rename.
pub fn write_manifest(folder: &Path, manifest: &Manifest) -> Result<(), VaultError> {
    let path = manifest_path(folder);
    let tmp = folder.join(".coffer-manifest.json.tmp");

    let json = serde_json::to_string_pretty(manifest)
        .map_err(|e| VaultError::ManifestCorrupted(format!("serialize: {e}")))?;

    let mut file = fs::File::create(&tmp).map_err(crate::error::map_write_error)?;
    file.write_all(json.as_bytes())
        .map_err(crate::error::map_write_error)?;
    file.sync_all().map_err(crate::error::map_write_error)?;
    drop(file);

    fs::rename(&tmp, &path).map_err(crate::error::map_write_error)?;
    Ok(())
}

/// Read and parse the manifest.
///
/// # Errors
///
/// [`VaultError::Io`] when the file is missing or unreadable;
/// [`VaultError::ManifestCorrupted`] when it exists but does not parse.
pub fn read_manifest(folder: &Path) -> Result<Manifest, VaultError> {
    let contents = fs::read_to_string(manifest_path(folder))?;
    serde_json::from_str(&contents).map_err(|e| VaultError::ManifestCorrupted(e.to_string()))
}

/// True iff a manifest exists and records an unfinished pass.
///
/// A corrupt manifest also counts as interrupted: the folder needs
/// attention either way.
#[must_use]
pub fn has_interrupted_manifest(folder: &Path) -> bool {
    if !manifest_path(folder).exists() {
        return false;
    }
    match read_manifest(folder) {
        Ok(manifest) => matches!(
            manifest.status,
            ManifestStatus::InProgress | ManifestStatus::Interrupted
        ),
        Err(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Base64 codec for binary fields
// ---------------------------------------------------------------------------

mod base64_bytes {
    use data_encoding::BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
