//! Vault error types for `coffer-vault`.

use std::path::PathBuf;

use coffer_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The GCM tag failed while unwrapping the master key. The user retries;
    /// no vault state changes.
    #[error("wrong password")]
    WrongPassword,

    /// Biometric prompt was cancelled or denied. Callers fall back to the
    /// password prompt.
    #[error("biometric authentication failed")]
    AuthenticationFailed,

    /// Biometrics not enrolled or not supported on this device.
    #[error("biometrics unavailable")]
    BiometricsUnavailable,

    /// Unknown vault identifier — programmer error, surfaced as-is.
    #[error("vault not found: {0}")]
    VaultNotFound(String),

    /// Open file handles were detected under the vault folder before a lock.
    #[error("{} file(s) in use under the vault folder", .paths.len())]
    FilesInUse {
        /// The open paths reported by the probe.
        paths: Vec<PathBuf>,
    },

    /// The manifest file exists but cannot be parsed.
    #[error("manifest corrupted: {0}")]
    ManifestCorrupted(String),

    /// A manifest entry's ciphertext file is missing during decryption.
    #[error("encrypted file missing: {0}")]
    EncryptedFileMissing(String),

    /// Encryption primitive failure during a lock pass.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authenticated decryption failure during an unlock pass — malformed
    /// blob, tampered ciphertext, or wrong key.
    #[error("decryption failed")]
    DecryptionFailed,

    /// The OS secret store rejected a write.
    #[error("secret store write failed: {status}")]
    StoreWriteFailed {
        /// Backend status description (numeric codes stay inside here).
        status: String,
    },

    /// The OS secret store rejected a read, including missing entries
    /// (`not-found`).
    #[error("secret store read failed: {status}")]
    StoreReadFailed {
        /// Backend status description.
        status: String,
    },

    /// The OS secret store rejected a delete.
    #[error("secret store delete failed: {status}")]
    StoreDeleteFailed {
        /// Backend status description.
        status: String,
    },

    /// The target volume ran out of space during a pass.
    #[error("insufficient disk space")]
    InsufficientDiskSpace,

    /// The vault folder could not be walked (permissions, I/O).
    #[error("cannot enumerate directory: {0}")]
    CannotEnumerateDirectory(String),

    /// Operation requires a different vault state.
    #[error("vault is {actual}, operation requires {expected}")]
    InvalidState {
        /// The state the operation requires.
        expected: &'static str,
        /// The state the vault is actually in.
        actual: &'static str,
    },

    /// A configured vault already uses this folder path.
    #[error("a vault already exists for folder: {0}")]
    DuplicateFolder(String),

    /// The supplied path is missing or not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Cryptographic operation failed outside the seal/open hot paths.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// True when a store read failed because the entry does not exist.
    ///
    /// Cleanup paths tolerate this; everything else propagates.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StoreReadFailed { status } | Self::StoreDeleteFailed { status }
            if status == "not-found")
    }
}

/// Map an I/O error from a pipeline write, surfacing exhausted disk space
/// as its own kind.
pub(crate) fn map_write_error(err: std::io::Error) -> VaultError {
    if err.raw_os_error() == Some(libc_enospc()) {
        VaultError::InsufficientDiskSpace
    } else {
        VaultError::Io(err)
    }
}

/// ENOSPC without pulling in libc.
const fn libc_enospc() -> i32 {
    28
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_detection() {
        let err = VaultError::StoreReadFailed {
            status: "not-found".into(),
        };
        assert!(err.is_not_found());

        let err = VaultError::StoreReadFailed {
            status: "errSecAuthFailed(-25293)".into(),
        };
        assert!(!err.is_not_found());

        assert!(!VaultError::WrongPassword.is_not_found());
    }

    #[test]
    fn enospc_maps_to_disk_space() {
        let io = std::io::Error::from_raw_os_error(28);
        assert!(matches!(
            map_write_error(io),
            VaultError::InsufficientDiskSpace
        ));

        let io = std::io::Error::from_raw_os_error(13);
        assert!(matches!(map_write_error(io), VaultError::Io(_)));
    }

    #[test]
    fn files_in_use_message_counts_paths() {
        let err = VaultError::FilesInUse {
            paths: vec![PathBuf::from("/v/a.txt"), PathBuf::from("/v/b.txt")],
        };
        assert_eq!(err.to_string(), "2 file(s) in use under the vault folder");
    }
}
