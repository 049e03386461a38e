//! The file-tree encrypt/decrypt pipeline.
//!
//! A lock pass enumerates the vault folder, seals every regular file into a
//! sibling `.cfr` blob, and rewrites the manifest after each file so a crash
//! at any point leaves a recoverable record. An unlock pass walks the
//! manifest back, restoring plaintext bytes and permission bits.
//!
//! All file transforms are whole-file in-memory; files larger than
//! available memory are out of scope.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use coffer_crypto_core::{open_combined, seal, SecretBytes, MASTER_KEY_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{map_write_error, VaultError};
use crate::manifest::{self, FileEntry, Manifest, MANIFEST_FILE};

/// Extension of ciphertext files.
pub const CIPHERTEXT_EXT: &str = "cfr";

/// Empty marker file that opts the folder out of desktop indexing.
pub const INDEX_BLOCKER_FILE: &str = ".metadata_never_index";

/// Desktop metadata files skipped everywhere in the tree.
const DESKTOP_METADATA_FILES: &[&str] = &[".DS_Store"];

/// Permission bits assumed when the original file's cannot be read.
const DEFAULT_PERMISSIONS: u32 = 0o644;

/// Secure-delete overwrite chunk size.
const OVERWRITE_CHUNK: usize = 64 * 1024;

/// Progress callback: `(files_done, total)`.
pub type ProgressFn<'a> = dyn FnMut(usize, usize) + 'a;

/// Cached folder statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FolderStats {
    /// Number of regular (non-skipped) files.
    pub file_count: u64,
    /// Sum of their sizes in bytes.
    pub total_size: u64,
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

/// Walk `root` and return every regular file eligible for encryption,
/// sorted lexicographically by absolute path.
///
/// Skipped: symbolic links (never followed), non-regular entries, hidden
/// entries at the top level, the manifest and indexing-blocker files,
/// desktop metadata files, and anything already carrying the `.cfr`
/// extension.
pub fn collect_regular_files(root: &Path) -> Result<Vec<PathBuf>, VaultError> {
    collect_files(root, |path| !is_ciphertext(path) && !is_reserved(path))
}

/// The inverse: just the `.cfr` files, sorted.
pub fn collect_encrypted_files(root: &Path) -> Result<Vec<PathBuf>, VaultError> {
    collect_files(root, |path| is_ciphertext(path))
}

fn collect_files(
    root: &Path,
    keep: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, VaultError> {
    if !root.is_dir() {
        return Err(VaultError::NotADirectory(root.display().to_string()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            // Hidden entries are skipped at the top level only.
            if entry.depth() == 1 && is_hidden(entry.path()) {
                return false;
            }
            true
        });

    for entry in walker {
        let entry = entry.map_err(|e| VaultError::CannotEnumerateDirectory(e.to_string()))?;
        // file_type comes from symlink_metadata: symlinks, devices,
        // sockets, and pipes all report !is_file.
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if keep(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn is_ciphertext(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == CIPHERTEXT_EXT)
}

fn is_reserved(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| {
            name == MANIFEST_FILE
                || name == INDEX_BLOCKER_FILE
                || DESKTOP_METADATA_FILES.contains(&name)
        })
}

/// Path of a file's ciphertext sibling: `a.txt` → `a.txt.cfr`.
#[must_use]
pub fn ciphertext_path(plaintext: &Path) -> PathBuf {
    let mut name = OsString::from(plaintext.as_os_str());
    name.push(".");
    name.push(CIPHERTEXT_EXT);
    PathBuf::from(name)
}

/// Relative path from the vault root, forward-slash separated.
fn relative_path(root: &Path, path: &Path) -> Result<String, VaultError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| VaultError::CannotEnumerateDirectory(path.display().to_string()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Count and size of the regular files under `root`.
pub fn folder_stats(root: &Path) -> Result<FolderStats, VaultError> {
    let files = collect_regular_files(root)?;
    let mut stats = FolderStats {
        file_count: files.len() as u64,
        total_size: 0,
    };
    for path in &files {
        stats.total_size = stats.total_size.saturating_add(file_size(path));
    }
    Ok(stats)
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(unix)]
fn read_permissions(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(DEFAULT_PERMISSIONS)
}

#[cfg(not(unix))]
fn read_permissions(_path: &Path) -> u32 {
    DEFAULT_PERMISSIONS
}

#[cfg(unix)]
fn restore_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        warn!(path = %path.display(), %e, "failed to restore permissions");
    }
}

#[cfg(not(unix))]
fn restore_permissions(_path: &Path, _mode: u32) {}

// ---------------------------------------------------------------------------
// Atomic file writes
// ---------------------------------------------------------------------------

/// Write `bytes` to `path` atomically: hidden temp sibling, fsync, rename.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), VaultError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| VaultError::CannotEnumerateDirectory(path.display().to_string()))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = fs::File::create(&tmp).map_err(map_write_error)?;
    file.write_all(bytes).map_err(map_write_error)?;
    file.sync_all().map_err(map_write_error)?;
    drop(file);

    fs::rename(&tmp, path).map_err(map_write_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Encryption pass (lock)
// ---------------------------------------------------------------------------

/// Seal every regular file under `folder` in place.
///
/// The manifest is written before the first seal and rewritten atomically
/// after each file, so at every quiescent point either the ciphertext
/// exists and its entry reads `is_encrypted = true`, or the plaintext still
/// exists and the entry reads `false`.
///
/// # Errors
///
/// The first per-file failure aborts the pass and propagates; the caller
/// transitions the vault to its error state.
pub fn encrypt_directory(
    folder: &Path,
    vault_id: &str,
    master_key: &SecretBytes<MASTER_KEY_LEN>,
    progress: &mut ProgressFn<'_>,
) -> Result<Manifest, VaultError> {
    let files = collect_regular_files(folder)?;
    let total = files.len();
    info!(vault_id, total, folder = %folder.display(), "encryption pass starting");

    let mut entries = Vec::with_capacity(total);
    for path in &files {
        entries.push(FileEntry::pending(
            relative_path(folder, path)?,
            file_size(path),
            read_permissions(path),
        ));
    }

    let mut manifest = Manifest::begin(vault_id.to_owned(), entries);
    manifest::write_manifest(folder, &manifest)?;

    for (index, path) in files.iter().enumerate() {
        let plaintext = fs::read(path)?;
        let sealed = seal(&plaintext, master_key.expose())
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;
        let combined = sealed.to_bytes();

        atomic_write(&ciphertext_path(path), &combined)?;

        {
            // Entries are index-aligned with the enumeration order.
            let entry = &mut manifest.files[index];
            entry.encrypted_size = combined.len() as u64;
            entry.nonce = sealed.nonce.to_vec();
            entry.tag = sealed.tag.to_vec();
            entry.is_encrypted = true;
        }
        manifest::write_manifest(folder, &manifest)?;

        secure_delete(path);
        progress(index.saturating_add(1), total);
    }

    if let Err(e) = fs::write(folder.join(INDEX_BLOCKER_FILE), []) {
        warn!(%e, "failed to write indexing blocker");
    }

    manifest.complete();
    manifest::write_manifest(folder, &manifest)?;
    info!(vault_id, total, "encryption pass completed");
    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Decryption pass (unlock)
// ---------------------------------------------------------------------------

/// Restore every sealed file recorded in the manifest.
///
/// The manifest is not rewritten during decryption. Entries whose
/// ciphertext is gone but whose plaintext is back in place are treated as
/// already decrypted, which is what lets a second pass resume after a
/// mid-unlock crash.
///
/// # Errors
///
/// Any per-file failure aborts the pass and propagates; the caller
/// transitions the vault to its error state.
pub fn decrypt_directory(
    folder: &Path,
    vault_id: &str,
    master_key: &SecretBytes<MASTER_KEY_LEN>,
    progress: &mut ProgressFn<'_>,
) -> Result<(), VaultError> {
    let manifest = manifest::read_manifest(folder)?;
    if manifest.vault_id != vault_id {
        return Err(VaultError::ManifestCorrupted(format!(
            "manifest belongs to vault {}",
            manifest.vault_id
        )));
    }

    let sealed_entries: Vec<&FileEntry> =
        manifest.files.iter().filter(|e| e.is_encrypted).collect();
    let total = sealed_entries.len();
    info!(vault_id, total, folder = %folder.display(), "decryption pass starting");

    for (index, entry) in sealed_entries.iter().enumerate() {
        let plaintext_path = folder.join(&entry.relative_path);
        let cfr_path = ciphertext_path(&plaintext_path);

        if !cfr_path.exists() {
            if plaintext_path.exists() {
                // Already restored by an interrupted earlier pass.
                debug!(path = %entry.relative_path, "skipping already-decrypted entry");
                progress(index.saturating_add(1), total);
                continue;
            }
            return Err(VaultError::EncryptedFileMissing(entry.relative_path.clone()));
        }

        let combined = fs::read(&cfr_path)?;
        let plaintext = open_combined(&combined, master_key.expose())
            .map_err(|_| VaultError::DecryptionFailed)?;

        atomic_write(&plaintext_path, plaintext.expose())?;
        restore_permissions(&plaintext_path, entry.posix_permissions);
        fs::remove_file(&cfr_path)?;

        progress(index.saturating_add(1), total);
    }

    // Best-effort cleanup: the folder is plaintext again.
    let _ = fs::remove_file(manifest::manifest_path(folder));
    let _ = fs::remove_file(folder.join(INDEX_BLOCKER_FILE));

    info!(vault_id, total, "decryption pass completed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Secure delete
// ---------------------------------------------------------------------------

/// Best-effort secure delete: overwrite with CSPRNG bytes in 64 KiB chunks,
/// flush, unlink. Inadequate on flash and copy-on-write media — advisory
/// only, never a guarantee.
///
/// Any overwrite error still attempts the unlink.
pub fn secure_delete(path: &Path) {
    if let Err(e) = overwrite_with_random(path) {
        warn!(path = %path.display(), %e, "secure overwrite failed; unlinking anyway");
    }
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), %e, "failed to unlink original");
    }
}

fn overwrite_with_random(path: &Path) -> Result<(), std::io::Error> {
    let len = fs::metadata(path)?.len();
    let mut file = fs::OpenOptions::new().write(true).open(path)?;

    let mut chunk = vec![0u8; OVERWRITE_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let take = usize::try_from(remaining.min(OVERWRITE_CHUNK as u64)).unwrap_or(OVERWRITE_CHUNK);
        OsRng.fill_bytes(&mut chunk[..take]);
        file.write_all(&chunk[..take])?;
        remaining = remaining.saturating_sub(take as u64);
    }
    file.sync_all()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
