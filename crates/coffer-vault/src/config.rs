//! Vault list and global settings — the persistent configuration.
//!
//! One JSON document (`vaults.json`) in the user-scoped app-data
//! directory, written atomically. The vault manager is the single writer;
//! everything else reads snapshots.
//!
//! Struct fields are declared alphabetically so the pretty-printed output
//! is key-sorted.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VaultError;

/// Config filename inside the app-data directory.
pub const CONFIG_FILE: &str = "vaults.json";

/// App-data directory name under the platform data dir.
const APP_DIR: &str = "coffer";

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Lifecycle state of a vault.
///
/// The `Encrypting`/`Decrypting` intermediates are persisted before a pass
/// runs, so a crash mid-operation leaves the on-disk config flagged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultState {
    /// Folder contents are ciphertext.
    Locked,
    /// Folder contents are plaintext.
    Unlocked,
    /// A lock pass is running.
    Encrypting,
    /// An unlock pass is running.
    Decrypting,
    /// The last pass failed; manual attention needed.
    Error,
}

impl VaultState {
    /// Lowercase name for error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Encrypting => "encrypting",
            Self::Decrypting => "decrypting",
            Self::Error => "error",
        }
    }
}

/// A protected folder plus the metadata required to lock and unlock it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    /// Minutes of idle time before auto-lock; 0 disables.
    pub auto_lock_minutes: u32,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Cached count of regular files (refreshed after each pass).
    pub file_count: u64,
    /// Absolute path of the protected folder.
    pub folder_path: PathBuf,
    /// Stable 128-bit identifier (UUIDv4 string).
    pub id: String,
    /// ISO 8601 timestamp of the last successful unlock.
    pub last_unlocked_at: Option<String>,
    /// Human-readable name.
    pub name: String,
    /// Current lifecycle state.
    pub state: VaultState,
    /// Cached total size of regular files in bytes.
    pub total_size: u64,
    /// Whether the biometric-gated master-key slot exists for this vault.
    #[serde(rename = "useTouchID")]
    pub use_touch_id: bool,
}

/// Application-wide settings persisted alongside the vault list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    /// Lock all vaults when the screen locks.
    pub auto_lock_on_screen_lock: bool,
    /// Lock all vaults when the machine sleeps.
    pub auto_lock_on_sleep: bool,
    /// Default idle minutes for newly added vaults.
    pub default_auto_lock_minutes: u32,
    /// Show the dock icon.
    pub show_dock_icon: bool,
    /// Show the menubar icon.
    pub show_menubar_icon: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            auto_lock_on_screen_lock: true,
            auto_lock_on_sleep: true,
            default_auto_lock_minutes: 5,
            show_dock_icon: true,
            show_menubar_icon: true,
        }
    }
}

/// The persisted document: ordered vault list plus global settings.
///
/// Invariants (enforced by the vault manager): vault identifiers are
/// unique; no two vaults name the same folder path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    /// Global settings.
    pub global_settings: GlobalSettings,
    /// Ordered list of vaults.
    pub vaults: Vec<Vault>,
}

// ---------------------------------------------------------------------------
// Config store
// ---------------------------------------------------------------------------

/// Atomic JSON persistence of [`VaultConfig`] at a fixed path.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at an explicit path. Parent directories are created as needed.
    pub fn at_path(path: PathBuf) -> Result<Self, VaultError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Store at the user-scoped default location
    /// (`{data_dir}/coffer/vaults.json`).
    pub fn at_default_location() -> Result<Self, VaultError> {
        let base = dirs::data_dir().ok_or_else(|| {
            VaultError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no user data directory",
            ))
        })?;
        Self::at_path(base.join(APP_DIR).join(CONFIG_FILE))
    }

    /// The path this store reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config. A missing file yields the empty default.
    pub fn load(&self) -> Result<VaultConfig, VaultError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(VaultConfig::default());
            }
            Err(e) => return Err(VaultError::Io(e)),
        };
        serde_json::from_str(&contents).map_err(|e| {
            VaultError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("config parse failed: {e}"),
            ))
        })
    }

    /// Persist the config atomically: temp sibling, fsync, rename.
    pub fn save(&self, config: &VaultConfig) -> Result<(), VaultError> {
        let json = serde_json::to_string_pretty(config).map_err(|e| {
            VaultError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("config serialize failed: {e}"),
            ))
        })?;

        let tmp = self.path.with_file_name(".vaults.json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        // Owner-only on Unix: the document names every protected folder.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "config saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_vault() -> Vault {
        Vault {
            auto_lock_minutes: 5,
            created_at: "2025-01-02T03:00:00Z".into(),
            file_count: 12,
            folder_path: PathBuf::from("/t/v"),
            id: "12345678-1234-4123-8123-123456789abc".into(),
            last_unlocked_at: None,
            name: "Docs".into(),
            state: VaultState::Unlocked,
            total_size: 4096,
            use_touch_id: true,
        }
    }

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::at_path(dir.path().join("nested/coffer/vaults.json"))
            .expect("store construction should succeed")
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = TempDir::new().expect("tempdir should succeed");
        let store = store_in(&dir);
        let config = store.load().expect("load should succeed");
        assert!(config.vaults.is_empty());
        assert_eq!(config.global_settings, GlobalSettings::default());
    }

    #[test]
    fn construction_creates_parent_dirs() {
        let dir = TempDir::new().expect("tempdir should succeed");
        let store = store_in(&dir);
        assert!(store.path().parent().expect("parent").exists());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().expect("tempdir should succeed");
        let store = store_in(&dir);

        let config = VaultConfig {
            global_settings: GlobalSettings {
                default_auto_lock_minutes: 10,
                ..GlobalSettings::default()
            },
            vaults: vec![sample_vault()],
        };
        store.save(&config).expect("save should succeed");

        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded.vaults.len(), 1);
        assert_eq!(loaded.vaults[0].name, "Docs");
        assert_eq!(loaded.vaults[0].state, VaultState::Unlocked);
        assert_eq!(loaded.global_settings.default_auto_lock_minutes, 10);
    }

    #[test]
    fn json_uses_wire_field_names() {
        let config = VaultConfig {
            global_settings: GlobalSettings::default(),
            vaults: vec![sample_vault()],
        };
        let json = serde_json::to_string_pretty(&config).expect("serialize should succeed");

        for key in [
            "\"globalSettings\"",
            "\"autoLockOnScreenLock\"",
            "\"autoLockOnSleep\"",
            "\"defaultAutoLockMinutes\"",
            "\"showDockIcon\"",
            "\"showMenubarIcon\"",
            "\"autoLockMinutes\"",
            "\"createdAt\"",
            "\"fileCount\"",
            "\"folderPath\"",
            "\"lastUnlockedAt\"",
            "\"totalSize\"",
            "\"useTouchID\"",
        ] {
            assert!(json.contains(key), "missing key {key}");
        }
        assert!(json.contains("\"unlocked\""), "states serialize lowercase");
        assert!(!json.contains("use_touch_id"));
    }

    #[test]
    fn top_level_keys_are_sorted() {
        let json = serde_json::to_string(&VaultConfig::default()).expect("serialize");
        let global = json.find("globalSettings").expect("globalSettings");
        let vaults = json.find("vaults").expect("vaults");
        assert!(global < vaults);
    }

    #[test]
    fn state_names_match_wire_format() {
        for (state, expected) in [
            (VaultState::Locked, "\"locked\""),
            (VaultState::Unlocked, "\"unlocked\""),
            (VaultState::Encrypting, "\"encrypting\""),
            (VaultState::Decrypting, "\"decrypting\""),
            (VaultState::Error, "\"error\""),
        ] {
            assert_eq!(
                serde_json::to_string(&state).expect("serialize"),
                expected
            );
        }
    }

    #[test]
    fn atomic_save_leaves_no_temp_file() {
        let dir = TempDir::new().expect("tempdir should succeed");
        let store = store_in(&dir);
        store.save(&VaultConfig::default()).expect("save should succeed");

        let parent = store.path().parent().expect("parent");
        assert!(!parent.join(".vaults.json.tmp").exists());
        assert!(store.path().exists());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = TempDir::new().expect("tempdir should succeed");
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"vaults":[]}"#).expect("write should succeed");

        let config = store.load().expect("load should succeed");
        assert_eq!(config.global_settings, GlobalSettings::default());
    }

    #[cfg(unix)]
    #[test]
    fn saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir should succeed");
        let store = store_in(&dir);
        store.save(&VaultConfig::default()).expect("save should succeed");

        let mode = fs::metadata(store.path())
            .expect("metadata should succeed")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}
