//! Vault lifecycle orchestration.
//!
//! The [`VaultManager`] is the single writer of the config document and the
//! only component that drives state transitions. It is an owned value with
//! an explicit lifecycle: construct at startup, drop at shutdown; tests
//! build one per test over an injected config path.
//!
//! Every public operation takes the manager's writer lock for its whole
//! duration, so concurrent invocations serialize. Long passes report
//! progress through a cooperative callback invoked from inside the lock.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use coffer_crypto_core::{SecretBytes, MASTER_KEY_LEN};
use tracing::{info, warn};

use crate::authenticator::Authenticator;
use crate::config::{ConfigStore, GlobalSettings, Vault, VaultConfig, VaultState};
use crate::error::VaultError;
use crate::handles::OpenHandleProbe;
use crate::manifest::has_interrupted_manifest;
use crate::pipeline::{self, ProgressFn};
use crate::util::{generate_vault_id, now_iso8601};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Parameters for [`VaultManager::add_vault`].
pub struct AddVaultRequest<'a> {
    /// Human-readable vault name.
    pub name: &'a str,
    /// Absolute path of the folder to protect.
    pub folder: &'a Path,
    /// The vault password.
    pub password: &'a str,
    /// Whether to store the biometric-gated master-key slot.
    pub use_biometric: bool,
    /// Idle minutes before auto-lock; 0 disables.
    pub auto_lock_minutes: u32,
    /// Run a lock pass immediately after setup.
    pub lock_immediately: bool,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

struct ManagerInner {
    auth: Authenticator,
    config: VaultConfig,
    probe: Box<dyn OpenHandleProbe>,
    store: ConfigStore,
}

/// The vault engine's public surface.
pub struct VaultManager {
    inner: Mutex<ManagerInner>,
}

impl VaultManager {
    /// Construct over a config store, authenticator, and open-handle probe,
    /// loading the persisted vault list.
    pub fn new(
        store: ConfigStore,
        auth: Authenticator,
        probe: Box<dyn OpenHandleProbe>,
    ) -> Result<Self, VaultError> {
        let config = store.load()?;
        info!(vaults = config.vaults.len(), "vault manager started");
        Ok(Self {
            inner: Mutex::new(ManagerInner {
                auth,
                config,
                probe,
                store,
            }),
        })
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, ManagerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- accessors ---------------------------------------------------------

    /// Snapshot of every configured vault.
    #[must_use]
    pub fn vaults(&self) -> Vec<Vault> {
        self.lock_inner().config.vaults.clone()
    }

    /// Snapshot of one vault.
    pub fn vault(&self, id: &str) -> Result<Vault, VaultError> {
        let inner = self.lock_inner();
        let index = find_vault(&inner.config, id)?;
        Ok(inner.config.vaults[index].clone())
    }

    /// Snapshot of the global settings.
    #[must_use]
    pub fn global_settings(&self) -> GlobalSettings {
        self.lock_inner().config.global_settings.clone()
    }

    /// Whether the device could satisfy a biometric unlock.
    #[must_use]
    pub fn biometrics_available(&self) -> bool {
        self.lock_inner().auth.biometrics_available()
    }

    // -- add ---------------------------------------------------------------

    /// Register a new vault over an existing folder.
    ///
    /// Generates the key material, persists the vault in `unlocked` state,
    /// and optionally runs an immediate lock pass with the fresh master key.
    pub fn add_vault(&self, request: &AddVaultRequest<'_>) -> Result<Vault, VaultError> {
        let mut inner = self.lock_inner();

        if !request.folder.is_dir() {
            return Err(VaultError::NotADirectory(
                request.folder.display().to_string(),
            ));
        }
        if inner
            .config
            .vaults
            .iter()
            .any(|v| v.folder_path == request.folder)
        {
            return Err(VaultError::DuplicateFolder(
                request.folder.display().to_string(),
            ));
        }

        let stats = pipeline::folder_stats(request.folder)?;
        let id = generate_vault_id();
        let (master_key, biometric_stored) =
            inner
                .auth
                .setup_vault(&id, request.password, request.use_biometric)?;

        inner.config.vaults.push(Vault {
            auto_lock_minutes: request.auto_lock_minutes,
            created_at: now_iso8601(),
            file_count: stats.file_count,
            folder_path: request.folder.to_path_buf(),
            id: id.clone(),
            last_unlocked_at: None,
            name: request.name.to_owned(),
            state: VaultState::Unlocked,
            total_size: stats.total_size,
            use_touch_id: biometric_stored,
        });
        inner.store.save(&inner.config)?;
        info!(vault_id = %id, name = request.name, "vault added");

        if request.lock_immediately {
            let index = find_vault(&inner.config, &id)?;
            ensure_no_open_handles(&inner, index)?;
            lock_pass(&mut inner, index, &master_key, &mut |_, _| {})?;
        }

        let index = find_vault(&inner.config, &id)?;
        Ok(inner.config.vaults[index].clone())
    }

    // -- lock --------------------------------------------------------------

    /// Encrypt a vault's folder in place.
    ///
    /// Preconditions: the vault exists, is `unlocked`, and no process holds
    /// a file open under its folder. The password is verified before any
    /// state transition, so a wrong password changes nothing.
    pub fn lock_vault(
        &self,
        id: &str,
        password: &str,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vault, VaultError> {
        let mut inner = self.lock_inner();
        let index = find_vault(&inner.config, id)?;
        require_state(&inner.config.vaults[index], VaultState::Unlocked)?;
        ensure_no_open_handles(&inner, index)?;

        let master_key = inner.auth.unlock_with_password(password, id)?;
        lock_pass(&mut inner, index, &master_key, progress)?;
        Ok(inner.config.vaults[index].clone())
    }

    /// Lock every unlocked vault with the shared password.
    ///
    /// Services the auto-lock observer's "lock now" event. The first
    /// failure aborts the iteration.
    pub fn lock_all(&self, password: &str) -> Result<(), VaultError> {
        let ids: Vec<String> = {
            let inner = self.lock_inner();
            inner
                .config
                .vaults
                .iter()
                .filter(|v| v.state == VaultState::Unlocked)
                .map(|v| v.id.clone())
                .collect()
        };

        for id in ids {
            self.lock_vault(&id, password, &mut |_, _| {})?;
        }
        Ok(())
    }

    // -- unlock ------------------------------------------------------------

    /// Decrypt a vault's folder via the biometric path.
    ///
    /// Preconditions: the vault exists and is `locked`.
    pub fn unlock_vault_biometric(
        &self,
        id: &str,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vault, VaultError> {
        let mut inner = self.lock_inner();
        let index = find_vault(&inner.config, id)?;
        require_state(&inner.config.vaults[index], VaultState::Locked)?;

        set_state(&mut inner, index, VaultState::Decrypting)?;

        let name = inner.config.vaults[index].name.clone();
        let master_key = match inner.auth.unlock_with_biometric(id, &name) {
            Ok(key) => key,
            Err(e) => {
                // Authentication failed before the pass began: the folder is
                // untouched, so restore `locked` rather than `error`.
                restore_state_best_effort(&mut inner, index, VaultState::Locked);
                return Err(e);
            }
        };

        unlock_pass(&mut inner, index, &master_key, progress)?;
        Ok(inner.config.vaults[index].clone())
    }

    /// Decrypt a vault's folder via the password path.
    ///
    /// The password is verified *before* the state moves to `decrypting`,
    /// so a wrong password does not drive the vault into
    /// `decrypting`/`error`.
    pub fn unlock_vault_password(
        &self,
        id: &str,
        password: &str,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Vault, VaultError> {
        let mut inner = self.lock_inner();
        let index = find_vault(&inner.config, id)?;
        require_state(&inner.config.vaults[index], VaultState::Locked)?;

        let master_key = inner.auth.unlock_with_password(password, id)?;

        set_state(&mut inner, index, VaultState::Decrypting)?;
        unlock_pass(&mut inner, index, &master_key, progress)?;
        Ok(inner.config.vaults[index].clone())
    }

    // -- remove ------------------------------------------------------------

    /// Remove a vault: unlock it first if locked, delete its secret-store
    /// slots, and drop it from the config.
    ///
    /// A locked vault unlocks through the password path when a password is
    /// provided, the biometric path when the vault has one, and fails
    /// `wrong-password` when neither applies.
    pub fn remove_vault(&self, id: &str, password: Option<&str>) -> Result<(), VaultError> {
        let mut inner = self.lock_inner();
        let index = find_vault(&inner.config, id)?;

        if inner.config.vaults[index].state == VaultState::Locked {
            let master_key = match password {
                Some(password) => inner.auth.unlock_with_password(password, id)?,
                None if inner.config.vaults[index].use_touch_id => {
                    let name = inner.config.vaults[index].name.clone();
                    inner.auth.unlock_with_biometric(id, &name)?
                }
                None => return Err(VaultError::WrongPassword),
            };

            set_state(&mut inner, index, VaultState::Decrypting)?;
            unlock_pass(&mut inner, index, &master_key, &mut |_, _| {})?;
        }

        inner.auth.store().delete_all(id)?;
        inner.config.vaults.retain(|v| v.id != id);
        inner.store.save(&inner.config)?;
        info!(vault_id = id, "vault removed");
        Ok(())
    }

    // -- recovery ----------------------------------------------------------

    /// Identifiers of every configured vault whose folder holds an
    /// unfinished manifest.
    #[must_use]
    pub fn interrupted_vaults(&self) -> Vec<String> {
        let inner = self.lock_inner();
        inner
            .config
            .vaults
            .iter()
            .filter(|v| has_interrupted_manifest(&v.folder_path))
            .map(|v| v.id.clone())
            .collect()
    }

    // -- key management ----------------------------------------------------

    /// Change a vault's password. The master key and the biometric slot are
    /// untouched, so the vault may be in any state.
    pub fn change_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), VaultError> {
        let inner = self.lock_inner();
        find_vault(&inner.config, id)?;
        inner.auth.change_password(id, current_password, new_password)
    }

    /// Enable biometric unlock for a vault.
    pub fn enable_biometric(&self, id: &str, password: &str) -> Result<(), VaultError> {
        let mut inner = self.lock_inner();
        let index = find_vault(&inner.config, id)?;
        inner.auth.enable_biometric(id, password)?;
        inner.config.vaults[index].use_touch_id = true;
        inner.store.save(&inner.config)
    }

    /// Disable biometric unlock for a vault.
    pub fn disable_biometric(&self, id: &str) -> Result<(), VaultError> {
        let mut inner = self.lock_inner();
        let index = find_vault(&inner.config, id)?;
        inner.auth.disable_biometric(id)?;
        inner.config.vaults[index].use_touch_id = false;
        inner.store.save(&inner.config)
    }

    // -- settings ----------------------------------------------------------

    /// Update a vault's name and/or auto-lock idle minutes.
    pub fn update_vault_settings(
        &self,
        id: &str,
        name: Option<&str>,
        auto_lock_minutes: Option<u32>,
    ) -> Result<Vault, VaultError> {
        let mut inner = self.lock_inner();
        let index = find_vault(&inner.config, id)?;
        if let Some(name) = name {
            inner.config.vaults[index].name = name.to_owned();
        }
        if let Some(minutes) = auto_lock_minutes {
            inner.config.vaults[index].auto_lock_minutes = minutes;
        }
        inner.store.save(&inner.config)?;
        Ok(inner.config.vaults[index].clone())
    }

    /// Replace the global settings.
    pub fn update_global_settings(&self, settings: GlobalSettings) -> Result<(), VaultError> {
        let mut inner = self.lock_inner();
        inner.config.global_settings = settings;
        inner.store.save(&inner.config)
    }
}

// ---------------------------------------------------------------------------
// Internal transitions
// ---------------------------------------------------------------------------

fn find_vault(config: &VaultConfig, id: &str) -> Result<usize, VaultError> {
    config
        .vaults
        .iter()
        .position(|v| v.id == id)
        .ok_or_else(|| VaultError::VaultNotFound(id.to_owned()))
}

fn require_state(vault: &Vault, expected: VaultState) -> Result<(), VaultError> {
    if vault.state == expected {
        return Ok(());
    }
    Err(VaultError::InvalidState {
        expected: expected.as_str(),
        actual: vault.state.as_str(),
    })
}

/// Persist a state transition. The config write happens before the caller
/// observes the new state.
fn set_state(
    inner: &mut ManagerInner,
    index: usize,
    state: VaultState,
) -> Result<(), VaultError> {
    inner.config.vaults[index].state = state;
    inner.store.save(&inner.config)
}

/// Best-effort transition used on failure paths; a save error here is
/// secondary and swallowed.
fn restore_state_best_effort(inner: &mut ManagerInner, index: usize, state: VaultState) {
    inner.config.vaults[index].state = state;
    if let Err(e) = inner.store.save(&inner.config) {
        warn!(%e, "failed to persist state transition");
    }
}

/// Lock precondition: no process may hold a file open under the folder.
fn ensure_no_open_handles(inner: &ManagerInner, index: usize) -> Result<(), VaultError> {
    let open = inner
        .probe
        .list_open_files_under(&inner.config.vaults[index].folder_path);
    if open.is_empty() {
        return Ok(());
    }
    Err(VaultError::FilesInUse { paths: open })
}

/// Run an encryption pass: persist `encrypting`, seal the folder, then
/// persist `locked` with stats refreshed from the final manifest.
fn lock_pass(
    inner: &mut ManagerInner,
    index: usize,
    master_key: &SecretBytes<MASTER_KEY_LEN>,
    progress: &mut ProgressFn<'_>,
) -> Result<(), VaultError> {
    let folder: PathBuf = inner.config.vaults[index].folder_path.clone();
    let id = inner.config.vaults[index].id.clone();

    set_state(inner, index, VaultState::Encrypting)?;

    let manifest = match pipeline::encrypt_directory(&folder, &id, master_key, progress) {
        Ok(manifest) => manifest,
        Err(e) => {
            restore_state_best_effort(inner, index, VaultState::Error);
            return Err(e);
        }
    };

    {
        let vault = &mut inner.config.vaults[index];
        vault.state = VaultState::Locked;
        vault.file_count = manifest.files.len() as u64;
        vault.total_size = manifest
            .files
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.original_size));
    }
    inner.store.save(&inner.config)
}

/// Run a decryption pass from the already-persisted `decrypting` state,
/// then persist `unlocked` with stats refreshed from the restored folder.
fn unlock_pass(
    inner: &mut ManagerInner,
    index: usize,
    master_key: &SecretBytes<MASTER_KEY_LEN>,
    progress: &mut ProgressFn<'_>,
) -> Result<(), VaultError> {
    let folder: PathBuf = inner.config.vaults[index].folder_path.clone();
    let id = inner.config.vaults[index].id.clone();

    if let Err(e) = pipeline::decrypt_directory(&folder, &id, master_key, progress) {
        restore_state_best_effort(inner, index, VaultState::Error);
        return Err(e);
    }

    let stats = pipeline::folder_stats(&folder).unwrap_or_default();
    {
        let vault = &mut inner.config.vaults[index];
        vault.state = VaultState::Unlocked;
        vault.file_count = stats.file_count;
        vault.total_size = stats.total_size;
        vault.last_unlocked_at = Some(now_iso8601());
    }
    inner.store.save(&inner.config)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
