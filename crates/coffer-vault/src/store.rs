//! Per-vault secret persistence in an OS credential store.
//!
//! Three keyed slots per vault identifier:
//! - *master-key* — raw 32-byte key, biometric-gated
//! - *salt* — 16 random bytes, not gated
//! - *wrapped-master-key* — AES-GCM sealed master key, not gated
//!
//! The invariant maintained by the vault manager: whenever a vault exists in
//! the config, *salt* and *wrapped-master-key* exist here; *master-key*
//! exists iff the vault's biometric flag is set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use coffer_crypto_core::{SecretBytes, MASTER_KEY_LEN, SALT_LEN};
use tracing::debug;

use crate::error::VaultError;

/// Keychain service namespace for all COFFER entries.
pub const SERVICE: &str = "com.loganross.coffer";

/// Account-name prefix for the biometric-gated raw master key.
const ACCOUNT_MASTER_KEY: &str = "masterKey";

/// Account-name prefix for the per-vault salt.
const ACCOUNT_SALT: &str = "salt";

/// Account-name prefix for the password-wrapped master key.
const ACCOUNT_WRAPPED: &str = "masterKey.wrapped";

// ---------------------------------------------------------------------------
// Access policy & authentication context
// ---------------------------------------------------------------------------

/// Access-control policy applied when writing a credential entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Requires the currently enrolled biometric set, device unlocked, this
    /// device only. Rotating the enrolled biometrics invalidates the entry.
    BiometricCurrentSet,
    /// Device unlocked, this device only. No biometric gating.
    DeviceUnlocked,
}

/// Evidence of a successful biometric evaluation.
///
/// Passing one to a biometric-gated read tells the store the user was
/// already prompted, so the OS does not prompt again. The OS-side policy is
/// the real gate; this value is just the handle the platform hands back.
#[derive(Clone, Debug, Default)]
pub struct AuthContext {
    _priv: (),
}

impl AuthContext {
    /// Construct a context. Produced by a biometric evaluator after a
    /// successful policy evaluation.
    #[must_use]
    pub const fn new() -> Self {
        Self { _priv: () }
    }
}

// ---------------------------------------------------------------------------
// Credential store trait
// ---------------------------------------------------------------------------

/// Backend errors, mapped onto `VaultError::Store*Failed` by [`SecretStore`].
#[derive(Debug)]
pub enum CredentialError {
    /// No entry under this account.
    NotFound,
    /// The platform denied access (locked device, biometric set rotated).
    AccessDenied(String),
    /// Any other backend failure.
    Backend(String),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not-found"),
            Self::AccessDenied(status) => write!(f, "access-denied({status})"),
            Self::Backend(status) => write!(f, "{status}"),
        }
    }
}

/// CRUD over `(service, account)` pairs with access-control flags.
///
/// This is the external collaborator boundary: the default backend is the
/// OS keychain, the test harness injects [`MemoryCredentialStore`].
pub trait CredentialStore: Send + Sync {
    /// Insert `value` under `account`. The entry must not already exist —
    /// [`SecretStore`] deletes first to get upsert semantics.
    fn store(
        &self,
        account: &str,
        value: &[u8],
        policy: AccessPolicy,
    ) -> Result<(), CredentialError>;

    /// Read the value under `account`.
    ///
    /// A biometric-gated entry read without a context triggers the
    /// platform's own prompt; with a context, no re-prompt occurs.
    fn retrieve(
        &self,
        account: &str,
        context: Option<&AuthContext>,
    ) -> Result<Vec<u8>, CredentialError>;

    /// Delete the entry under `account`.
    fn delete(&self, account: &str) -> Result<(), CredentialError>;
}

/// Shared backends work directly: harnesses keep a handle for simulation
/// hooks while the engine owns its own.
impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    fn store(
        &self,
        account: &str,
        value: &[u8],
        policy: AccessPolicy,
    ) -> Result<(), CredentialError> {
        (**self).store(account, value, policy)
    }

    fn retrieve(
        &self,
        account: &str,
        context: Option<&AuthContext>,
    ) -> Result<Vec<u8>, CredentialError> {
        (**self).retrieve(account, context)
    }

    fn delete(&self, account: &str) -> Result<(), CredentialError> {
        (**self).delete(account)
    }
}

// ---------------------------------------------------------------------------
// Secret store — the six slot operations
// ---------------------------------------------------------------------------

/// Typed slot operations over a [`CredentialStore`] backend.
pub struct SecretStore {
    backend: Box<dyn CredentialStore>,
}

impl SecretStore {
    /// Wrap a backend.
    #[must_use]
    pub fn new(backend: Box<dyn CredentialStore>) -> Self {
        Self { backend }
    }

    /// Construct over the OS keychain backend.
    #[must_use]
    pub fn with_keyring() -> Self {
        Self::new(Box::new(KeyringCredentialStore::new(SERVICE)))
    }

    fn account(prefix: &str, vault_id: &str) -> String {
        format!("{prefix}.{vault_id}")
    }

    /// Upsert: delete any existing entry first, then insert.
    fn upsert(
        &self,
        account: &str,
        value: &[u8],
        policy: AccessPolicy,
    ) -> Result<(), VaultError> {
        match self.backend.delete(account) {
            Ok(()) | Err(CredentialError::NotFound) => {}
            Err(e) => {
                return Err(VaultError::StoreWriteFailed {
                    status: e.to_string(),
                })
            }
        }
        self.backend
            .store(account, value, policy)
            .map_err(|e| VaultError::StoreWriteFailed {
                status: e.to_string(),
            })?;
        debug!(account, "stored secret-store entry");
        Ok(())
    }

    fn read(
        &self,
        account: &str,
        context: Option<&AuthContext>,
    ) -> Result<Vec<u8>, VaultError> {
        self.backend
            .retrieve(account, context)
            .map_err(|e| VaultError::StoreReadFailed {
                status: e.to_string(),
            })
    }

    fn remove(&self, account: &str) -> Result<(), VaultError> {
        self.backend
            .delete(account)
            .map_err(|e| match e {
                CredentialError::NotFound => VaultError::StoreDeleteFailed {
                    status: "not-found".into(),
                },
                other => VaultError::StoreDeleteFailed {
                    status: other.to_string(),
                },
            })
    }

    // -- master-key slot (biometric-gated) ---------------------------------

    /// Store the raw master key under biometric access control.
    pub fn store_master_key(&self, key: &[u8], vault_id: &str) -> Result<(), VaultError> {
        self.upsert(
            &Self::account(ACCOUNT_MASTER_KEY, vault_id),
            key,
            AccessPolicy::BiometricCurrentSet,
        )
    }

    /// Retrieve the raw master key. With a context from a prior successful
    /// biometric evaluation the platform does not re-prompt.
    pub fn retrieve_master_key(
        &self,
        vault_id: &str,
        context: Option<&AuthContext>,
    ) -> Result<SecretBytes<MASTER_KEY_LEN>, VaultError> {
        let mut bytes = self.read(&Self::account(ACCOUNT_MASTER_KEY, vault_id), context)?;
        let key = SecretBytes::from_slice(&bytes).map_err(|_| VaultError::StoreReadFailed {
            status: "corrupt-master-key".into(),
        });
        zeroize::Zeroize::zeroize(&mut bytes);
        key
    }

    /// Delete the raw master key slot.
    pub fn delete_master_key(&self, vault_id: &str) -> Result<(), VaultError> {
        self.remove(&Self::account(ACCOUNT_MASTER_KEY, vault_id))
    }

    // -- salt slot ---------------------------------------------------------

    /// Store the per-vault salt (no biometric gating).
    pub fn store_salt(&self, salt: &[u8], vault_id: &str) -> Result<(), VaultError> {
        self.upsert(
            &Self::account(ACCOUNT_SALT, vault_id),
            salt,
            AccessPolicy::DeviceUnlocked,
        )
    }

    /// Retrieve the per-vault salt.
    pub fn retrieve_salt(&self, vault_id: &str) -> Result<[u8; SALT_LEN], VaultError> {
        let bytes = self.read(&Self::account(ACCOUNT_SALT, vault_id), None)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::StoreReadFailed {
                status: "corrupt-salt".into(),
            })
    }

    /// Delete the salt slot.
    pub fn delete_salt(&self, vault_id: &str) -> Result<(), VaultError> {
        self.remove(&Self::account(ACCOUNT_SALT, vault_id))
    }

    // -- wrapped-master-key slot -------------------------------------------

    /// Store the password-wrapped master key blob (no biometric gating).
    pub fn store_wrapped_master_key(
        &self,
        wrapped: &[u8],
        vault_id: &str,
    ) -> Result<(), VaultError> {
        self.upsert(
            &Self::account(ACCOUNT_WRAPPED, vault_id),
            wrapped,
            AccessPolicy::DeviceUnlocked,
        )
    }

    /// Retrieve the wrapped master key blob.
    pub fn retrieve_wrapped_master_key(&self, vault_id: &str) -> Result<Vec<u8>, VaultError> {
        self.read(&Self::account(ACCOUNT_WRAPPED, vault_id), None)
    }

    /// Delete the wrapped-master-key slot.
    pub fn delete_wrapped_master_key(&self, vault_id: &str) -> Result<(), VaultError> {
        self.remove(&Self::account(ACCOUNT_WRAPPED, vault_id))
    }

    // -- cleanup -----------------------------------------------------------

    /// Remove all three slots for a vault, tolerating per-slot "not found".
    pub fn delete_all(&self, vault_id: &str) -> Result<(), VaultError> {
        for result in [
            self.delete_master_key(vault_id),
            self.delete_salt(vault_id),
            self.delete_wrapped_master_key(vault_id),
        ] {
            match result {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        debug!(vault_id, "deleted all secret-store slots");
        Ok(())
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretStore")
    }
}

// ---------------------------------------------------------------------------
// Keyring backend
// ---------------------------------------------------------------------------

/// OS keychain backend:
/// - macOS: Keychain Services; `BiometricCurrentSet` entries are written
///   through Security.framework with a `BIOMETRY_CURRENT_SET` access
///   control, so the OS itself gates reads on the enrolled biometric set
///   and invalidates the entry when that set changes.
/// - Linux (Secret Service) / Windows (Credential Manager): entries gate on
///   the unlocked login session only. Neither backend can express a
///   biometric ACL, so a `BiometricCurrentSet` write is refused rather than
///   silently stored ungated — on those platforms the evaluator reports
///   biometrics unavailable and the slot is never requested.
///
/// Ungated entries go through the `keyring` crate on every platform.
/// Entries are always scoped to this device (no iCloud/roaming sync).
pub struct KeyringCredentialStore {
    service: &'static str,
}

impl KeyringCredentialStore {
    /// Backend over the given keychain service namespace.
    #[must_use]
    pub const fn new(service: &'static str) -> Self {
        Self { service }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(self.service, account)
            .map_err(|e| CredentialError::Backend(format!("entry creation: {e}")))
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn store(
        &self,
        account: &str,
        value: &[u8],
        policy: AccessPolicy,
    ) -> Result<(), CredentialError> {
        if policy == AccessPolicy::BiometricCurrentSet {
            #[cfg(target_os = "macos")]
            return macos_acl::store_gated(self.service, account, value);

            #[cfg(not(target_os = "macos"))]
            return Err(CredentialError::Backend(
                "biometric access control is not supported by this platform's keychain".into(),
            ));
        }

        self.entry(account)?
            .set_secret(value)
            .map_err(|e| CredentialError::Backend(format!("set: {e}")))
    }

    fn retrieve(
        &self,
        account: &str,
        _context: Option<&AuthContext>,
    ) -> Result<Vec<u8>, CredentialError> {
        // Gated and ungated entries share the generic-password namespace,
        // so one read path serves both. Reading an ACL'd item makes the OS
        // enforce its policy: it reuses a recent successful biometric
        // evaluation, or prompts when there is none.
        match self.entry(account)?.get_secret() {
            Ok(bytes) => Ok(bytes),
            Err(keyring::Error::NoEntry) => Err(CredentialError::NotFound),
            Err(e) => Err(CredentialError::Backend(format!("get: {e}"))),
        }
    }

    fn delete(&self, account: &str) -> Result<(), CredentialError> {
        match self.entry(account)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Err(CredentialError::NotFound),
            Err(e) => Err(CredentialError::Backend(format!("delete: {e}"))),
        }
    }
}

/// Security.framework writes for biometric-gated entries.
///
/// The `keyring` crate cannot attach access-control flags, so gated writes
/// bypass it and create the generic-password item directly with a
/// `BIOMETRY_CURRENT_SET` ACL. The item lands in the same
/// `(service, account)` namespace `keyring` addresses, so reads and deletes
/// keep going through the common path above.
#[cfg(target_os = "macos")]
mod macos_acl {
    use security_framework::passwords::{delete_generic_password, set_generic_password_options};
    use security_framework::passwords_options::{AccessControlOptions, PasswordOptions};

    use super::CredentialError;

    pub(super) fn store_gated(
        service: &str,
        account: &str,
        value: &[u8],
    ) -> Result<(), CredentialError> {
        // Idempotent: clear any previous item before attaching the ACL.
        let _ = delete_generic_password(service, account);

        let mut options = PasswordOptions::new_generic_password(service, account);
        options.set_access_control_options(AccessControlOptions::BIOMETRY_CURRENT_SET);

        set_generic_password_options(value, options)
            .map_err(|e| CredentialError::Backend(format!("keychain add failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// In-memory backend (test harness)
// ---------------------------------------------------------------------------

/// In-memory backend with full access-policy simulation.
///
/// Simulates the behaviors the engine's tests need from a real platform
/// store: biometric-gated entries become unreadable after
/// [`rotate_biometrics`](Self::rotate_biometrics), and reads of gated
/// entries without an [`AuthContext`] are counted as system prompts.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, MemoryEntry>,
    /// Bumped by `rotate_biometrics`; gated entries remember the epoch they
    /// were written under.
    biometric_epoch: u32,
    prompt_count: u32,
}

struct MemoryEntry {
    value: Vec<u8>,
    policy: AccessPolicy,
    written_epoch: u32,
}

impl MemoryCredentialStore {
    /// Fresh empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the user re-enrolling biometrics: every entry written under
    /// `BiometricCurrentSet` becomes unreadable (treated as absent).
    pub fn rotate_biometrics(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.biometric_epoch = inner.biometric_epoch.saturating_add(1);
    }

    /// Number of gated reads performed without an authentication context,
    /// i.e. how many times the platform would have prompted.
    #[must_use]
    pub fn prompt_count(&self) -> u32 {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .prompt_count
    }

    /// True if any entry exists under `account` (policy-blind; test hook).
    #[must_use]
    pub fn contains(&self, account: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .contains_key(account)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn store(
        &self,
        account: &str,
        value: &[u8],
        policy: AccessPolicy,
    ) -> Result<(), CredentialError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.entries.contains_key(account) {
            return Err(CredentialError::Backend("duplicate entry".into()));
        }
        let written_epoch = inner.biometric_epoch;
        inner.entries.insert(
            account.to_owned(),
            MemoryEntry {
                value: value.to_vec(),
                policy,
                written_epoch,
            },
        );
        Ok(())
    }

    fn retrieve(
        &self,
        account: &str,
        context: Option<&AuthContext>,
    ) -> Result<Vec<u8>, CredentialError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let epoch = inner.biometric_epoch;
        let Some(entry) = inner.entries.get(account) else {
            return Err(CredentialError::NotFound);
        };

        if entry.policy == AccessPolicy::BiometricCurrentSet {
            // Rotated biometric set invalidates the slot: treated as absent.
            if entry.written_epoch != epoch {
                return Err(CredentialError::NotFound);
            }
            let value = entry.value.clone();
            if context.is_none() {
                inner.prompt_count = inner.prompt_count.saturating_add(1);
            }
            return Ok(value);
        }

        Ok(entry.value.clone())
    }

    fn delete(&self, account: &str) -> Result<(), CredentialError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match inner.entries.remove(account) {
            Some(_) => Ok(()),
            None => Err(CredentialError::NotFound),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VAULT_ID: &str = "11111111-2222-4333-8444-555555555555";

    fn memory_store() -> SecretStore {
        SecretStore::new(Box::new(MemoryCredentialStore::new()))
    }

    #[test]
    fn salt_roundtrip() {
        let store = memory_store();
        let salt = [0x5A_u8; SALT_LEN];
        store.store_salt(&salt, VAULT_ID).expect("store should succeed");
        let read = store.retrieve_salt(VAULT_ID).expect("retrieve should succeed");
        assert_eq!(read, salt);
    }

    #[test]
    fn missing_entry_is_not_found_error() {
        let store = memory_store();
        let result = store.retrieve_salt(VAULT_ID);
        assert!(
            result.as_ref().is_err_and(VaultError::is_not_found),
            "missing salt should read as not-found, got {result:?}"
        );
    }

    #[test]
    fn writes_are_upsert() {
        let store = memory_store();
        store.store_salt(&[0x01; SALT_LEN], VAULT_ID).expect("first store");
        store.store_salt(&[0x02; SALT_LEN], VAULT_ID).expect("second store");
        let read = store.retrieve_salt(VAULT_ID).expect("retrieve should succeed");
        assert_eq!(read, [0x02; SALT_LEN]);
    }

    #[test]
    fn master_key_roundtrip_with_context() {
        let store = memory_store();
        store
            .store_master_key(&[0xAB; MASTER_KEY_LEN], VAULT_ID)
            .expect("store should succeed");
        let ctx = AuthContext::new();
        let key = store
            .retrieve_master_key(VAULT_ID, Some(&ctx))
            .expect("retrieve should succeed");
        assert_eq!(key.expose(), &[0xAB; MASTER_KEY_LEN]);
    }

    #[test]
    fn gated_read_without_context_counts_a_prompt() {
        let backend = MemoryCredentialStore::new();
        backend
            .store("masterKey.x", &[0u8; 32], AccessPolicy::BiometricCurrentSet)
            .expect("store should succeed");

        backend.retrieve("masterKey.x", None).expect("retrieve should succeed");
        assert_eq!(backend.prompt_count(), 1);

        let ctx = AuthContext::new();
        backend
            .retrieve("masterKey.x", Some(&ctx))
            .expect("retrieve should succeed");
        assert_eq!(backend.prompt_count(), 1, "context read must not prompt");
    }

    #[test]
    fn biometric_rotation_invalidates_gated_slot_only() {
        let backend = MemoryCredentialStore::new();
        backend
            .store("masterKey.x", &[0u8; 32], AccessPolicy::BiometricCurrentSet)
            .expect("store should succeed");
        backend
            .store("salt.x", &[1u8; 16], AccessPolicy::DeviceUnlocked)
            .expect("store should succeed");

        backend.rotate_biometrics();

        assert!(
            matches!(
                backend.retrieve("masterKey.x", None),
                Err(CredentialError::NotFound)
            ),
            "rotated gated slot must read as absent"
        );
        assert!(backend.retrieve("salt.x", None).is_ok());
    }

    #[test]
    fn delete_all_tolerates_missing_slots() {
        let store = memory_store();
        // Only the salt exists; master-key and wrapped are absent.
        store.store_salt(&[0x01; SALT_LEN], VAULT_ID).expect("store should succeed");
        store.delete_all(VAULT_ID).expect("delete_all should succeed");
        assert!(store.retrieve_salt(VAULT_ID).is_err());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn keyring_backend_refuses_gated_writes_it_cannot_enforce() {
        // Refused before any keychain access, so this is safe in CI.
        let backend = KeyringCredentialStore::new(SERVICE);
        let result = backend.store("masterKey.x", &[0u8; 32], AccessPolicy::BiometricCurrentSet);
        assert!(
            matches!(result, Err(CredentialError::Backend(_))),
            "ungated storage of a gated slot must be refused"
        );
    }

    #[test]
    fn corrupt_master_key_length_is_read_failure() {
        let backend = MemoryCredentialStore::new();
        backend
            .store(
                &format!("masterKey.{VAULT_ID}"),
                &[0u8; 16],
                AccessPolicy::BiometricCurrentSet,
            )
            .expect("store should succeed");
        let store = SecretStore::new(Box::new(backend));
        assert!(matches!(
            store.retrieve_master_key(VAULT_ID, None),
            Err(VaultError::StoreReadFailed { .. })
        ));
    }
}
