//! Authentication ceremonies — the key-hierarchy half of the engine.
//!
//! Combines the secret store and a biometric evaluator to turn either a
//! password or a successful biometric evaluation into a usable master key:
//!
//! ```text
//! password  ──► salt + HKDF ──► wrapping key ──► unwrap ──► master key
//! biometric ──► evaluate ──► gated store read ───────────► master key
//! ```

use coffer_crypto_core::{
    derive_wrapping_key, generate_master_key, generate_salt, unwrap_master_key, wrap_master_key,
    SecretBytes, MASTER_KEY_LEN,
};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::biometric::{BiometricEvalError, BiometricEvaluator};
use crate::error::VaultError;
use crate::store::SecretStore;

/// Secret-store plus biometric-evaluator ceremonies.
///
/// Owns the only two collaborators that hold key material. Every public
/// method returns the master key directly; callers hand it to the file
/// pipeline and drop it when the pass completes.
pub struct Authenticator {
    store: SecretStore,
    evaluator: Box<dyn BiometricEvaluator>,
    /// Sampled at construction; see [`BiometricEvaluator::biometrics_available`].
    biometrics_available: bool,
}

impl Authenticator {
    /// Construct over a secret store and evaluator.
    #[must_use]
    pub fn new(store: SecretStore, evaluator: Box<dyn BiometricEvaluator>) -> Self {
        let biometrics_available = evaluator.biometrics_available();
        Self {
            store,
            evaluator,
            biometrics_available,
        }
    }

    /// Whether the device could satisfy a biometric unlock when this
    /// authenticator was constructed.
    #[must_use]
    pub const fn biometrics_available(&self) -> bool {
        self.biometrics_available
    }

    /// The underlying secret store (for the manager's cleanup paths).
    #[must_use]
    pub const fn store(&self) -> &SecretStore {
        &self.store
    }

    // -- biometric path ----------------------------------------------------

    /// Unlock the master key via the platform biometric prompt.
    ///
    /// # Errors
    ///
    /// [`VaultError::BiometricsUnavailable`] when hardware is absent or
    /// nothing is enrolled; [`VaultError::AuthenticationFailed`] for every
    /// cancelled or denied evaluation.
    pub fn unlock_with_biometric(
        &self,
        vault_id: &str,
        vault_name: &str,
    ) -> Result<SecretBytes<MASTER_KEY_LEN>, VaultError> {
        let reason = format!("unlock the vault \u{201c}{vault_name}\u{201d}");
        let context = self.evaluator.evaluate(&reason).map_err(|e| match e {
            BiometricEvalError::NotAvailable | BiometricEvalError::NotEnrolled => {
                VaultError::BiometricsUnavailable
            }
            BiometricEvalError::UserCancel
            | BiometricEvalError::AppCancel
            | BiometricEvalError::SystemCancel => VaultError::AuthenticationFailed,
            BiometricEvalError::Other(msg) => {
                warn!(vault_id, %msg, "biometric evaluation failed");
                VaultError::AuthenticationFailed
            }
        })?;

        // The context proves evaluation succeeded; the store must not
        // trigger a second prompt.
        let key = self.store.retrieve_master_key(vault_id, Some(&context))?;
        debug!(vault_id, "biometric unlock succeeded");
        Ok(key)
    }

    // -- password path -----------------------------------------------------

    /// Unlock the master key from a password.
    ///
    /// # Errors
    ///
    /// Every failure of the retrieve → derive → unwrap chain is reported as
    /// [`VaultError::WrongPassword`]; which step failed must not leak.
    pub fn unlock_with_password(
        &self,
        password: &str,
        vault_id: &str,
    ) -> Result<SecretBytes<MASTER_KEY_LEN>, VaultError> {
        self.unlock_with_password_inner(password, vault_id)
            .map_err(|_| {
                debug!(vault_id, "password unlock rejected");
                VaultError::WrongPassword
            })
    }

    fn unlock_with_password_inner(
        &self,
        password: &str,
        vault_id: &str,
    ) -> Result<SecretBytes<MASTER_KEY_LEN>, VaultError> {
        let salt = self.store.retrieve_salt(vault_id)?;
        let mut wrapped = self.store.retrieve_wrapped_master_key(vault_id)?;
        let wrapping_key = derive_wrapping_key(password, &salt)?;
        let key = unwrap_master_key(&wrapped, wrapping_key.expose())?;
        wrapped.zeroize();
        Ok(key)
    }

    // -- vault setup -------------------------------------------------------

    /// Create the key material for a new vault and persist it.
    ///
    /// Generates a fresh master key and salt, wraps the master key under the
    /// password-derived wrapping key, and stores *salt* and
    /// *wrapped-master-key* unconditionally. When `enable_biometric` is set
    /// and the device is capable, the raw master key is additionally stored
    /// under biometric access control.
    ///
    /// Returns the master key so the caller can proceed directly to an
    /// immediate lock, plus whether the biometric slot was actually written.
    pub fn setup_vault(
        &self,
        vault_id: &str,
        password: &str,
        enable_biometric: bool,
    ) -> Result<(SecretBytes<MASTER_KEY_LEN>, bool), VaultError> {
        let master_key = generate_master_key()?;
        let salt = generate_salt();

        let wrapping_key = derive_wrapping_key(password, &salt)?;
        let wrapped = wrap_master_key(master_key.expose(), wrapping_key.expose())?;

        self.store.store_salt(&salt, vault_id)?;
        self.store
            .store_wrapped_master_key(&wrapped.to_bytes(), vault_id)?;

        let biometric_stored = if enable_biometric && self.biometrics_available {
            self.store.store_master_key(master_key.expose(), vault_id)?;
            true
        } else {
            false
        };

        info!(vault_id, biometric_stored, "vault key material created");
        Ok((master_key, biometric_stored))
    }

    // -- password change ---------------------------------------------------

    /// Re-wrap the master key under a new password.
    ///
    /// The current password must unlock first. A fresh salt is generated,
    /// the existing master key is wrapped under the new wrapping key, and
    /// both slots are overwritten. The biometric slot is untouched —
    /// biometrics bind to the master key, not the password.
    ///
    /// # Errors
    ///
    /// [`VaultError::WrongPassword`] when `current_password` does not
    /// unlock the vault.
    pub fn change_password(
        &self,
        vault_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), VaultError> {
        let master_key = self.unlock_with_password(current_password, vault_id)?;

        let new_salt = generate_salt();
        let new_wrapping_key = derive_wrapping_key(new_password, &new_salt)?;
        let wrapped = wrap_master_key(master_key.expose(), new_wrapping_key.expose())?;

        self.store.store_salt(&new_salt, vault_id)?;
        self.store
            .store_wrapped_master_key(&wrapped.to_bytes(), vault_id)?;

        info!(vault_id, "password changed");
        Ok(())
    }

    // -- biometric enrollment ----------------------------------------------

    /// Enable biometric unlock: password-unlock the master key and store it
    /// under biometric access control.
    ///
    /// # Errors
    ///
    /// [`VaultError::BiometricsUnavailable`] when the device cannot satisfy
    /// biometric evaluation; [`VaultError::WrongPassword`] when the
    /// password is wrong.
    pub fn enable_biometric(&self, vault_id: &str, password: &str) -> Result<(), VaultError> {
        if !self.biometrics_available {
            return Err(VaultError::BiometricsUnavailable);
        }
        let master_key = self.unlock_with_password(password, vault_id)?;
        self.store.store_master_key(master_key.expose(), vault_id)?;
        info!(vault_id, "biometric slot stored");
        Ok(())
    }

    /// Disable biometric unlock by deleting the gated slot. Tolerates an
    /// already-absent slot.
    pub fn disable_biometric(&self, vault_id: &str) -> Result<(), VaultError> {
        match self.store.delete_master_key(vault_id) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
