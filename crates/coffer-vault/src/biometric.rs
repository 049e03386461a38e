//! Biometric policy evaluation — Touch ID, Windows Hello, and friends.
//!
//! The engine never talks to biometric hardware directly: it asks a
//! [`BiometricEvaluator`] to evaluate the platform policy with a localized
//! reason, then uses the returned [`AuthContext`] to read the gated
//! *master-key* slot without a second prompt.

use std::fmt;
use std::sync::Mutex;

use crate::store::AuthContext;

// ---------------------------------------------------------------------------
// Evaluation outcomes
// ---------------------------------------------------------------------------

/// Failure outcomes of a biometric policy evaluation.
///
/// The authenticator maps `NotAvailable` / `NotEnrolled` to
/// `biometrics-unavailable` and everything else to `authentication-failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricEvalError {
    /// The user dismissed the prompt.
    UserCancel,
    /// The application cancelled the evaluation.
    AppCancel,
    /// The system cancelled the evaluation (e.g. another prompt appeared).
    SystemCancel,
    /// No biometric hardware on this device.
    NotAvailable,
    /// Hardware present but no biometrics enrolled.
    NotEnrolled,
    /// Any other platform failure.
    Other(String),
}

impl fmt::Display for BiometricEvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserCancel => f.write_str("user cancelled"),
            Self::AppCancel => f.write_str("application cancelled"),
            Self::SystemCancel => f.write_str("system cancelled"),
            Self::NotAvailable => f.write_str("biometric hardware not available"),
            Self::NotEnrolled => f.write_str("no biometrics enrolled"),
            Self::Other(msg) => write!(f, "evaluation failed: {msg}"),
        }
    }
}

impl std::error::Error for BiometricEvalError {}

// ---------------------------------------------------------------------------
// Evaluator trait
// ---------------------------------------------------------------------------

/// Platform biometric evaluator abstraction.
///
/// This is the only operation in the engine that may block indefinitely on
/// user input.
pub trait BiometricEvaluator: Send + Sync {
    /// Whether biometric evaluation can succeed on this device, sampled at
    /// construction. Callers should not cache it across device
    /// configuration changes.
    fn biometrics_available(&self) -> bool;

    /// Evaluate the biometric policy, showing `reason` in the prompt.
    ///
    /// # Errors
    ///
    /// Returns a [`BiometricEvalError`] describing why the evaluation did
    /// not succeed.
    fn evaluate(&self, reason: &str) -> Result<AuthContext, BiometricEvalError>;
}

// ---------------------------------------------------------------------------
// Null evaluator (fallback)
// ---------------------------------------------------------------------------

/// Evaluator for devices without biometric hardware. Always unavailable.
pub struct NullBiometricEvaluator;

impl BiometricEvaluator for NullBiometricEvaluator {
    fn biometrics_available(&self) -> bool {
        false
    }

    fn evaluate(&self, _reason: &str) -> Result<AuthContext, BiometricEvalError> {
        Err(BiometricEvalError::NotAvailable)
    }
}

// ---------------------------------------------------------------------------
// Scripted evaluator (test harness)
// ---------------------------------------------------------------------------

/// Scripted evaluator for harnesses: yields a fixed sequence of outcomes
/// and records the reasons it was shown.
#[derive(Default)]
pub struct StaticBiometricEvaluator {
    outcomes: Mutex<Vec<Result<(), BiometricEvalError>>>,
    reasons: Mutex<Vec<String>>,
    available: bool,
}

impl StaticBiometricEvaluator {
    /// Evaluator that always succeeds.
    #[must_use]
    pub fn approving() -> Self {
        Self {
            outcomes: Mutex::new(Vec::new()),
            reasons: Mutex::new(Vec::new()),
            available: true,
        }
    }

    /// Evaluator that yields `outcomes` in order, then always succeeds.
    #[must_use]
    pub fn scripted(outcomes: Vec<Result<(), BiometricEvalError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            reasons: Mutex::new(Vec::new()),
            available: true,
        }
    }

    /// The reasons passed to `evaluate`, in call order.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.reasons
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl BiometricEvaluator for StaticBiometricEvaluator {
    fn biometrics_available(&self) -> bool {
        self.available
    }

    fn evaluate(&self, reason: &str) -> Result<AuthContext, BiometricEvalError> {
        self.reasons
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(reason.to_owned());

        let mut outcomes = self
            .outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if outcomes.is_empty() {
            return Ok(AuthContext::new());
        }
        outcomes.remove(0).map(|()| AuthContext::new())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
