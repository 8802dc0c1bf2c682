// crates/netharvest-core/src/core/errors.rs
// ============================================================================
// Module: Netharvest Error Taxonomy
// Description: Job-level and device-level error kinds shared across crates.
// Purpose: Keep propagation policy (fatal vs per-device) explicit in types.
// Dependencies: thiserror, crate::core::{filter, identifiers, run}
// ============================================================================

//! ## Overview
//! Errors divide into three tiers with distinct propagation policy:
//! - **Job-level** ([`JobError`]): raised before or instead of device work;
//!   the run is recorded failed and no further devices are contacted.
//! - **Device-level** ([`DeviceError`]): recorded on the device's outcome;
//!   never aborts the run.
//! - **Store-level** ([`StoreError`]): raised by the persistence seams and
//!   mapped upward into one of the first two tiers at the call site.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::filter::FilterError;
use crate::core::identifiers::JobSlug;
use crate::core::run::DeviceFailure;
use crate::core::run::FailureKind;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors raised by the inventory, template, and history store seams.
///
/// # Invariants
/// - Messages never embed decrypted credential material.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("store io error: {0}")]
    Io(String),
    /// Database engine failure.
    #[error("store db error: {0}")]
    Db(String),
    /// Stored data failed shape validation.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Requested row does not exist.
    #[error("store row not found: {0}")]
    NotFound(String),
}

// ============================================================================
// SECTION: Job-Level Errors
// ============================================================================

/// Fatal errors raised at job start, before device work.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Job definition, filter, or filename template failed validation.
    #[error("config error: {0}")]
    Config(String),
    /// Resolver produced zero devices for a present filter.
    #[error("no matching devices for job {0}")]
    InventoryEmpty(JobSlug),
    /// Operation required decrypted material without an unlocked vault.
    #[error("secret store is locked")]
    SecretStoreLocked,
    /// Store failure while resolving or recording the run.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<FilterError> for JobError {
    fn from(err: FilterError) -> Self {
        Self::Config(err.to_string())
    }
}

// ============================================================================
// SECTION: Device-Level Errors
// ============================================================================

/// Per-device errors recorded on outcomes without aborting the run.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// No credential could be resolved.
    #[error("no credential available")]
    NoCredential,
    /// SSH authentication was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Per-device wall clock elapsed.
    #[error("device timed out after {0} ms")]
    Timeout(u64),
    /// Connect refused, DNS failure, reset, or unreachable.
    #[error("transport error: {0}")]
    Transport(String),
    /// Prompt detection failed irrecoverably.
    #[error("command error: {0}")]
    Command(String),
    /// Capture write or per-device history update failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl DeviceError {
    /// Returns the failure classification for outcome bucketing.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::NoCredential => FailureKind::NoCredential,
            Self::AuthFailed(_) => FailureKind::AuthFailed,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Transport(_) => FailureKind::Transport,
            Self::Command(_) => FailureKind::Command,
            Self::Persistence(_) => FailureKind::Persistence,
        }
    }

    /// Returns whether discovery should abandon remaining candidates.
    ///
    /// Auth rejections are credential-specific; everything else indicates
    /// the device itself cannot be reached and retrying other secrets risks
    /// lockouts.
    #[must_use]
    pub const fn aborts_discovery(&self) -> bool {
        !matches!(self, Self::AuthFailed(_))
    }

    /// Converts the error into a one-line failure record.
    #[must_use]
    pub fn into_failure(self) -> DeviceFailure {
        DeviceFailure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_kinds_map_stably() {
        assert_eq!(DeviceError::NoCredential.kind(), FailureKind::NoCredential);
        assert_eq!(DeviceError::Timeout(1_000).kind(), FailureKind::Timeout);
        assert_eq!(DeviceError::Transport("refused".into()).kind(), FailureKind::Transport);
    }

    #[test]
    fn only_auth_failures_continue_discovery() {
        assert!(!DeviceError::AuthFailed("denied".into()).aborts_discovery());
        assert!(DeviceError::Transport("refused".into()).aborts_discovery());
        assert!(DeviceError::Timeout(5_000).aborts_discovery());
    }
}
