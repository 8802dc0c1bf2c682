// crates/netharvest-core/src/core/identifiers.rs
// ============================================================================
// Module: Netharvest Identifiers
// Description: Canonical opaque identifiers for inventory, vault, and history.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout netharvest.
//! Numeric identifiers mirror the row identifiers of their backing stores and
//! enforce non-zero, 1-based invariants at construction boundaries. The job
//! slug is the only textual identifier and carries its own shape invariant
//! (ASCII kebab-case).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Numeric Identifier Types
// ============================================================================

/// Declares a non-zero numeric identifier newtype.
macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// # Invariants
        /// - Always >= 1 (non-zero, 1-based row identifier).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Creates a new identifier from a non-zero value.
            #[must_use]
            pub const fn new(id: NonZeroU64) -> Self {
                Self(id)
            }

            /// Creates an identifier from a raw value (returns `None` if zero).
            #[must_use]
            pub fn from_raw(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map(Self)
            }

            /// Returns the raw identifier value (always >= 1).
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.get().fmt(f)
            }
        }
    };
}

numeric_id!(
    /// Device identifier within the inventory store.
    DeviceId
);
numeric_id!(
    /// Site identifier within the inventory store.
    SiteId
);
numeric_id!(
    /// Platform identifier within the inventory store.
    PlatformId
);
numeric_id!(
    /// Device role identifier within the inventory store.
    RoleId
);
numeric_id!(
    /// Credential identifier within the secret store.
    CredentialId
);
numeric_id!(
    /// Job identifier within the job table.
    JobId
);
numeric_id!(
    /// Run identifier assigned by the history store.
    RunId
);
numeric_id!(
    /// Capture identifier assigned by the history store.
    CaptureId
);

// ============================================================================
// SECTION: Job Slug
// ============================================================================

/// Stable textual identifier for a job.
///
/// # Invariants
/// - Non-empty ASCII kebab-case: lowercase alphanumerics and single interior
///   hyphens, never leading or trailing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSlug(String);

impl JobSlug {
    /// Parses a job slug, rejecting anything outside ASCII kebab-case.
    ///
    /// # Errors
    ///
    /// Returns [`SlugError`] when the input is empty, contains characters
    /// outside `[a-z0-9-]`, or has a leading, trailing, or doubled hyphen.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SlugError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SlugError::Empty);
        }
        if raw.starts_with('-') || raw.ends_with('-') || raw.contains("--") {
            return Err(SlugError::Malformed(raw));
        }
        if !raw.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(SlugError::Malformed(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised while parsing a [`JobSlug`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlugError {
    /// Slug input was empty.
    #[error("job slug must not be empty")]
    Empty,
    /// Slug input was not ASCII kebab-case.
    #[error("job slug is not ascii kebab-case: {0}")]
    Malformed(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
