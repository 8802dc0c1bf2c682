// crates/netharvest-config/src/error.rs
// ============================================================================
// Module: Netharvest Config Errors
// Description: Error type shared by settings, job, and batch loading.
// Purpose: Give the CLI one configuration-error surface for exit code 2.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every loading or validation failure in this crate maps to [`ConfigError`];
//! the CLI translates the whole family to the configuration exit code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem read failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Descriptor failed to parse.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// Descriptor parsed but violated a shape invariant.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Descriptor uses a file extension this loader does not handle.
    #[error("unsupported descriptor format: {0}")]
    UnsupportedFormat(PathBuf),
    /// Batch referenced a job slug with no descriptor.
    #[error("batch {batch} references unknown job {slug}")]
    UnknownJob {
        /// Batch name.
        batch: String,
        /// Unresolvable slug.
        slug: String,
    },
    /// Two descriptors declare the same slug or id.
    #[error("duplicate job identity: {0}")]
    DuplicateJob(String),
}
