// crates/netharvest-config/src/lib.rs
// ============================================================================
// Module: Netharvest Config
// Description: Job, batch, and collector-settings descriptors.
// Purpose: Load and validate every operator-editable document.
// Dependencies: dirs, netharvest-core, serde, serde_json, serde_yaml, toml
// ============================================================================

//! ## Overview
//! `netharvest-config` owns the on-disk descriptor formats: versioned job
//! documents (TOML/JSON), batch definitions (YAML), and the collector
//! settings file (TOML). Loading always validates; a descriptor that loads
//! is executable.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod batch;
pub mod error;
pub mod jobs;
pub mod settings;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::batch::BatchDescriptor;
pub use crate::batch::BatchPlan;
pub use crate::batch::load_batch;
pub use crate::error::ConfigError;
pub use crate::jobs::JOB_DESCRIPTOR_VERSION;
pub use crate::jobs::JobDescriptor;
pub use crate::jobs::find_job;
pub use crate::jobs::load_job;
pub use crate::jobs::load_jobs_dir;
pub use crate::settings::Settings;
pub use crate::settings::SettingsFile;
pub use crate::settings::VAULT_PASSWORD_ENV;
pub use crate::settings::default_data_dir;
pub use crate::settings::load_settings;
