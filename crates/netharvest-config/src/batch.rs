// crates/netharvest-config/src/batch.rs
// ============================================================================
// Module: Netharvest Batch Descriptors
// Description: Human-editable YAML batch definitions.
// Purpose: Load ordered job compositions with stop-on-failure semantics.
// Dependencies: serde, serde_yaml, netharvest-core
// ============================================================================

//! ## Overview
//! A batch is an ordered list of job slugs executed as one operator action,
//! stored as one YAML file per batch under the batch directory. Validation
//! happens before execution: the list must be non-empty and every slug must
//! resolve against the loaded job set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::time::Duration;

use netharvest_core::JobSlug;
use netharvest_core::JobSpec;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

// ============================================================================
// SECTION: Descriptor Types
// ============================================================================

/// On-disk batch descriptor.
///
/// # Invariants
/// - `jobs` is non-empty and every entry parses as a job slug.
/// - `max_concurrent_jobs`, when set, is >= 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    /// Batch name.
    pub name: String,
    /// Ordered job slugs.
    pub jobs: Vec<String>,
    /// Whether a failed (not partial) job cancels the remainder.
    #[serde(default)]
    pub stop_on_failure: bool,
    /// Optional pause between jobs, in seconds.
    #[serde(default)]
    pub inter_job_pause_secs: Option<u64>,
    /// Bounded job-level parallelism; 1 preserves strict batch order.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_jobs: usize,
}

/// Batches run sequentially unless the descriptor raises the cap.
const fn default_concurrency() -> usize {
    1
}

/// Validated batch plan ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// Batch name.
    pub name: String,
    /// Ordered, resolved job slugs.
    pub jobs: Vec<JobSlug>,
    /// Whether a failed job cancels the remainder.
    pub stop_on_failure: bool,
    /// Optional pause between jobs.
    pub inter_job_pause: Option<Duration>,
    /// Bounded job-level parallelism.
    pub max_concurrent_jobs: usize,
}

impl BatchDescriptor {
    /// Validates the descriptor against the loaded job set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the list is empty, a slug is malformed,
    /// the concurrency cap is zero, or a slug has no descriptor.
    pub fn into_plan(self, known_jobs: &[JobSpec]) -> Result<BatchPlan, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("batch name must not be empty".to_string()));
        }
        if self.jobs.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "batch {}: job list must not be empty",
                self.name
            )));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(format!(
                "batch {}: max_concurrent_jobs must be >= 1",
                self.name
            )));
        }
        let mut jobs = Vec::with_capacity(self.jobs.len());
        for raw in self.jobs {
            let slug =
                JobSlug::parse(raw).map_err(|err| ConfigError::Invalid(err.to_string()))?;
            if !known_jobs.iter().any(|job| job.slug == slug) {
                return Err(ConfigError::UnknownJob {
                    batch: self.name,
                    slug: slug.to_string(),
                });
            }
            jobs.push(slug);
        }
        Ok(BatchPlan {
            name: self.name,
            jobs,
            stop_on_failure: self.stop_on_failure,
            inter_job_pause: self.inter_job_pause_secs.map(Duration::from_secs),
            max_concurrent_jobs: self.max_concurrent_jobs,
        })
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads and validates one batch file.
///
/// # Errors
///
/// Returns [`ConfigError`] on read, parse, or validation failure.
pub fn load_batch(path: &Path, known_jobs: &[JobSpec]) -> Result<BatchPlan, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptor: BatchDescriptor =
        serde_yaml::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    descriptor.into_plan(known_jobs)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
