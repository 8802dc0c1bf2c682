// crates/netharvest-core/src/core/job.rs
// ============================================================================
// Module: Netharvest Job Model
// Description: Declarative collection jobs and their policy blocks.
// Purpose: Capture what to collect, from where, and how to validate and store it.
// Dependencies: serde, crate::core::{filter, identifiers}
// ============================================================================

//! ## Overview
//! A job is the declarative unit of collection: an ordered command list, a
//! device filter, and validation/execution/output policies. Jobs are created
//! and mutated by operators outside the core; the core validates shape
//! invariants on load and treats jobs as read-only during a run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::filter::DeviceFilter;
use crate::core::identifiers::JobId;
use crate::core::identifiers::JobSlug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hard ceiling applied to a job's device-level worker count.
pub const MAX_WORKER_CEILING: usize = 64;

/// Default device-level worker count when the job does not set one.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Default per-device wall-clock timeout.
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Capture Kind
// ============================================================================

/// Kind tag attached to captures produced by a job.
///
/// # Invariants
/// - At most one capture exists per (device, run); the kind names what the
///   transcript holds so reports can group captures across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Full device configuration.
    Config,
    /// Operational state output (show commands).
    State,
    /// Hardware/software inventory output.
    Inventory,
}

impl CaptureKind {
    /// Returns the stable textual form used in store rows and paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::State => "state",
            Self::Inventory => "inventory",
        }
    }

    /// Parses the stable textual form used in store rows.
    #[must_use]
    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw {
            "config" => Some(Self::Config),
            "state" => Some(Self::State),
            "inventory" => Some(Self::Inventory),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Policy Blocks
// ============================================================================

/// Validation policy for a job.
///
/// # Invariants
/// - `template_filter` is non-empty whenever the policy is present.
/// - `min_score` is within [0, 100].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Template selection filter, e.g. `cisco_ios_show_ip_arp`.
    pub template_filter: String,
    /// Minimum acceptable match score.
    pub min_score: u8,
    /// Whether captures are written even when validation fails.
    #[serde(default)]
    pub save_on_fail: bool,
}

/// Execution policy for a job.
///
/// # Invariants
/// - `max_workers >= 1`; the pool additionally clamps to [`MAX_WORKER_CEILING`].
/// - `device_timeout` is strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// Maximum devices in flight inside this job.
    pub max_workers: usize,
    /// Per-device wall-clock timeout.
    pub device_timeout: Duration,
    /// Optional pause between consecutive commands on one device.
    #[serde(default)]
    pub inter_command_pause: Option<Duration>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
            inter_command_pause: None,
        }
    }
}

impl ExecutionPolicy {
    /// Returns the worker count clamped to the pool ceiling.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.max_workers.clamp(1, MAX_WORKER_CEILING)
    }
}

/// Output layout policy for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPolicy {
    /// Subdirectory under the collection root.
    pub subdir: String,
    /// Filename template with `{device_name}`, `{device_id}`, `{timestamp}`.
    pub filename_template: String,
}

// ============================================================================
// SECTION: Job Spec
// ============================================================================

/// Declarative collection job.
///
/// # Invariants
/// - `slug` and `id` are both stable-unique across the job table.
/// - `commands` is non-empty; the first entry is the primary command.
/// - When `validation` is present its `template_filter` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Stable textual identifier.
    pub slug: JobSlug,
    /// Numeric identifier.
    pub id: JobId,
    /// Capture kind produced by this job.
    pub capture_kind: CaptureKind,
    /// Vendor hint recorded for operators; not used for matching.
    #[serde(default)]
    pub vendor_hint: Option<String>,
    /// Ordered command list; the first entry is the primary command.
    pub commands: Vec<String>,
    /// Optional paging-disable prelude overriding the platform default.
    #[serde(default)]
    pub paging_prelude: Option<String>,
    /// Device filter expanded against the inventory store.
    pub filter: DeviceFilter,
    /// Validation policy; absent means captures are stored unvalidated.
    #[serde(default)]
    pub validation: Option<ValidationPolicy>,
    /// Execution policy.
    #[serde(default)]
    pub execution: ExecutionPolicy,
    /// Output layout policy.
    pub output: OutputPolicy,
    /// Whether the job may be executed.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Jobs are enabled unless explicitly switched off.
const fn default_enabled() -> bool {
    true
}

impl JobSpec {
    /// Validates the shape invariants that make a job executable.
    ///
    /// # Errors
    ///
    /// Returns [`JobSpecError`] naming the first violated invariant.
    pub fn validate(&self) -> Result<(), JobSpecError> {
        if self.commands.is_empty() || self.commands.iter().any(|c| c.trim().is_empty()) {
            return Err(JobSpecError::EmptyCommand(self.slug.clone()));
        }
        if self.execution.max_workers == 0 {
            return Err(JobSpecError::ZeroWorkers(self.slug.clone()));
        }
        if self.execution.device_timeout.is_zero() {
            return Err(JobSpecError::ZeroTimeout(self.slug.clone()));
        }
        if let Some(validation) = &self.validation {
            if validation.template_filter.trim().is_empty() {
                return Err(JobSpecError::EmptyTemplateFilter(self.slug.clone()));
            }
            if validation.min_score > 100 {
                return Err(JobSpecError::MinScoreOutOfRange(self.slug.clone()));
            }
        }
        Ok(())
    }

    /// Returns the primary command.
    ///
    /// # Panics
    ///
    /// Never panics for validated jobs; `commands` is non-empty by invariant.
    #[must_use]
    pub fn primary_command(&self) -> &str {
        self.commands.first().map_or("", String::as_str)
    }
}

/// Errors raised by [`JobSpec::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobSpecError {
    /// Command list empty or containing a blank entry.
    #[error("job {0}: command list must be non-empty with no blank entries")]
    EmptyCommand(JobSlug),
    /// Worker bound below one.
    #[error("job {0}: max_workers must be >= 1")]
    ZeroWorkers(JobSlug),
    /// Device timeout of zero.
    #[error("job {0}: device_timeout must be > 0")]
    ZeroTimeout(JobSlug),
    /// Validation enabled with an empty template filter.
    #[error("job {0}: validation requires a non-empty template_filter")]
    EmptyTemplateFilter(JobSlug),
    /// Minimum score outside [0, 100].
    #[error("job {0}: min_score must be within [0, 100]")]
    MinScoreOutOfRange(JobSlug),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
