// crates/netharvest-core/src/core/run.rs
// ============================================================================
// Module: Netharvest Run Model
// Description: Run lifecycle records, per-device outcomes, and batch summaries.
// Purpose: Capture aggregate and per-device results with closed counting.
// Dependencies: serde, time, crate::core::identifiers
// ============================================================================

//! ## Overview
//! A run is one executed instance of a job. The run's history record is
//! mutated exactly twice (creation at start, one final commit at completion),
//! and its counts obey `total = success + failed + skipped` the moment the
//! status leaves [`RunStatus::Running`]. Per-device outcomes carry a
//! disposition plus a one-line reason so partial failures report faithfully.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::CaptureId;
use crate::core::identifiers::CredentialId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::JobSlug;
use crate::core::identifiers::RunId;
use crate::core::job::CaptureKind;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Lifecycle status of a run.
///
/// # Invariants
/// - Variants are stable for serialization and history rows.
/// - `Cancelled` records a batch member skipped by stop-on-failure; such runs
///   never held devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is executing.
    Running,
    /// Every device succeeded.
    Success,
    /// At least one device succeeded and at least one failed or was skipped.
    Partial,
    /// No device succeeded, or the run aborted before devices were touched.
    Failed,
    /// Run was never started (batch stop-on-failure).
    Cancelled,
}

impl RunStatus {
    /// Returns the stable textual form used in history rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the stable textual form used in history rows.
    #[must_use]
    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Device Counts
// ============================================================================

/// Success/failed/skipped counters for one run.
///
/// # Invariants
/// - `success + failed + skipped == total` at completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCounts {
    /// Devices attempted or considered by the run.
    pub total: u64,
    /// Devices that completed successfully.
    pub success: u64,
    /// Devices that failed.
    pub failed: u64,
    /// Devices skipped (cancellation or validation policy).
    pub skipped: u64,
}

impl DeviceCounts {
    /// Returns whether the counters are closed over `total`.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.success + self.failed + self.skipped == self.total
    }

    /// Derives the final run status from the counters.
    ///
    /// `Success` requires every device to succeed; `Partial` requires at
    /// least one success alongside a failure or skip; anything else is
    /// `Failed`.
    #[must_use]
    pub const fn final_status(&self) -> RunStatus {
        if self.total > 0 && self.success == self.total {
            RunStatus::Success
        } else if self.success > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

// ============================================================================
// SECTION: Device Outcomes
// ============================================================================

/// Terminal disposition of one device within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceDisposition {
    /// Command sequence completed and validation (if any) passed.
    Success,
    /// Device failed; see the failure kind.
    Failed,
    /// Device was skipped; see the skip reason.
    Skipped,
}

/// Failure classification carried on failed device outcomes.
///
/// # Invariants
/// - Variants are stable for serialization and summary bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No credential could be resolved for the device.
    NoCredential,
    /// SSH authentication was rejected.
    AuthFailed,
    /// Per-device wall clock elapsed.
    Timeout,
    /// Connect refused, DNS failure, reset, or unreachable.
    Transport,
    /// Prompt detection failed irrecoverably mid-sequence.
    Command,
    /// Capture write or history update failed for this device.
    Persistence,
}

impl FailureKind {
    /// Returns the stable textual form used in history rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoCredential => "no_credential",
            Self::AuthFailed => "auth_failed",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Command => "command",
            Self::Persistence => "persistence",
        }
    }
}

/// Skip classification carried on skipped device outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Best template score fell below the job's minimum.
    ValidationFailed,
    /// No template matched the job's filter terms.
    NoTemplate,
    /// Run was cancelled before the device started or finished.
    Cancelled,
}

/// One-line failure record attached to a device outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// One-line reason shown in summaries.
    pub message: String,
}

/// Validation summary attached to a device outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Winning template identifier, when one matched.
    pub template: Option<String>,
    /// Best score across candidates.
    pub score: u8,
    /// Number of parsed records from the winning template.
    pub record_count: usize,
}

/// Terminal record for one device within a run.
///
/// # Invariants
/// - `failure` is present iff `disposition` is `Failed`.
/// - `skip` is present iff `disposition` is `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOutcome {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Device name.
    pub device_name: String,
    /// Address the session targeted.
    pub host: String,
    /// Terminal disposition.
    pub disposition: DeviceDisposition,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Raw transcript (possibly empty on failure).
    pub output: String,
    /// Failure record when the device failed.
    pub failure: Option<DeviceFailure>,
    /// Skip reason when the device was skipped.
    pub skip: Option<SkipReason>,
    /// Credential used (or attempted last), when one was resolved.
    pub credential_id: Option<CredentialId>,
    /// Non-fatal warnings accumulated during the session.
    pub warnings: Vec<String>,
    /// Validation summary when the pipeline ran.
    pub validation: Option<ValidationSummary>,
    /// Path of the saved capture, when one was written.
    pub capture_path: Option<PathBuf>,
}

impl DeviceOutcome {
    /// Returns a one-line reason string for summaries.
    #[must_use]
    pub fn reason(&self) -> String {
        match (&self.failure, &self.skip) {
            (Some(failure), _) => format!("{}: {}", failure.kind.as_str(), failure.message),
            (None, Some(SkipReason::ValidationFailed)) => "validation below minimum".to_string(),
            (None, Some(SkipReason::NoTemplate)) => "no matching template".to_string(),
            (None, Some(SkipReason::Cancelled)) => "run cancelled".to_string(),
            (None, None) => "ok".to_string(),
        }
    }
}

/// Completion event published after each device finishes.
///
/// # Invariants
/// - `index` is assigned in completion order, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// Completion-order index (1-based).
    pub index: u64,
    /// Total devices in the run.
    pub total: u64,
    /// Terminal device outcome.
    pub outcome: DeviceOutcome,
}

// ============================================================================
// SECTION: History Records
// ============================================================================

/// History row for one run.
///
/// # Invariants
/// - `started_at <= completed_at` whenever `completed_at` is present.
/// - Counts are closed once `status` leaves `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier assigned by the history store.
    pub id: RunId,
    /// Owning job slug.
    pub job_slug: JobSlug,
    /// Wall-clock start time.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Wall-clock completion time, absent while running.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Device counters.
    pub counts: DeviceCounts,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Error text for job-level failures.
    pub error: Option<String>,
}

/// History row for one saved capture.
///
/// # Invariants
/// - At most one capture exists per (device, run).
/// - `size_bytes` equals the byte length of the file at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Capture identifier assigned by the history store.
    pub id: CaptureId,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Device name at capture time.
    pub device_name: String,
    /// Capture kind tag.
    pub kind: CaptureKind,
    /// Filesystem path of the capture file.
    pub path: PathBuf,
    /// Byte size of the capture file.
    pub size_bytes: u64,
    /// Wall-clock time the capture was committed.
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Validation score, when the pipeline ran.
    pub score: Option<u8>,
}

// ============================================================================
// SECTION: Job and Batch Reports
// ============================================================================

/// In-memory report for one completed job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Run identifier, absent when the run failed before history creation.
    pub run_id: Option<RunId>,
    /// Job slug.
    pub slug: JobSlug,
    /// Final status.
    pub status: RunStatus,
    /// Device counters.
    pub counts: DeviceCounts,
    /// Job-level error text, when the run aborted.
    pub error: Option<String>,
    /// Per-device outcomes in completion order.
    pub outcomes: Vec<DeviceOutcome>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Aggregate report for one batch execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Jobs attempted (started).
    pub jobs_attempted: u64,
    /// Jobs that completed with status success.
    pub jobs_succeeded: u64,
    /// Jobs that completed with status partial.
    pub jobs_partial: u64,
    /// Jobs that completed with status failed.
    pub jobs_failed: u64,
    /// Jobs recorded cancelled by stop-on-failure.
    pub jobs_cancelled: u64,
    /// Device counters summed across attempted jobs.
    pub devices: DeviceCounts,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Per-job reports in batch order.
    pub jobs: Vec<JobReport>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
