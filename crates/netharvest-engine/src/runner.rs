// crates/netharvest-engine/src/runner.rs
// ============================================================================
// Module: Netharvest Job Runner
// Description: Bounded device pool executing one job end to end.
// Purpose: Resolve, execute, validate, persist, and commit one run.
// Dependencies: futures, tokio, netharvest-core, crate::{credentials,
// persist, resolver, validation}
// ============================================================================

//! ## Overview
//! One run is a controller plus a bounded set of device workers. Workers
//! resolve credentials, drive the session, validate output, and write their
//! own capture files; every outcome flows to the controller through a
//! bounded channel, and the controller is the only writer against the
//! history store. Completion indices are assigned in completion order, and
//! the history row is committed exactly twice: at start and at the end.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use netharvest_core::CancelToken;
use netharvest_core::CommandPlan;
use netharvest_core::CompletionEvent;
use netharvest_core::ConnectSpec;
use netharvest_core::DeviceConnector;
use netharvest_core::DeviceCounts;
use netharvest_core::DeviceDisposition;
use netharvest_core::DeviceError;
use netharvest_core::DeviceOutcome;
use netharvest_core::DeviceRecord;
use netharvest_core::HistoryStore;
use netharvest_core::InventoryStore;
use netharvest_core::JobError;
use netharvest_core::JobReport;
use netharvest_core::JobSpec;
use netharvest_core::MatchStatus;
use netharvest_core::NewCapture;
use netharvest_core::ProgressSink;
use netharvest_core::RunId;
use netharvest_core::RunStatus;
use netharvest_core::SkipReason;
use netharvest_core::TemplateStore;
use netharvest_core::ValidationSummary;
use netharvest_core::capture_path;
use netharvest_core::core::time::now_utc;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::credentials::CredentialResolver;
use crate::persist::write_capture;
use crate::resolver::resolve_devices;
use crate::validation::validate_output;

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Stores and collaborators shared by every run.
#[derive(Clone)]
pub struct JobRunner {
    /// Inventory read model.
    pub inventory: Arc<dyn InventoryStore>,
    /// Template store for validation.
    pub templates: Arc<dyn TemplateStore>,
    /// History store; written only by the controller.
    pub history: Arc<dyn HistoryStore>,
    /// Per-device credential resolver.
    pub credentials: CredentialResolver,
    /// Device transport.
    pub connector: Arc<dyn DeviceConnector>,
    /// Collection root for capture files.
    pub capture_root: PathBuf,
    /// Progress sink for completion events.
    pub progress: Arc<dyn ProgressSink>,
}

impl JobRunner {
    /// Executes one job to completion.
    ///
    /// Job-level failures (config, empty inventory, locked vault) produce a
    /// failed report without contacting devices; device-level failures are
    /// carried on outcomes and never abort the run.
    pub async fn run(&self, job: &JobSpec, cancel: &CancelToken) -> JobReport {
        let started_wall = now_utc();
        let started = Instant::now();

        if let Err(err) = self.preflight(job) {
            return self.fail_before_devices(job, &err, started);
        }
        let devices = match resolve_devices(self.inventory.as_ref(), &job.slug, &job.filter) {
            Ok(devices) => devices,
            Err(err) => return self.fail_before_devices(job, &err, started),
        };

        let total = devices.len() as u64;
        let run_id = match self.history.begin_run(&job.slug, total, started_wall) {
            Ok(run_id) => run_id,
            Err(err) => {
                let err = JobError::Store(err);
                return report(
                    None,
                    job,
                    RunStatus::Failed,
                    DeviceCounts::default(),
                    Some(err.to_string()),
                    Vec::new(),
                    started,
                );
            }
        };
        info!(job = %job.slug, run = %run_id, devices = total, "run started");

        let outcomes = self.execute_pool(job, devices, run_id, cancel).await;

        let mut counts = DeviceCounts {
            total,
            ..DeviceCounts::default()
        };
        for outcome in &outcomes {
            match outcome.disposition {
                DeviceDisposition::Success => counts.success += 1,
                DeviceDisposition::Failed => counts.failed += 1,
                DeviceDisposition::Skipped => counts.skipped += 1,
            }
        }
        let status = counts.final_status();
        if let Err(err) = self.history.finish_run(run_id, &counts, status, None, now_utc()) {
            error!(run = %run_id, error = %err, "failed to commit final run status");
        }
        info!(job = %job.slug, run = %run_id, status = status.as_str(),
              success = counts.success, failed = counts.failed, skipped = counts.skipped,
              "run finished");
        report(Some(run_id), job, status, counts, None, outcomes, started)
    }

    /// Validates everything that must hold before device work.
    fn preflight(&self, job: &JobSpec) -> Result<(), JobError> {
        if !job.enabled {
            return Err(JobError::Config(format!("job {} is disabled", job.slug)));
        }
        job.validate().map_err(|err| JobError::Config(err.to_string()))?;
        self.credentials.check_unlocked().map_err(|_| JobError::SecretStoreLocked)?;
        Ok(())
    }

    /// Records a job-level failure without touching any device.
    fn fail_before_devices(&self, job: &JobSpec, err: &JobError, started: Instant) -> JobReport {
        warn!(job = %job.slug, error = %err, "run failed before device work");
        let at = now_utc();
        match self.history.begin_run(&job.slug, 0, at) {
            Ok(run_id) => {
                let counts = DeviceCounts::default();
                if let Err(commit) = self.history.finish_run(
                    run_id,
                    &counts,
                    RunStatus::Failed,
                    Some(&err.to_string()),
                    now_utc(),
                ) {
                    error!(run = %run_id, error = %commit, "failed to commit failed run");
                }
                report(
                    Some(run_id),
                    job,
                    RunStatus::Failed,
                    counts,
                    Some(err.to_string()),
                    Vec::new(),
                    started,
                )
            }
            Err(store) => {
                error!(job = %job.slug, error = %store, "failed to record failed run");
                report(
                    None,
                    job,
                    RunStatus::Failed,
                    DeviceCounts::default(),
                    Some(err.to_string()),
                    Vec::new(),
                    started,
                )
            }
        }
    }

    /// Runs the bounded device pool and drains outcomes as the controller.
    async fn execute_pool(
        &self,
        job: &JobSpec,
        devices: Vec<DeviceRecord>,
        run_id: RunId,
        cancel: &CancelToken,
    ) -> Vec<DeviceOutcome> {
        let total = devices.len() as u64;
        let workers = job.execution.effective_workers();
        let semaphore = Arc::new(Semaphore::new(workers));
        let (sender, mut receiver) = mpsc::channel::<DeviceOutcome>(workers * 2);
        let job = Arc::new(job.clone());

        let mut tasks = FuturesUnordered::new();
        for device in devices {
            let semaphore = Arc::clone(&semaphore);
            let sender = sender.clone();
            let worker = DeviceWorker {
                job: Arc::clone(&job),
                credentials: self.credentials.clone(),
                connector: Arc::clone(&self.connector),
                templates: Arc::clone(&self.templates),
                capture_root: self.capture_root.clone(),
                cancel: cancel.clone(),
            };
            tasks.push(tokio::spawn(async move {
                // Acquisition fails only if the pool is torn down first.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let outcome = worker.execute(device).await;
                // A full channel throttles the pool; a closed one means the
                // controller is gone and the outcome has nowhere to go.
                let _ = sender.send(outcome).await;
            }));
        }
        drop(sender);

        let drain = async {
            let mut outcomes = Vec::with_capacity(total as usize);
            let mut index = 0u64;
            while let Some(outcome) = receiver.recv().await {
                index += 1;
                let outcome = self.commit_capture(run_id, job.as_ref(), outcome);
                self.progress.publish(&CompletionEvent {
                    index,
                    total,
                    outcome: outcome.clone(),
                });
                outcomes.push(outcome);
            }
            outcomes
        };

        let (outcomes, _) = tokio::join!(drain, async {
            while let Some(joined) = tasks.next().await {
                if let Err(err) = joined {
                    error!(error = %err, "device task aborted");
                }
            }
        });
        outcomes
    }

    /// Commits the capture metadata row for an outcome that saved a file.
    ///
    /// A failed metadata write downgrades the device to a persistence
    /// failure; the file itself is left in place for operators.
    fn commit_capture(&self, run_id: RunId, job: &JobSpec, outcome: DeviceOutcome) -> DeviceOutcome {
        let Some(path) = outcome.capture_path.clone() else {
            return outcome;
        };
        let capture = NewCapture {
            run_id,
            device_name: outcome.device_name.clone(),
            kind: job.capture_kind,
            path,
            size_bytes: outcome.output.len() as u64,
            captured_at: now_utc(),
            score: outcome.validation.as_ref().map(|v| v.score),
        };
        match self.history.record_capture(&capture) {
            Ok(_) => outcome,
            Err(err) => {
                error!(device = %outcome.device_name, error = %err, "capture row commit failed");
                let mut failed = outcome;
                failed.disposition = DeviceDisposition::Failed;
                failed.skip = None;
                failed.failure = Some(
                    DeviceError::Persistence(format!("capture row: {err}")).into_failure(),
                );
                failed
            }
        }
    }
}

/// Builds the final job report.
fn report(
    run_id: Option<RunId>,
    job: &JobSpec,
    status: RunStatus,
    counts: DeviceCounts,
    error: Option<String>,
    outcomes: Vec<DeviceOutcome>,
    started: Instant,
) -> JobReport {
    JobReport {
        run_id,
        slug: job.slug.clone(),
        status,
        counts,
        error,
        outcomes,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

// ============================================================================
// SECTION: Device Worker
// ============================================================================

/// Everything one device task needs, owned per worker.
struct DeviceWorker {
    /// Job under execution.
    job: Arc<JobSpec>,
    /// Credential resolver.
    credentials: CredentialResolver,
    /// Device transport.
    connector: Arc<dyn DeviceConnector>,
    /// Template store for validation.
    templates: Arc<dyn TemplateStore>,
    /// Collection root for capture files.
    capture_root: PathBuf,
    /// Run cancellation token.
    cancel: CancelToken,
}

impl DeviceWorker {
    /// Runs the full per-device protocol, always yielding an outcome.
    async fn execute(&self, device: DeviceRecord) -> DeviceOutcome {
        let started = Instant::now();
        if self.cancel.is_cancelled() {
            return outcome_skeleton(&device, started, DeviceDisposition::Skipped)
                .with_skip(SkipReason::Cancelled);
        }

        let credential = match self.credentials.resolve(&device) {
            Ok(credential) => credential,
            Err(err) => {
                return outcome_skeleton(&device, started, DeviceDisposition::Failed)
                    .with_failure(err);
            }
        };
        let credential_id = credential.id;

        let plan = CommandPlan {
            paging_prelude: self
                .job
                .paging_prelude
                .clone()
                .or_else(|| device.paging_disable.clone()),
            commands: self.job.commands.clone(),
            inter_command_pause: self.job.execution.inter_command_pause,
            deadline: self.job.execution.device_timeout,
        };
        let spec = ConnectSpec::for_device(&device);

        // Soft cancel is observed inside the session's read loop, which
        // closes the channel and errors out; the hard deadline at twice the
        // device timeout abandons a session that never reaches a read
        // boundary again.
        let hard_deadline = self.job.execution.device_timeout * 2;
        let session = tokio::time::timeout(
            hard_deadline,
            self.connector.run_commands(&spec, &credential, &plan, &self.cancel),
        )
        .await;
        let transcript = match session {
            Ok(Ok(transcript)) => transcript,
            Ok(Err(_)) | Err(_) if self.cancel.is_cancelled() => {
                return outcome_skeleton(&device, started, DeviceDisposition::Skipped)
                    .with_credential(credential_id)
                    .with_skip(SkipReason::Cancelled);
            }
            Ok(Err(err)) => {
                return outcome_skeleton(&device, started, DeviceDisposition::Failed)
                    .with_credential(credential_id)
                    .with_failure(err);
            }
            Err(_) => {
                let budget_ms =
                    u64::try_from(hard_deadline.as_millis()).unwrap_or(u64::MAX);
                return outcome_skeleton(&device, started, DeviceDisposition::Failed)
                    .with_credential(credential_id)
                    .with_failure(DeviceError::Timeout(budget_ms));
            }
        };

        self.finish_device(&device, credential_id, transcript, started)
    }

    /// Validation and capture-file stage after a successful session.
    fn finish_device(
        &self,
        device: &DeviceRecord,
        credential_id: netharvest_core::CredentialId,
        transcript: netharvest_core::Transcript,
        started: Instant,
    ) -> DeviceOutcome {
        let mut outcome = outcome_skeleton(device, started, DeviceDisposition::Success)
            .with_credential(credential_id);
        outcome.output = transcript.output;
        outcome.warnings = transcript.warnings;

        let mut save_file = true;
        if let Some(policy) = &self.job.validation {
            let matched = match validate_output(
                self.templates.as_ref(),
                &policy.template_filter,
                policy.min_score,
                &outcome.output,
            ) {
                Ok(matched) => matched,
                Err(err) => {
                    outcome.disposition = DeviceDisposition::Failed;
                    outcome.failure = Some(
                        DeviceError::Command(format!("template store: {err}")).into_failure(),
                    );
                    return outcome;
                }
            };
            outcome.validation = Some(ValidationSummary {
                template: matched.template.clone(),
                score: matched.score,
                record_count: matched.records.as_ref().map_or(0, Vec::len),
            });
            match matched.status {
                MatchStatus::Passed => {}
                MatchStatus::Failed => {
                    outcome.disposition = DeviceDisposition::Skipped;
                    outcome.skip = Some(SkipReason::ValidationFailed);
                    save_file = policy.save_on_fail;
                }
                MatchStatus::NoTemplate => {
                    outcome.disposition = DeviceDisposition::Skipped;
                    outcome.skip = Some(SkipReason::NoTemplate);
                    save_file = policy.save_on_fail;
                }
            }
        }

        if save_file {
            let path = capture_path(
                &self.capture_root,
                &self.job.output.subdir,
                &self.job.output.filename_template,
                device,
                now_utc(),
            );
            match write_capture(&path, outcome.output.as_bytes()) {
                Ok(_) => outcome.capture_path = Some(path),
                Err(err) => {
                    outcome.disposition = DeviceDisposition::Failed;
                    outcome.skip = None;
                    outcome.failure = Some(err.into_failure());
                }
            }
        }
        outcome
    }
}

/// Builds the common outcome fields for one device.
fn outcome_skeleton(
    device: &DeviceRecord,
    started: Instant,
    disposition: DeviceDisposition,
) -> DeviceOutcome {
    DeviceOutcome {
        device_id: device.id,
        device_name: device.name.clone(),
        host: device.primary_address.clone(),
        disposition,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        output: String::new(),
        failure: None,
        skip: None,
        credential_id: None,
        warnings: Vec::new(),
        validation: None,
        capture_path: None,
    }
}

/// Builder-style helpers keeping worker code flat.
trait OutcomeExt {
    /// Attaches the credential used.
    fn with_credential(self, id: netharvest_core::CredentialId) -> Self;
    /// Attaches a failure record.
    fn with_failure(self, err: DeviceError) -> Self;
    /// Attaches a skip reason.
    fn with_skip(self, reason: SkipReason) -> Self;
}

impl OutcomeExt for DeviceOutcome {
    fn with_credential(mut self, id: netharvest_core::CredentialId) -> Self {
        self.credential_id = Some(id);
        self
    }

    fn with_failure(mut self, err: DeviceError) -> Self {
        self.failure = Some(err.into_failure());
        self
    }

    fn with_skip(mut self, reason: SkipReason) -> Self {
        self.skip = Some(reason);
        self
    }
}
