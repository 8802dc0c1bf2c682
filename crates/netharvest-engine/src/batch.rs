// crates/netharvest-engine/src/batch.rs
// ============================================================================
// Module: Netharvest Batch Runner
// Description: Ordered job composition with bounded job-level parallelism.
// Purpose: Execute batches with inter-job pauses and stop-on-failure.
// Dependencies: tokio, netharvest-core, crate::runner
// ============================================================================

//! ## Overview
//! A batch executes its jobs sequentially by default; a descriptor may
//! raise the job-parallelism cap, in which case batch order still governs
//! start order but not completion order. Stop-on-failure is triggered only
//! by a *failed* completion (partial runs do not stop the batch); jobs that
//! never start because of it are recorded *cancelled* in history. Each
//! job's history record is fully committed before the next job starts in
//! sequential mode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use netharvest_core::BatchReport;
use netharvest_core::CancelToken;
use netharvest_core::JobReport;
use netharvest_core::JobSlug;
use netharvest_core::JobSpec;
use netharvest_core::RunStatus;
use netharvest_core::core::time::now_utc;
use tokio::sync::Semaphore;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::runner::JobRunner;

// ============================================================================
// SECTION: Batch Plan Input
// ============================================================================

/// Execution parameters for one batch.
#[derive(Debug, Clone)]
pub struct BatchExecution {
    /// Batch name (for logs and reports).
    pub name: String,
    /// Ordered jobs to execute.
    pub jobs: Vec<JobSpec>,
    /// Whether a failed job cancels the remainder.
    pub stop_on_failure: bool,
    /// Optional pause between jobs.
    pub inter_job_pause: Option<Duration>,
    /// Bounded job-level parallelism (1 = strict sequential).
    pub max_concurrent_jobs: usize,
}

// ============================================================================
// SECTION: Batch Runner
// ============================================================================

/// Executes batches over a shared job runner.
pub struct BatchRunner {
    /// Job runner shared by every batch member.
    pub runner: JobRunner,
}

impl BatchRunner {
    /// Executes one batch to completion.
    pub async fn run(&self, batch: &BatchExecution, cancel: &CancelToken) -> BatchReport {
        let started = Instant::now();
        info!(batch = %batch.name, jobs = batch.jobs.len(), "batch started");
        let reports = if batch.max_concurrent_jobs <= 1 {
            self.run_sequential(batch, cancel).await
        } else {
            self.run_bounded(batch, cancel).await
        };

        let mut report = BatchReport {
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ..BatchReport::default()
        };
        for job in reports {
            match job.status {
                RunStatus::Success => {
                    report.jobs_attempted += 1;
                    report.jobs_succeeded += 1;
                }
                RunStatus::Partial => {
                    report.jobs_attempted += 1;
                    report.jobs_partial += 1;
                }
                RunStatus::Failed | RunStatus::Running => {
                    report.jobs_attempted += 1;
                    report.jobs_failed += 1;
                }
                RunStatus::Cancelled => report.jobs_cancelled += 1,
            }
            report.devices.total += job.counts.total;
            report.devices.success += job.counts.success;
            report.devices.failed += job.counts.failed;
            report.devices.skipped += job.counts.skipped;
            report.jobs.push(job);
        }
        info!(batch = %batch.name, attempted = report.jobs_attempted,
              failed = report.jobs_failed, cancelled = report.jobs_cancelled,
              "batch finished");
        report
    }

    /// Strict sequential execution: each history record commits before the
    /// next job starts.
    async fn run_sequential(&self, batch: &BatchExecution, cancel: &CancelToken) -> Vec<JobReport> {
        let mut reports = Vec::with_capacity(batch.jobs.len());
        let mut stopped = false;
        let last = batch.jobs.len().saturating_sub(1);
        for (index, job) in batch.jobs.iter().enumerate() {
            if stopped || cancel.is_cancelled() {
                reports.push(self.cancel_job(&job.slug));
                continue;
            }
            let report = self.runner.run(job, cancel).await;
            if batch.stop_on_failure && report.status == RunStatus::Failed {
                warn!(batch = %batch.name, job = %job.slug, "stop-on-failure engaged");
                stopped = true;
            }
            reports.push(report);
            if index < last
                && !stopped
                && let Some(pause) = batch.inter_job_pause
            {
                tokio::time::sleep(pause).await;
            }
        }
        reports
    }

    /// Bounded-parallel execution: start order follows batch order, but
    /// completions interleave.
    async fn run_bounded(&self, batch: &BatchExecution, cancel: &CancelToken) -> Vec<JobReport> {
        let semaphore = Arc::new(Semaphore::new(batch.max_concurrent_jobs));
        let stop = CancelToken::new();
        let mut handles = Vec::with_capacity(batch.jobs.len());
        for job in batch.jobs.clone() {
            let semaphore = Arc::clone(&semaphore);
            let runner = self.runner.clone();
            let cancel = cancel.clone();
            let stop = stop.clone();
            let stop_on_failure = batch.stop_on_failure;
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if stop.is_cancelled() || cancel.is_cancelled() {
                    return Some(Err(job.slug));
                }
                let report = runner.run(&job, &cancel).await;
                if stop_on_failure && report.status == RunStatus::Failed {
                    stop.cancel();
                }
                Some(Ok(report))
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Some(Ok(report))) => reports.push(report),
                Ok(Some(Err(slug))) => reports.push(self.cancel_job(&slug)),
                Ok(None) => {}
                Err(err) => error!(error = %err, "batch job task aborted"),
            }
        }
        reports
    }

    /// Records one cancelled batch member.
    fn cancel_job(&self, slug: &JobSlug) -> JobReport {
        let run_id = match self.runner.history.record_cancelled_run(slug, now_utc()) {
            Ok(run_id) => Some(run_id),
            Err(err) => {
                error!(job = %slug, error = %err, "failed to record cancelled run");
                None
            }
        };
        JobReport {
            run_id,
            slug: slug.clone(),
            status: RunStatus::Cancelled,
            counts: netharvest_core::DeviceCounts::default(),
            error: Some("cancelled by stop-on-failure".to_string()),
            outcomes: Vec::new(),
            duration_ms: 0,
        }
    }
}
