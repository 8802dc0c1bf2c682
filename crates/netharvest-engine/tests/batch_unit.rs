// crates/netharvest-engine/tests/batch_unit.rs
// ============================================================================
// Module: Batch Runner Tests
// Description: Ordered batch execution and stop-on-failure semantics.
// Purpose: Validate sequencing, cancellation records, and aggregates.
// ============================================================================

//! ## Overview
//! Batch-level tests over scripted runs:
//! - A failed (not partial) job cancels the remainder under stop-on-failure
//! - Partial completions never stop the batch
//! - Cancelled members are recorded in history without device work

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;

use common::MemoryHistory;
use common::MemoryInventory;
use common::MemorySource;
use common::MemoryTemplates;
use common::Script;
use common::ScriptedConnector;
use common::device;
use common::job;
use netharvest_core::CancelToken;
use netharvest_core::DeviceFilter;
use netharvest_core::NullProgress;
use netharvest_core::RunStatus;
use netharvest_engine::BatchExecution;
use netharvest_engine::BatchRunner;
use netharvest_engine::CredentialResolver;
use netharvest_engine::JobRunner;
use tempfile::TempDir;

// ============================================================================
// SECTION: Harness
// ============================================================================

struct Harness {
    batch_runner: BatchRunner,
    history: Arc<MemoryHistory>,
    _root: TempDir,
}

fn harness(devices: Vec<netharvest_core::DeviceRecord>, scripts: &[(&str, Script)]) -> Harness {
    let root = TempDir::new().expect("tempdir");
    let history = MemoryHistory::new();
    let runner = JobRunner {
        inventory: MemoryInventory::new(devices),
        templates: MemoryTemplates::empty(),
        history: Arc::clone(&history) as Arc<dyn netharvest_core::HistoryStore>,
        credentials: CredentialResolver::new(MemorySource::new(&[(1, "lab")], Some(1)), None),
        connector: ScriptedConnector::new(scripts),
        capture_root: root.path().to_path_buf(),
        progress: Arc::new(NullProgress),
    };
    Harness {
        batch_runner: BatchRunner {
            runner,
        },
        history,
        _root: root,
    }
}

/// Job whose filter matches nothing: resolves to a failed run.
fn impossible_job(slug: &str) -> netharvest_core::JobSpec {
    let mut spec = job(slug, "show clock", None);
    spec.filter = DeviceFilter {
        vendor: Some("no-such-vendor".to_string()),
        ..DeviceFilter::default()
    };
    spec
}

// ============================================================================
// SECTION: Stop-on-Failure
// ============================================================================

#[tokio::test]
async fn failed_job_cancels_the_remainder() {
    let harness = harness(
        vec![device(1, "osl", "sw-01", "10.8.0.1")],
        &[("10.8.0.1", Script::Output("ok\n".to_string()))],
    );
    let batch = BatchExecution {
        name: "nightly".to_string(),
        jobs: vec![
            impossible_job("doomed"),
            job("second", "show clock", None),
            job("third", "show clock", None),
        ],
        stop_on_failure: true,
        inter_job_pause: None,
        max_concurrent_jobs: 1,
    };
    let report = harness.batch_runner.run(&batch, &CancelToken::new()).await;

    assert_eq!(report.jobs_failed, 1);
    assert_eq!(report.jobs_cancelled, 2);
    assert_eq!(report.jobs_attempted, 1);
    assert_eq!(report.jobs[0].status, RunStatus::Failed);
    assert_eq!(report.jobs[1].status, RunStatus::Cancelled);
    assert_eq!(report.jobs[2].status, RunStatus::Cancelled);

    // History carries one failed run and two cancelled rows.
    let rows = harness.history.run_rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|r| r.status == RunStatus::Cancelled).count(), 2);
}

#[tokio::test]
async fn partial_job_does_not_stop_the_batch() {
    let harness = harness(
        vec![
            device(1, "osl", "sw-01", "10.8.1.1"),
            device(2, "osl", "sw-02", "10.8.1.2"),
        ],
        &[
            ("10.8.1.1", Script::Output("ok\n".to_string())),
            ("10.8.1.2", Script::AuthFail),
        ],
    );
    let batch = BatchExecution {
        name: "tolerant".to_string(),
        jobs: vec![job("mixed", "show clock", None), job("after", "show clock", None)],
        stop_on_failure: true,
        inter_job_pause: None,
        max_concurrent_jobs: 1,
    };
    let report = harness.batch_runner.run(&batch, &CancelToken::new()).await;

    assert_eq!(report.jobs[0].status, RunStatus::Partial);
    assert_eq!(report.jobs[1].status, RunStatus::Partial);
    assert_eq!(report.jobs_cancelled, 0);
    assert_eq!(report.jobs_attempted, 2);
}

#[tokio::test]
async fn without_stop_on_failure_every_job_runs() {
    let harness = harness(
        vec![device(1, "osl", "sw-01", "10.8.2.1")],
        &[("10.8.2.1", Script::Output("ok\n".to_string()))],
    );
    let batch = BatchExecution {
        name: "relaxed".to_string(),
        jobs: vec![impossible_job("doomed"), job("after", "show clock", None)],
        stop_on_failure: false,
        inter_job_pause: None,
        max_concurrent_jobs: 1,
    };
    let report = harness.batch_runner.run(&batch, &CancelToken::new()).await;

    assert_eq!(report.jobs_failed, 1);
    assert_eq!(report.jobs_cancelled, 0);
    assert_eq!(report.jobs[1].status, RunStatus::Success);
    assert_eq!(report.jobs_attempted, 2);
}

// ============================================================================
// SECTION: Aggregates
// ============================================================================

#[tokio::test]
async fn device_totals_sum_across_jobs() {
    let harness = harness(
        vec![
            device(1, "osl", "sw-01", "10.8.3.1"),
            device(2, "osl", "sw-02", "10.8.3.2"),
        ],
        &[
            ("10.8.3.1", Script::Output("ok\n".to_string())),
            ("10.8.3.2", Script::Output("ok\n".to_string())),
        ],
    );
    let batch = BatchExecution {
        name: "sums".to_string(),
        jobs: vec![job("one", "show clock", None), job("two", "show version", None)],
        stop_on_failure: false,
        inter_job_pause: None,
        max_concurrent_jobs: 1,
    };
    let report = harness.batch_runner.run(&batch, &CancelToken::new()).await;

    assert_eq!(report.devices.total, 4);
    assert_eq!(report.devices.success, 4);
    assert_eq!(report.jobs_succeeded, 2);
}

#[tokio::test]
async fn bounded_parallel_batches_complete_every_job() {
    let harness = harness(
        vec![device(1, "osl", "sw-01", "10.8.4.1")],
        &[("10.8.4.1", Script::Output("ok\n".to_string()))],
    );
    let batch = BatchExecution {
        name: "wide".to_string(),
        jobs: vec![
            job("a", "show clock", None),
            job("b", "show clock", None),
            job("c", "show clock", None),
            job("d", "show clock", None),
        ],
        stop_on_failure: false,
        inter_job_pause: None,
        max_concurrent_jobs: 2,
    };
    let report = harness.batch_runner.run(&batch, &CancelToken::new()).await;

    assert_eq!(report.jobs_attempted, 4);
    assert_eq!(report.jobs_succeeded, 4);
    assert_eq!(report.devices.total, 4);
}
