// crates/netharvest-engine/tests/run_scenarios.rs
// ============================================================================
// Module: Run Scenario Tests
// Description: End-to-end job runs over scripted sessions.
// Purpose: Validate run lifecycles, counting closure, captures, and progress.
// ============================================================================

//! ## Overview
//! Full-run tests driven through the scripted connector:
//! - Happy path: every device captured and validated
//! - Mixed outcomes: partial status with per-kind failures
//! - Validation skips with and without save-on-fail
//! - Per-device credential selection
//! - Serialized pools still emit completion events
//! - Config and cancellation boundaries

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::ARP_OUTPUT;
use common::ARP_TEMPLATE;
use common::MemoryHistory;
use common::MemoryInventory;
use common::MemorySource;
use common::MemoryTemplates;
use common::Script;
use common::ScriptedConnector;
use common::device;
use common::job;
use common::pinned_device;
use netharvest_core::CancelToken;
use netharvest_core::DeviceDisposition;
use netharvest_core::FailureKind;
use netharvest_core::NullProgress;
use netharvest_core::RunStatus;
use netharvest_core::SkipReason;
use netharvest_core::ValidationPolicy;
use netharvest_engine::BufferedProgress;
use netharvest_engine::CredentialResolver;
use netharvest_engine::JobRunner;
use tempfile::TempDir;

// ============================================================================
// SECTION: Harness
// ============================================================================

struct Harness {
    runner: JobRunner,
    history: Arc<MemoryHistory>,
    connector: Arc<ScriptedConnector>,
    _root: TempDir,
    root_path: PathBuf,
}

fn harness(
    devices: Vec<netharvest_core::DeviceRecord>,
    templates: Arc<MemoryTemplates>,
    source: Arc<MemorySource>,
    scripts: &[(&str, Script)],
) -> Harness {
    let root = TempDir::new().expect("tempdir");
    let root_path = root.path().to_path_buf();
    let history = MemoryHistory::new();
    let connector = ScriptedConnector::new(scripts);
    let runner = JobRunner {
        inventory: MemoryInventory::new(devices),
        templates,
        history: Arc::clone(&history) as Arc<dyn netharvest_core::HistoryStore>,
        credentials: CredentialResolver::new(source, None),
        connector: Arc::clone(&connector) as Arc<dyn netharvest_core::DeviceConnector>,
        capture_root: root_path.clone(),
        progress: Arc::new(NullProgress),
    };
    Harness {
        runner,
        history,
        connector,
        _root: root,
        root_path,
    }
}

fn arp_validation(min_score: u8, save_on_fail: bool) -> Option<ValidationPolicy> {
    Some(ValidationPolicy {
        template_filter: "cisco_ios_show_ip_arp".to_string(),
        min_score,
        save_on_fail,
    })
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[tokio::test]
async fn happy_path_captures_every_device() {
    let harness = harness(
        vec![
            device(1, "osl", "edge-01", "10.9.0.1"),
            device(2, "osl", "edge-02", "10.9.0.2"),
            device(3, "osl", "edge-03", "10.9.0.3"),
        ],
        MemoryTemplates::new(&[("cisco_ios_show_ip_arp", ARP_TEMPLATE)]),
        MemorySource::new(&[(1, "lab")], Some(1)),
        &[
            ("10.9.0.1", Script::Output(ARP_OUTPUT.to_string())),
            ("10.9.0.2", Script::Output(ARP_OUTPUT.to_string())),
            ("10.9.0.3", Script::Output(ARP_OUTPUT.to_string())),
        ],
    );
    let spec = job("arp-cache", "show ip arp", arp_validation(30, false));
    let report = harness.runner.run(&spec, &CancelToken::new()).await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.counts.success, 3);
    assert_eq!(report.counts.failed, 0);
    assert!(report.counts.is_closed());

    // Three capture files exist with the transcript bytes.
    let captures = harness.history.capture_rows();
    assert_eq!(captures.len(), 3);
    for capture in &captures {
        let bytes = std::fs::read(&capture.path).expect("capture file");
        assert_eq!(bytes.len() as u64, capture.size_bytes);
        assert!(capture.score.is_some_and(|s| s >= 30));
    }

    // History row reflects the same closure.
    let runs = harness.history.run_rows();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].counts.success, 3);
    assert!(runs[0].completed_at.is_some());
}

// ============================================================================
// SECTION: Mixed Outcomes
// ============================================================================

#[tokio::test]
async fn mixed_outcomes_yield_partial_status() {
    let harness = harness(
        vec![
            device(1, "osl", "sw-01", "10.9.1.1"),
            device(2, "osl", "sw-02", "10.9.1.2"),
            device(3, "osl", "sw-03", "10.9.1.3"),
            device(4, "osl", "sw-04", "10.9.1.4"),
            device(5, "osl", "sw-05", "10.9.1.5"),
        ],
        MemoryTemplates::new(&[("cisco_ios_show_ip_arp", ARP_TEMPLATE)]),
        MemorySource::new(&[(1, "lab")], Some(1)),
        &[
            ("10.9.1.1", Script::Output(ARP_OUTPUT.to_string())),
            ("10.9.1.2", Script::Output(ARP_OUTPUT.to_string())),
            ("10.9.1.3", Script::Output(ARP_OUTPUT.to_string())),
            ("10.9.1.4", Script::Hang),
            ("10.9.1.5", Script::AuthFail),
        ],
    );
    let spec = job("arp-cache", "show ip arp", arp_validation(30, false));
    let report = harness.runner.run(&spec, &CancelToken::new()).await;

    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.counts.success, 3);
    assert_eq!(report.counts.failed, 2);
    assert_eq!(report.counts.skipped, 0);
    assert!(report.counts.is_closed());

    let timeout = report
        .outcomes
        .iter()
        .find(|o| o.host == "10.9.1.4")
        .expect("timeout outcome");
    assert_eq!(timeout.failure.as_ref().map(|f| f.kind), Some(FailureKind::Timeout));
    let auth = report.outcomes.iter().find(|o| o.host == "10.9.1.5").expect("auth outcome");
    assert_eq!(auth.failure.as_ref().map(|f| f.kind), Some(FailureKind::AuthFailed));

    // Only the three successes produced files and capture rows.
    assert_eq!(harness.history.capture_rows().len(), 3);
    assert!(timeout.capture_path.is_none());
    assert!(auth.capture_path.is_none());
}

// ============================================================================
// SECTION: Validation Skips
// ============================================================================

#[tokio::test]
async fn validation_miss_without_save_produces_no_files() {
    let harness = harness(
        vec![
            device(1, "osl", "sw-01", "10.9.2.1"),
            device(2, "osl", "sw-02", "10.9.2.2"),
        ],
        MemoryTemplates::empty(),
        MemorySource::new(&[(1, "lab")], Some(1)),
        &[
            ("10.9.2.1", Script::Output("unparseable banner\n".to_string())),
            ("10.9.2.2", Script::Output("unparseable banner\n".to_string())),
        ],
    );
    let spec = job("arp-cache", "show ip arp", arp_validation(20, false));
    let report = harness.runner.run(&spec, &CancelToken::new()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.counts.skipped, 2);
    assert_eq!(report.counts.success, 0);
    assert!(report.outcomes.iter().all(|o| o.skip == Some(SkipReason::NoTemplate)));
    assert!(harness.history.capture_rows().is_empty());
    // No files anywhere under the capture root.
    let files: Vec<_> = walk_files(&harness.root_path);
    assert!(files.is_empty(), "unexpected files: {files:?}");
}

#[tokio::test]
async fn save_on_fail_writes_files_but_still_skips() {
    let harness = harness(
        vec![
            device(1, "osl", "sw-01", "10.9.3.1"),
            device(2, "osl", "sw-02", "10.9.3.2"),
        ],
        MemoryTemplates::new(&[("cisco_ios_show_ip_arp", ARP_TEMPLATE)]),
        MemorySource::new(&[(1, "lab")], Some(1)),
        &[
            ("10.9.3.1", Script::Output("unparseable banner\n".to_string())),
            ("10.9.3.2", Script::Output("unparseable banner\n".to_string())),
        ],
    );
    let spec = job("arp-cache", "show ip arp", arp_validation(20, true));
    let report = harness.runner.run(&spec, &CancelToken::new()).await;

    // Devices are skipped, never counted successes, yet files exist.
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.counts.skipped, 2);
    assert!(
        report.outcomes.iter().all(|o| o.skip == Some(SkipReason::ValidationFailed))
    );
    assert_eq!(harness.history.capture_rows().len(), 2);
    assert_eq!(walk_files(&harness.root_path).len(), 2);
}

// ============================================================================
// SECTION: Credential Selection
// ============================================================================

#[tokio::test]
async fn pinned_and_default_credentials_are_selected_per_device() {
    let harness = harness(
        vec![
            pinned_device(1, "osl", "legacy-sw", "10.9.4.1", 1),
            device(2, "osl", "lab-sw", "10.9.4.2"),
        ],
        MemoryTemplates::empty(),
        MemorySource::new(&[(1, "legacy"), (2, "lab")], Some(2)),
        &[
            ("10.9.4.1", Script::Output("ok\n".to_string())),
            ("10.9.4.2", Script::Output("ok\n".to_string())),
        ],
    );
    // No validation: both devices succeed and store captures.
    let spec = job("sweep", "show clock", None);
    let report = harness.runner.run(&spec, &CancelToken::new()).await;

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(harness.connector.used_credential("10.9.4.1").as_deref(), Some("legacy"));
    assert_eq!(harness.connector.used_credential("10.9.4.2").as_deref(), Some("lab"));
}

// ============================================================================
// SECTION: Boundaries
// ============================================================================

#[tokio::test]
async fn single_worker_still_emits_completion_events() {
    let root = TempDir::new().expect("tempdir");
    let history = MemoryHistory::new();
    let (progress, mut events) = BufferedProgress::channel();
    let connector = ScriptedConnector::new(&[
        ("10.9.5.1", Script::Output("a\n".to_string())),
        ("10.9.5.2", Script::Output("b\n".to_string())),
        ("10.9.5.3", Script::Output("c\n".to_string())),
    ]);
    let runner = JobRunner {
        inventory: MemoryInventory::new(vec![
            device(1, "osl", "sw-01", "10.9.5.1"),
            device(2, "osl", "sw-02", "10.9.5.2"),
            device(3, "osl", "sw-03", "10.9.5.3"),
        ]),
        templates: MemoryTemplates::empty(),
        history,
        credentials: CredentialResolver::new(MemorySource::new(&[(1, "lab")], Some(1)), None),
        connector,
        capture_root: root.path().to_path_buf(),
        progress: Arc::new(progress),
    };
    let mut spec = job("serial", "show clock", None);
    spec.execution.max_workers = 1;
    let report = runner.run(&spec, &CancelToken::new()).await;
    assert_eq!(report.status, RunStatus::Success);

    let mut indices = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.total, 3);
        indices.push(event.index);
    }
    assert_eq!(indices, vec![1, 2, 3]);
}

#[tokio::test]
async fn zero_timeout_is_a_config_failure_with_no_contact() {
    let harness = harness(
        vec![device(1, "osl", "sw-01", "10.9.6.1")],
        MemoryTemplates::empty(),
        MemorySource::new(&[(1, "lab")], Some(1)),
        &[("10.9.6.1", Script::Output("ok\n".to_string()))],
    );
    let mut spec = job("strict", "show clock", None);
    spec.execution.device_timeout = Duration::ZERO;
    let report = harness.runner.run(&spec, &CancelToken::new()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.as_deref().is_some_and(|e| e.contains("device_timeout")));
    assert!(harness.connector.contacted_hosts().is_empty());
    // The failed run is still recorded and closed.
    let runs = harness.history.run_rows();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn paging_warning_does_not_fail_the_device() {
    let harness = harness(
        vec![device(1, "osl", "sw-01", "10.9.7.1")],
        MemoryTemplates::empty(),
        MemorySource::new(&[(1, "lab")], Some(1)),
        &[(
            "10.9.7.1",
            Script::OutputWithWarning("ok\n".to_string(), "paging prelude failed".to_string()),
        )],
    );
    let spec = job("warned", "show clock", None);
    let report = harness.runner.run(&spec, &CancelToken::new()).await;

    assert_eq!(report.status, RunStatus::Success);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.disposition, DeviceDisposition::Success);
    assert_eq!(outcome.warnings, vec!["paging prelude failed".to_string()]);
}

#[tokio::test]
async fn cancelled_run_skips_unstarted_devices() {
    let harness = harness(
        vec![
            device(1, "osl", "sw-01", "10.9.8.1"),
            device(2, "osl", "sw-02", "10.9.8.2"),
        ],
        MemoryTemplates::empty(),
        MemorySource::new(&[(1, "lab")], Some(1)),
        &[
            ("10.9.8.1", Script::Output("ok\n".to_string())),
            ("10.9.8.2", Script::Output("ok\n".to_string())),
        ],
    );
    let cancel = CancelToken::new();
    cancel.cancel();
    let spec = job("halted", "show clock", None);
    let report = harness.runner.run(&spec, &cancel).await;

    assert_eq!(report.counts.skipped, 2);
    assert_eq!(report.counts.success, 0);
    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.outcomes.iter().all(|o| o.skip == Some(SkipReason::Cancelled)));
    assert!(harness.connector.contacted_hosts().is_empty());
}

#[tokio::test]
async fn cancellation_soft_closes_in_flight_sessions() {
    let harness = harness(
        vec![device(1, "osl", "sw-01", "10.9.10.1")],
        MemoryTemplates::empty(),
        MemorySource::new(&[(1, "lab")], Some(1)),
        &[("10.9.10.1", Script::BlockUntilCancelled)],
    );
    let cancel = CancelToken::new();
    let runner = harness.runner.clone();
    let spec = job("halted-mid-flight", "show clock", None);
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { runner.run(&spec, &cancel).await }
    });
    // Let the session start and block mid-read before cancelling.
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    let report = handle.await.expect("join run task");

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.counts.skipped, 1);
    assert!(report.counts.is_closed());
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.disposition, DeviceDisposition::Skipped);
    assert_eq!(outcome.skip, Some(SkipReason::Cancelled));
    assert!(outcome.capture_path.is_none());
    // The device was contacted: this exercises the in-flight soft-close
    // path, not the unscheduled skip.
    assert_eq!(harness.connector.contacted_hosts(), vec!["10.9.10.1".to_string()]);
    assert!(outcome.duration_ms >= 40);
    // The run still commits its final status.
    let runs = harness.history.run_rows();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].completed_at.is_some());
}

#[tokio::test]
async fn locked_vault_fails_the_job_before_devices() {
    let root = TempDir::new().expect("tempdir");
    let connector = ScriptedConnector::new(&[("10.9.9.1", Script::Output("ok\n".to_string()))]);
    let runner = JobRunner {
        inventory: MemoryInventory::new(vec![device(1, "osl", "sw-01", "10.9.9.1")]),
        templates: MemoryTemplates::empty(),
        history: MemoryHistory::new(),
        credentials: CredentialResolver::new(Arc::new(common::LockedSource), None),
        connector: Arc::clone(&connector) as Arc<dyn netharvest_core::DeviceConnector>,
        capture_root: root.path().to_path_buf(),
        progress: Arc::new(NullProgress),
    };
    let spec = job("locked", "show clock", None);
    let report = runner.run(&spec, &CancelToken::new()).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.error.as_deref().is_some_and(|e| e.contains("locked")));
    assert!(connector.contacted_hosts().is_empty());
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn walk_files(root: &std::path::Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}
