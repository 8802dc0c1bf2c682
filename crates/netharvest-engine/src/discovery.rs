// crates/netharvest-engine/src/discovery.rs
// ============================================================================
// Module: Netharvest Credential Discovery
// Description: Bulk connect-only probing to find working credentials.
// Purpose: Pin the first authenticating credential to each device.
// Dependencies: futures, tokio, netharvest-core
// ============================================================================

//! ## Overview
//! Discovery runs out-of-band from normal collection: for each device it
//! probes candidate credentials in order, pinning the first that reaches a
//! prompt. Candidate order puts any previously successful credential first.
//! A non-auth failure (timeout, DNS, refused) abandons the device's
//! remaining candidates; retrying other secrets against an unreachable host
//! is useless and risks account lockouts. Devices probed successfully
//! within the skip threshold are not touched at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use netharvest_core::CancelToken;
use netharvest_core::ConnectSpec;
use netharvest_core::CredentialId;
use netharvest_core::CredentialTest;
use netharvest_core::CredentialTestResult;
use netharvest_core::DeviceConnector;
use netharvest_core::DeviceId;
use netharvest_core::DeviceRecord;
use netharvest_core::InventoryStore;
use netharvest_core::ResolvedCredential;
use netharvest_core::core::time::now_utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::info;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Discovery sweep parameters.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum devices probed concurrently.
    pub rate_cap: usize,
    /// Per-probe timeout.
    pub probe_timeout: Duration,
    /// Devices with a successful probe newer than this are skipped.
    pub skip_recent: Option<Duration>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            rate_cap: 8,
            probe_timeout: Duration::from_secs(15),
            skip_recent: None,
        }
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Terminal state of one probed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeDisposition {
    /// A candidate authenticated and was pinned.
    Pinned,
    /// Every candidate was rejected.
    FailedUntested,
    /// The device could not be reached; remaining candidates abandoned.
    FailedUnreachable,
    /// Device was skipped under the recent-success threshold.
    SkippedRecent,
}

/// One device's discovery result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Device name.
    pub device_name: String,
    /// Terminal state.
    pub disposition: ProbeDisposition,
    /// Pinned credential, when one authenticated.
    pub credential_id: Option<CredentialId>,
    /// Candidates attempted before the terminal state.
    pub candidates_tried: usize,
    /// Last error text for failed devices.
    pub error: Option<String>,
}

/// Aggregate discovery report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// Devices pinned to a working credential.
    pub pinned: u64,
    /// Devices where every candidate was rejected.
    pub failed_untested: u64,
    /// Devices that were unreachable.
    pub failed_unreachable: u64,
    /// Devices skipped under the recent-success threshold.
    pub skipped_recent: u64,
    /// Per-device results in completion order.
    pub results: Vec<ProbeResult>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Discovery engine over the transport and inventory write-back seam.
pub struct DiscoveryEngine {
    /// Inventory store receiving pin-backs.
    pub inventory: Arc<dyn InventoryStore>,
    /// Device transport used for connect-only probes.
    pub connector: Arc<dyn DeviceConnector>,
}

impl DiscoveryEngine {
    /// Probes a device set against candidate credentials.
    pub async fn sweep(
        &self,
        devices: Vec<DeviceRecord>,
        candidates: Vec<ResolvedCredential>,
        config: &DiscoveryConfig,
        cancel: &CancelToken,
    ) -> DiscoveryReport {
        let semaphore = Arc::new(Semaphore::new(config.rate_cap.max(1)));
        let candidates = Arc::new(candidates);
        let mut aggregate = DiscoveryReport::default();
        let mut tasks = FuturesUnordered::new();

        for device in devices {
            if let Some(result) = self.skip_if_recent(&device, config) {
                tally(&mut aggregate, &result);
                continue;
            }
            let semaphore = Arc::clone(&semaphore);
            let candidates = Arc::clone(&candidates);
            let connector = Arc::clone(&self.connector);
            let inventory = Arc::clone(&self.inventory);
            let cancel = cancel.clone();
            let timeout = config.probe_timeout;
            tasks.push(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if cancel.is_cancelled() {
                    return None;
                }
                let result =
                    probe_device(connector.as_ref(), &device, &candidates, timeout).await;
                record_result(inventory.as_ref(), &result);
                Some(result)
            });
        }

        while let Some(finished) = tasks.next().await {
            if let Some(result) = finished {
                tally(&mut aggregate, &result);
            }
        }
        info!(
            pinned = aggregate.pinned,
            untested = aggregate.failed_untested,
            unreachable = aggregate.failed_unreachable,
            skipped = aggregate.skipped_recent,
            "discovery sweep finished"
        );
        aggregate
    }

    /// Returns a skip result when the device was recently probed good.
    fn skip_if_recent(
        &self,
        device: &DeviceRecord,
        config: &DiscoveryConfig,
    ) -> Option<ProbeResult> {
        let threshold = config.skip_recent?;
        let test = device.last_credential_test.as_ref()?;
        if test.result != CredentialTestResult::Success {
            return None;
        }
        let age = now_utc() - test.tested_at;
        let threshold = time::Duration::try_from(threshold).unwrap_or(time::Duration::MAX);
        if age <= threshold {
            debug!(device = %device.name, "skipping recently verified device");
            return Some(ProbeResult {
                device_id: device.id,
                device_name: device.name.clone(),
                disposition: ProbeDisposition::SkippedRecent,
                credential_id: test.credential_id,
                candidates_tried: 0,
                error: None,
            });
        }
        None
    }
}

/// Probes one device through its ordered candidate list.
async fn probe_device(
    connector: &dyn DeviceConnector,
    device: &DeviceRecord,
    candidates: &[ResolvedCredential],
    timeout: Duration,
) -> ProbeResult {
    let spec = ConnectSpec::for_device(device);
    let ordered = order_candidates(device, candidates);
    let mut tried = 0usize;
    let mut last_error = None;

    for candidate in &ordered {
        tried += 1;
        match connector.probe(&spec, candidate, timeout).await {
            Ok(()) => {
                return ProbeResult {
                    device_id: device.id,
                    device_name: device.name.clone(),
                    disposition: ProbeDisposition::Pinned,
                    credential_id: Some(candidate.id),
                    candidates_tried: tried,
                    error: None,
                };
            }
            Err(err) if err.aborts_discovery() => {
                return ProbeResult {
                    device_id: device.id,
                    device_name: device.name.clone(),
                    disposition: ProbeDisposition::FailedUnreachable,
                    credential_id: None,
                    candidates_tried: tried,
                    error: Some(err.to_string()),
                };
            }
            Err(err) => {
                debug!(device = %device.name, credential = %candidate.name,
                       error = %err, "candidate rejected");
                last_error = Some(err.to_string());
            }
        }
    }
    ProbeResult {
        device_id: device.id,
        device_name: device.name.clone(),
        disposition: ProbeDisposition::FailedUntested,
        credential_id: None,
        candidates_tried: tried,
        error: last_error,
    }
}

/// Orders candidates with any previously successful credential first.
fn order_candidates(
    device: &DeviceRecord,
    candidates: &[ResolvedCredential],
) -> Vec<ResolvedCredential> {
    let preferred = device
        .last_credential_test
        .as_ref()
        .filter(|t| t.result == CredentialTestResult::Success)
        .and_then(|t| t.credential_id)
        .or(device.pinned_credential_id);
    let mut ordered: Vec<ResolvedCredential> = Vec::with_capacity(candidates.len());
    if let Some(preferred) = preferred
        && let Some(hit) = candidates.iter().find(|c| c.id == preferred)
    {
        ordered.push(hit.clone());
    }
    for candidate in candidates {
        if ordered.iter().all(|c| c.id != candidate.id) {
            ordered.push(candidate.clone());
        }
    }
    ordered
}

/// Writes one probe result back to the inventory store.
fn record_result(inventory: &dyn InventoryStore, result: &ProbeResult) {
    let test = CredentialTest {
        credential_id: result.credential_id,
        result: match result.disposition {
            ProbeDisposition::Pinned => CredentialTestResult::Success,
            ProbeDisposition::FailedUntested => CredentialTestResult::Untested,
            ProbeDisposition::FailedUnreachable => CredentialTestResult::Unreachable,
            ProbeDisposition::SkippedRecent => return,
        },
        tested_at: now_utc(),
    };
    if let Err(err) = inventory.record_credential_test(result.device_id, &test) {
        tracing::warn!(device = %result.device_name, error = %err,
                       "failed to record probe result");
    }
}

/// Adds one result to a report's counters.
fn tally(report: &mut DiscoveryReport, result: &ProbeResult) {
    match result.disposition {
        ProbeDisposition::Pinned => report.pinned += 1,
        ProbeDisposition::FailedUntested => report.failed_untested += 1,
        ProbeDisposition::FailedUnreachable => report.failed_unreachable += 1,
        ProbeDisposition::SkippedRecent => report.skipped_recent += 1,
    }
    report.results.push(result.clone());
}
