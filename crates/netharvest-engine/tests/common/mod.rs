// crates/netharvest-engine/tests/common/mod.rs
// ============================================================================
// Module: Engine Test Fixtures
// Description: In-memory stores and a scripted connector for engine tests.
// Purpose: Drive full runs without a network or database.
// ============================================================================

//! ## Overview
//! Shared fixtures for the engine test suites: in-memory implementations of
//! every store seam, a scripted device connector keyed by host, and
//! builders for devices and jobs.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only helpers; not every suite uses every fixture."
)]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use netharvest_core::CancelToken;
use netharvest_core::CaptureId;
use netharvest_core::CaptureKind;
use netharvest_core::CaptureRecord;
use netharvest_core::CommandPlan;
use netharvest_core::ConnectSpec;
use netharvest_core::CredentialError;
use netharvest_core::CredentialId;
use netharvest_core::CredentialSource;
use netharvest_core::CredentialTest;
use netharvest_core::DeviceConnector;
use netharvest_core::DeviceCounts;
use netharvest_core::DeviceError;
use netharvest_core::DeviceFilter;
use netharvest_core::DeviceId;
use netharvest_core::DeviceRecord;
use netharvest_core::DeviceStatus;
use netharvest_core::ExecutionPolicy;
use netharvest_core::HistoryStore;
use netharvest_core::InventoryStore;
use netharvest_core::JobId;
use netharvest_core::JobSlug;
use netharvest_core::JobSpec;
use netharvest_core::NewCapture;
use netharvest_core::OutputPolicy;
use netharvest_core::PlatformId;
use netharvest_core::ResolvedCredential;
use netharvest_core::RoleId;
use netharvest_core::RunId;
use netharvest_core::RunKey;
use netharvest_core::RunRecord;
use netharvest_core::RunStatus;
use netharvest_core::SiteId;
use netharvest_core::StoreError;
use netharvest_core::TemplateRecord;
use netharvest_core::TemplateStore;
use netharvest_core::Transcript;
use netharvest_core::ValidationPolicy;
use netharvest_core::core::time::now_utc;
use time::OffsetDateTime;

// ============================================================================
// SECTION: In-Memory Inventory
// ============================================================================

/// Inventory store backed by a vector.
#[derive(Default)]
pub struct MemoryInventory {
    /// Device rows.
    pub devices: Mutex<Vec<DeviceRecord>>,
}

impl MemoryInventory {
    pub fn new(devices: Vec<DeviceRecord>) -> Arc<Self> {
        Arc::new(Self {
            devices: Mutex::new(devices),
        })
    }

    pub fn device(&self, id: DeviceId) -> Option<DeviceRecord> {
        self.devices.lock().expect("lock").iter().find(|d| d.id == id).cloned()
    }
}

impl InventoryStore for MemoryInventory {
    fn devices(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        Ok(self.devices.lock().expect("lock").clone())
    }

    fn record_credential_test(
        &self,
        device: DeviceId,
        test: &CredentialTest,
    ) -> Result<(), StoreError> {
        let mut devices = self.devices.lock().expect("lock");
        let Some(row) = devices.iter_mut().find(|d| d.id == device) else {
            return Err(StoreError::NotFound(format!("device {device}")));
        };
        if test.result == netharvest_core::CredentialTestResult::Success {
            row.pinned_credential_id = test.credential_id;
        }
        row.last_credential_test = Some(test.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: In-Memory Templates
// ============================================================================

/// Template store backed by a vector.
pub struct MemoryTemplates {
    /// Template rows.
    pub records: Vec<TemplateRecord>,
}

impl MemoryTemplates {
    pub fn new(entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            records: entries
                .iter()
                .map(|(identifier, body)| TemplateRecord {
                    identifier: (*identifier).to_string(),
                    body: (*body).to_string(),
                    dedup_hash: String::new(),
                })
                .collect(),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            records: Vec::new(),
        })
    }
}

impl TemplateStore for MemoryTemplates {
    fn candidates(&self, required_terms: &[String]) -> Result<Vec<TemplateRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| required_terms.iter().all(|t| r.identifier.contains(t.as_str())))
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: In-Memory History
// ============================================================================

/// History store backed by vectors, mirroring the SQLite semantics.
#[derive(Default)]
pub struct MemoryHistory {
    /// Run rows.
    pub runs: Mutex<Vec<RunRecord>>,
    /// Capture rows.
    pub captures: Mutex<Vec<CaptureRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn run_rows(&self) -> Vec<RunRecord> {
        self.runs.lock().expect("lock").clone()
    }

    pub fn capture_rows(&self) -> Vec<CaptureRecord> {
        self.captures.lock().expect("lock").clone()
    }
}

impl HistoryStore for MemoryHistory {
    fn begin_run(
        &self,
        job: &JobSlug,
        total: u64,
        started_at: OffsetDateTime,
    ) -> Result<RunId, StoreError> {
        let mut runs = self.runs.lock().expect("lock");
        let id = RunId::from_raw(runs.len() as u64 + 1).expect("id");
        runs.push(RunRecord {
            id,
            job_slug: job.clone(),
            started_at,
            completed_at: None,
            counts: DeviceCounts {
                total,
                ..DeviceCounts::default()
            },
            status: RunStatus::Running,
            error: None,
        });
        Ok(id)
    }

    fn finish_run(
        &self,
        run: RunId,
        counts: &DeviceCounts,
        status: RunStatus,
        error: Option<&str>,
        completed_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().expect("lock");
        let Some(row) =
            runs.iter_mut().find(|r| r.id == run && r.status == RunStatus::Running)
        else {
            return Err(StoreError::NotFound(format!("running run {run}")));
        };
        row.counts = *counts;
        row.status = status;
        row.error = error.map(str::to_string);
        row.completed_at = Some(completed_at);
        Ok(())
    }

    fn record_cancelled_run(&self, job: &JobSlug, at: OffsetDateTime) -> Result<RunId, StoreError> {
        let mut runs = self.runs.lock().expect("lock");
        let id = RunId::from_raw(runs.len() as u64 + 1).expect("id");
        runs.push(RunRecord {
            id,
            job_slug: job.clone(),
            started_at: at,
            completed_at: Some(at),
            counts: DeviceCounts::default(),
            status: RunStatus::Cancelled,
            error: None,
        });
        Ok(id)
    }

    fn record_capture(&self, capture: &NewCapture) -> Result<CaptureId, StoreError> {
        let mut captures = self.captures.lock().expect("lock");
        let duplicate = captures
            .iter()
            .any(|c| c.run_id == capture.run_id && c.device_name == capture.device_name);
        if duplicate {
            return Err(StoreError::Invalid(format!(
                "capture already recorded for {} in run {}",
                capture.device_name, capture.run_id
            )));
        }
        let id = CaptureId::from_raw(captures.len() as u64 + 1).expect("id");
        captures.push(CaptureRecord {
            id,
            run_id: capture.run_id,
            device_name: capture.device_name.clone(),
            kind: capture.kind,
            path: capture.path.clone(),
            size_bytes: capture.size_bytes,
            captured_at: capture.captured_at,
            score: capture.score,
        });
        Ok(id)
    }

    fn runs(&self, job: Option<&JobSlug>, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let mut rows = self.run_rows();
        if let Some(slug) = job {
            rows.retain(|r| &r.job_slug == slug);
        }
        rows.reverse();
        rows.truncate(limit);
        Ok(rows)
    }

    fn run(&self, key: &RunKey) -> Result<Option<RunRecord>, StoreError> {
        let rows = self.run_rows();
        Ok(match key {
            RunKey::Id(id) => rows.into_iter().find(|r| r.id == *id),
            RunKey::Identity {
                slug,
                started_at,
            } => rows
                .into_iter()
                .find(|r| &r.job_slug == slug && r.started_at == *started_at),
        })
    }

    fn captures(&self, run: RunId) -> Result<Vec<CaptureRecord>, StoreError> {
        Ok(self.capture_rows().into_iter().filter(|c| c.run_id == run).collect())
    }
}

// ============================================================================
// SECTION: In-Memory Credential Source
// ============================================================================

/// Credential source backed by a map.
pub struct MemorySource {
    /// Credentials keyed by raw id.
    pub credentials: BTreeMap<u64, ResolvedCredential>,
    /// Default credential raw id.
    pub default_id: Option<u64>,
}

impl MemorySource {
    pub fn new(entries: &[(u64, &str)], default_id: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            credentials: entries
                .iter()
                .map(|(id, name)| (*id, credential(*id, name)))
                .collect(),
            default_id,
        })
    }
}

pub fn credential(id: u64, name: &str) -> ResolvedCredential {
    ResolvedCredential {
        id: CredentialId::from_raw(id).expect("id"),
        name: name.to_string(),
        username: "netops".to_string(),
        password: Some("pw".to_string()),
        private_key: None,
        key_passphrase: None,
    }
}

impl CredentialSource for MemorySource {
    fn credential(&self, id: CredentialId) -> Result<Option<ResolvedCredential>, CredentialError> {
        Ok(self.credentials.get(&id.get()).cloned())
    }

    fn default_credential(&self) -> Result<Option<ResolvedCredential>, CredentialError> {
        Ok(self.default_id.and_then(|id| self.credentials.get(&id).cloned()))
    }

    fn all_credentials(&self) -> Result<Vec<ResolvedCredential>, CredentialError> {
        Ok(self.credentials.values().cloned().collect())
    }
}

/// Credential source that is always locked.
pub struct LockedSource;

impl CredentialSource for LockedSource {
    fn credential(
        &self,
        _id: CredentialId,
    ) -> Result<Option<ResolvedCredential>, CredentialError> {
        Err(CredentialError::Locked)
    }

    fn default_credential(&self) -> Result<Option<ResolvedCredential>, CredentialError> {
        Err(CredentialError::Locked)
    }

    fn all_credentials(&self) -> Result<Vec<ResolvedCredential>, CredentialError> {
        Err(CredentialError::Locked)
    }
}

// ============================================================================
// SECTION: Scripted Connector
// ============================================================================

/// Behavior of one scripted host.
#[derive(Debug, Clone)]
pub enum Script {
    /// Session succeeds with this transcript output.
    Output(String),
    /// Session succeeds and records a paging warning.
    OutputWithWarning(String, String),
    /// Authentication is rejected.
    AuthFail,
    /// Transport-level failure.
    Unreachable,
    /// Session exceeds the per-device deadline.
    Hang,
    /// Session blocks mid-read until the cancellation token fires, then
    /// reports the soft-close the way the real connector does.
    BlockUntilCancelled,
    /// Only the named credentials authenticate (probe scripting).
    AcceptCredentials(Vec<String>),
}

/// Scripted connector keyed by host address.
#[derive(Default)]
pub struct ScriptedConnector {
    /// Host behaviors.
    pub scripts: HashMap<String, Script>,
    /// Credential name used per host, recorded on success.
    pub used_credentials: Mutex<HashMap<String, String>>,
    /// Hosts contacted at least once.
    pub contacted: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new(entries: &[(&str, Script)]) -> Arc<Self> {
        Arc::new(Self {
            scripts: entries
                .iter()
                .map(|(host, script)| ((*host).to_string(), script.clone()))
                .collect(),
            used_credentials: Mutex::new(HashMap::new()),
            contacted: Mutex::new(Vec::new()),
        })
    }

    pub fn used_credential(&self, host: &str) -> Option<String> {
        self.used_credentials.lock().expect("lock").get(host).cloned()
    }

    pub fn contacted_hosts(&self) -> Vec<String> {
        self.contacted.lock().expect("lock").clone()
    }

    fn script_for(&self, host: &str) -> Script {
        self.contacted.lock().expect("lock").push(host.to_string());
        self.scripts.get(host).cloned().unwrap_or(Script::Unreachable)
    }
}

#[async_trait]
impl DeviceConnector for ScriptedConnector {
    async fn probe(
        &self,
        spec: &ConnectSpec,
        credential: &ResolvedCredential,
        _timeout: Duration,
    ) -> Result<(), DeviceError> {
        match self.script_for(&spec.host) {
            Script::AcceptCredentials(names) => {
                if names.iter().any(|n| n == &credential.name) {
                    self.used_credentials
                        .lock()
                        .expect("lock")
                        .insert(spec.host.clone(), credential.name.clone());
                    Ok(())
                } else {
                    Err(DeviceError::AuthFailed("rejected".to_string()))
                }
            }
            Script::Output(_) | Script::OutputWithWarning(_, _) => Ok(()),
            Script::AuthFail => Err(DeviceError::AuthFailed("rejected".to_string())),
            Script::Unreachable => Err(DeviceError::Transport("connection refused".to_string())),
            Script::Hang | Script::BlockUntilCancelled => Err(DeviceError::Timeout(1_000)),
        }
    }

    async fn run_commands(
        &self,
        spec: &ConnectSpec,
        credential: &ResolvedCredential,
        plan: &CommandPlan,
        cancel: &CancelToken,
    ) -> Result<Transcript, DeviceError> {
        match self.script_for(&spec.host) {
            Script::Output(output) => {
                self.used_credentials
                    .lock()
                    .expect("lock")
                    .insert(spec.host.clone(), credential.name.clone());
                Ok(Transcript {
                    output,
                    warnings: Vec::new(),
                })
            }
            Script::OutputWithWarning(output, warning) => Ok(Transcript {
                output,
                warnings: vec![warning],
            }),
            Script::AuthFail => Err(DeviceError::AuthFailed("rejected".to_string())),
            Script::Unreachable => {
                Err(DeviceError::Transport("connection refused".to_string()))
            }
            Script::Hang => {
                tokio::time::sleep(plan.deadline).await;
                Err(DeviceError::Timeout(
                    u64::try_from(plan.deadline.as_millis()).unwrap_or(u64::MAX),
                ))
            }
            Script::BlockUntilCancelled => {
                while !cancel.is_cancelled() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Err(DeviceError::Command("session closed on cancellation".to_string()))
            }
            Script::AcceptCredentials(_) => Ok(Transcript::default()),
        }
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Builds a device with sequential identifiers.
pub fn device(id: u64, site: &str, name: &str, host: &str) -> DeviceRecord {
    DeviceRecord {
        id: DeviceId::from_raw(id).expect("id"),
        name: name.to_string(),
        primary_address: host.to_string(),
        site_id: SiteId::from_raw(1).expect("id"),
        site_name: site.to_string(),
        platform_id: PlatformId::from_raw(1).expect("id"),
        platform_name: "catalyst-9300".to_string(),
        manufacturer: "Cisco Systems".to_string(),
        driver_hint: "cisco-ios".to_string(),
        paging_disable: Some("terminal length 0".to_string()),
        role_id: RoleId::from_raw(1).expect("id"),
        role_name: "access".to_string(),
        status: DeviceStatus::Active,
        pinned_credential_id: None,
        last_credential_test: None,
    }
}

/// Builds a device with a pinned credential marked tested-good.
pub fn pinned_device(id: u64, site: &str, name: &str, host: &str, pin: u64) -> DeviceRecord {
    let mut record = device(id, site, name, host);
    let pin = CredentialId::from_raw(pin).expect("id");
    record.pinned_credential_id = Some(pin);
    record.last_credential_test = Some(CredentialTest {
        credential_id: Some(pin),
        result: netharvest_core::CredentialTestResult::Success,
        tested_at: now_utc(),
    });
    record
}

/// Builds a state-capture job over one command.
pub fn job(slug: &str, command: &str, validation: Option<ValidationPolicy>) -> JobSpec {
    JobSpec {
        slug: JobSlug::parse(slug).expect("slug"),
        id: JobId::from_raw(1).expect("id"),
        capture_kind: CaptureKind::State,
        vendor_hint: None,
        commands: vec![command.to_string()],
        paging_prelude: None,
        filter: DeviceFilter::default(),
        validation,
        execution: ExecutionPolicy {
            max_workers: 4,
            device_timeout: Duration::from_millis(500),
            inter_command_pause: None,
        },
        output: OutputPolicy {
            subdir: "captures".to_string(),
            filename_template: "{device_name}.txt".to_string(),
        },
        enabled: true,
    }
}

/// Conventional ARP template body used across scenarios.
pub const ARP_TEMPLATE: &str = "\
Value PROTOCOL (\\S+)
Value Required ADDRESS (\\d+\\.\\d+\\.\\d+\\.\\d+)
Value AGE (\\S+)
Value MAC ([0-9a-f]{4}\\.[0-9a-f]{4}\\.[0-9a-f]{4})
Value INTERFACE (\\S+)

Start
  ^${PROTOCOL}\\s+${ADDRESS}\\s+${AGE}\\s+${MAC}\\s+ARPA\\s+${INTERFACE} -> Record
";

/// Conventional ARP output matching [`ARP_TEMPLATE`].
pub const ARP_OUTPUT: &str = "\
Internet  10.0.0.1   5  0012.7f57.ac01  ARPA  Vlan10
Internet  10.0.0.2   7  0012.7f57.ac02  ARPA  Vlan10
Internet  10.0.0.3   9  0012.7f57.ac03  ARPA  Vlan20
";
