// crates/netharvest-core/src/interfaces/mod.rs
// ============================================================================
// Module: Netharvest Interfaces
// Description: Trait seams between the engine and its collaborators.
// Purpose: Keep stores, vault, transport, and progress behind narrow traits.
// Dependencies: async-trait, serde, thiserror, zeroize
// ============================================================================

//! ## Overview
//! The engine talks to every external collaborator through the traits in
//! this module: inventory/template/history stores, the credential source
//! backed by the vault, the SSH transport, and the progress sink. Concrete
//! implementations live in sibling crates; tests substitute in-memory fakes.
//!
//! Inventory, templates, and credentials are read-only during a run. The
//! single inventory write (`record_credential_test`) exists for discovery's
//! pin-back and is never called by normal runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use zeroize::Zeroize;
use zeroize::ZeroizeOnDrop;

use crate::core::device::CredentialTest;
use crate::core::device::DeviceRecord;
use crate::core::errors::DeviceError;
use crate::core::errors::StoreError;
use crate::core::identifiers::CaptureId;
use crate::core::identifiers::CredentialId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::JobSlug;
use crate::core::identifiers::RunId;
use crate::core::job::CaptureKind;
use crate::core::run::CaptureRecord;
use crate::core::run::CompletionEvent;
use crate::core::run::DeviceCounts;
use crate::core::run::RunRecord;
use crate::core::run::RunStatus;
use crate::core::template::TemplateRecord;
use crate::runtime::cancel::CancelToken;

// ============================================================================
// SECTION: Inventory Store
// ============================================================================

/// Read model over the inventory database.
pub trait InventoryStore: Send + Sync {
    /// Returns every device joined with its lookup rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying store fails.
    fn devices(&self) -> Result<Vec<DeviceRecord>, StoreError>;

    /// Records a credential probe result on a device (discovery pin-back).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the device row is missing or the write
    /// fails.
    fn record_credential_test(
        &self,
        device: DeviceId,
        test: &CredentialTest,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Template Store
// ============================================================================

/// Read model over the template database.
pub trait TemplateStore: Send + Sync {
    /// Returns templates whose identifier contains every required term.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the underlying store fails.
    fn candidates(&self, required_terms: &[String]) -> Result<Vec<TemplateRecord>, StoreError>;
}

// ============================================================================
// SECTION: History Store
// ============================================================================

/// New capture row committed after a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCapture {
    /// Owning run.
    pub run_id: RunId,
    /// Device name at capture time.
    pub device_name: String,
    /// Capture kind tag.
    pub kind: CaptureKind,
    /// Filesystem path of the committed file.
    pub path: PathBuf,
    /// Byte size of the committed file.
    pub size_bytes: u64,
    /// Wall-clock commit time.
    pub captured_at: OffsetDateTime,
    /// Validation score, when the pipeline ran.
    pub score: Option<u8>,
}

/// Lookup key for one run: store identifier or natural identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunKey {
    /// Numeric run identifier (a store artifact).
    Id(RunId),
    /// Natural identity: owning slug plus start time.
    Identity {
        /// Owning job slug.
        slug: JobSlug,
        /// Wall-clock start time.
        started_at: OffsetDateTime,
    },
}

/// Durable store of runs and captures.
///
/// The run's owning controller is the only writer during a run; workers
/// never touch this store directly.
pub trait HistoryStore: Send + Sync {
    /// Creates a run row with status `running` and the device-set size.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn begin_run(
        &self,
        job: &JobSlug,
        total: u64,
        started_at: OffsetDateTime,
    ) -> Result<RunId, StoreError>;

    /// Commits the run's final counts and status. Called exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the row is missing or the update fails.
    fn finish_run(
        &self,
        run: RunId,
        counts: &DeviceCounts,
        status: RunStatus,
        error: Option<&str>,
        completed_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Records a batch member that stop-on-failure prevented from starting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn record_cancelled_run(&self, job: &JobSlug, at: OffsetDateTime) -> Result<RunId, StoreError>;

    /// Inserts one capture metadata row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails or a capture already
    /// exists for the (device, run) pair.
    fn record_capture(&self, capture: &NewCapture) -> Result<CaptureId, StoreError>;

    /// Lists runs, newest first, optionally filtered by job slug.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn runs(&self, job: Option<&JobSlug>, limit: usize) -> Result<Vec<RunRecord>, StoreError>;

    /// Fetches one run by identifier or natural identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn run(&self, key: &RunKey) -> Result<Option<RunRecord>, StoreError>;

    /// Lists captures belonging to a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn captures(&self, run: RunId) -> Result<Vec<CaptureRecord>, StoreError>;
}

// ============================================================================
// SECTION: Credential Source
// ============================================================================

/// Decrypted credential handed to the transport for one session.
///
/// # Invariants
/// - Secret fields are zeroized on drop; holders must not clone them into
///   longer-lived structures.
/// - At least one of `password` / `private_key` is present.
/// - `Debug` output redacts all secret fields.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ResolvedCredential {
    /// Credential identifier.
    #[zeroize(skip)]
    pub id: CredentialId,
    /// Operator-facing short name.
    #[zeroize(skip)]
    pub name: String,
    /// Login username.
    #[zeroize(skip)]
    pub username: String,
    /// Decrypted password.
    pub password: Option<String>,
    /// Decrypted private key (PEM).
    pub private_key: Option<String>,
    /// Decrypted key passphrase.
    pub key_passphrase: Option<String>,
}

impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("key_passphrase", &self.key_passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Errors raised by the credential source.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// Vault is locked; no decrypted material is available.
    #[error("secret store is locked")]
    Locked,
    /// Underlying secret store failed.
    #[error("secret store error: {0}")]
    Store(String),
}

/// Source of decrypted credentials (the unlocked vault).
pub trait CredentialSource: Send + Sync {
    /// Returns one credential by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Locked`] when the vault is locked.
    fn credential(&self, id: CredentialId) -> Result<Option<ResolvedCredential>, CredentialError>;

    /// Returns the store default credential, if one is flagged.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Locked`] when the vault is locked.
    fn default_credential(&self) -> Result<Option<ResolvedCredential>, CredentialError>;

    /// Returns every stored credential (discovery candidates).
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Locked`] when the vault is locked.
    fn all_credentials(&self) -> Result<Vec<ResolvedCredential>, CredentialError>;
}

// ============================================================================
// SECTION: Device Transport
// ============================================================================

/// Connection coordinates for one device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectSpec {
    /// Hostname or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Driver hint selecting prompt/paging conventions.
    pub driver_hint: String,
}

impl ConnectSpec {
    /// Builds a spec for a device on the standard SSH port.
    #[must_use]
    pub fn for_device(device: &DeviceRecord) -> Self {
        Self {
            host: device.primary_address.clone(),
            port: 22,
            driver_hint: device.driver_hint.clone(),
        }
    }
}

/// Command sequence executed inside one session.
///
/// # Invariants
/// - `commands` is non-empty.
/// - `deadline` bounds the whole sequence (connect included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    /// Optional paging-disable prelude sent before the commands.
    pub paging_prelude: Option<String>,
    /// Ordered commands.
    pub commands: Vec<String>,
    /// Optional pause between consecutive commands.
    pub inter_command_pause: Option<Duration>,
    /// Per-device wall-clock deadline.
    pub deadline: Duration,
}

/// Raw result of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    /// Prompt-stripped output with command separators.
    pub output: String,
    /// Non-fatal warnings (paging prelude errors and similar).
    pub warnings: Vec<String>,
}

/// Opens device sessions and runs command sequences.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Connect-only probe: authenticate and reach a prompt, run nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] classifying the failure (auth vs transport
    /// vs timeout), which discovery uses to decide whether to continue.
    async fn probe(
        &self,
        spec: &ConnectSpec,
        credential: &ResolvedCredential,
        timeout: Duration,
    ) -> Result<(), DeviceError>;

    /// Runs the full command plan in one authenticated session.
    ///
    /// Implementations must observe `cancel` at every read boundary: once
    /// it fires, the session is closed (soft cancel) and the call returns
    /// an error instead of finishing the sequence.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] when the session fails or is soft-closed by
    /// cancellation; partial output is discarded with it.
    async fn run_commands(
        &self,
        spec: &ConnectSpec,
        credential: &ResolvedCredential,
        plan: &CommandPlan,
        cancel: &CancelToken,
    ) -> Result<Transcript, DeviceError>;
}

// ============================================================================
// SECTION: Progress Sink
// ============================================================================

/// Receives completion events without blocking the pool.
///
/// Implementations must return promptly; the controller, not the workers,
/// performs delivery.
pub trait ProgressSink: Send + Sync {
    /// Publishes one completion event.
    fn publish(&self, event: &CompletionEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn publish(&self, _event: &CompletionEvent) {}
}
