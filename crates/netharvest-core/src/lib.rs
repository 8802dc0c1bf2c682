// crates/netharvest-core/src/lib.rs
// ============================================================================
// Module: Netharvest Core
// Description: Data model, trait seams, and pure logic for the collector.
// Purpose: Keep every I/O-free contract in one dependency-light crate.
// Dependencies: async-trait, regex, serde, sha2, thiserror, time, zeroize
// ============================================================================

//! ## Overview
//! `netharvest-core` holds the collector's shared vocabulary: identifiers,
//! the device/job/run data model, the error taxonomy with its propagation
//! tiers, the template engine and match scoring, capture naming, and the
//! trait seams (stores, vault, transport, progress) that the engine and the
//! backing crates meet at. Nothing in this crate performs I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::device::CredentialTest;
pub use crate::core::device::CredentialTestResult;
pub use crate::core::device::DeviceRecord;
pub use crate::core::device::DeviceStatus;
pub use crate::core::errors::DeviceError;
pub use crate::core::errors::JobError;
pub use crate::core::errors::StoreError;
pub use crate::core::filter::CompiledFilter;
pub use crate::core::filter::DeviceFilter;
pub use crate::core::filter::FilterError;
pub use crate::core::filter::order_devices;
pub use crate::core::identifiers::CaptureId;
pub use crate::core::identifiers::CredentialId;
pub use crate::core::identifiers::DeviceId;
pub use crate::core::identifiers::JobId;
pub use crate::core::identifiers::JobSlug;
pub use crate::core::identifiers::PlatformId;
pub use crate::core::identifiers::RoleId;
pub use crate::core::identifiers::RunId;
pub use crate::core::identifiers::SiteId;
pub use crate::core::identifiers::SlugError;
pub use crate::core::job::CaptureKind;
pub use crate::core::job::DEFAULT_DEVICE_TIMEOUT;
pub use crate::core::job::DEFAULT_MAX_WORKERS;
pub use crate::core::job::ExecutionPolicy;
pub use crate::core::job::JobSpec;
pub use crate::core::job::JobSpecError;
pub use crate::core::job::MAX_WORKER_CEILING;
pub use crate::core::job::OutputPolicy;
pub use crate::core::job::ValidationPolicy;
pub use crate::core::naming::capture_path;
pub use crate::core::naming::expand_filename;
pub use crate::core::run::BatchReport;
pub use crate::core::run::CaptureRecord;
pub use crate::core::run::CompletionEvent;
pub use crate::core::run::DeviceCounts;
pub use crate::core::run::DeviceDisposition;
pub use crate::core::run::DeviceFailure;
pub use crate::core::run::DeviceOutcome;
pub use crate::core::run::FailureKind;
pub use crate::core::run::JobReport;
pub use crate::core::run::RunRecord;
pub use crate::core::run::RunStatus;
pub use crate::core::run::SkipReason;
pub use crate::core::run::ValidationSummary;
pub use crate::core::score::MatchOutcome;
pub use crate::core::score::MatchStatus;
pub use crate::core::score::score_records;
pub use crate::core::template::CompiledTemplate;
pub use crate::core::template::FieldValue;
pub use crate::core::template::Record;
pub use crate::core::template::TemplateError;
pub use crate::core::template::TemplateRecord;
pub use crate::interfaces::CommandPlan;
pub use crate::interfaces::ConnectSpec;
pub use crate::interfaces::CredentialError;
pub use crate::interfaces::CredentialSource;
pub use crate::interfaces::DeviceConnector;
pub use crate::interfaces::HistoryStore;
pub use crate::interfaces::InventoryStore;
pub use crate::interfaces::NewCapture;
pub use crate::interfaces::NullProgress;
pub use crate::interfaces::ProgressSink;
pub use crate::interfaces::ResolvedCredential;
pub use crate::interfaces::RunKey;
pub use crate::interfaces::TemplateStore;
pub use crate::interfaces::Transcript;
pub use crate::runtime::cancel::CancelToken;
