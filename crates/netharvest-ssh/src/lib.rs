// crates/netharvest-ssh/src/lib.rs
// ============================================================================
// Module: Netharvest SSH
// Description: SSH transport implementation for the collector.
// Purpose: Provide the concrete device connector over libssh2.
// Dependencies: async-trait, netharvest-core, regex, ssh2, tokio, tracing
// ============================================================================

//! ## Overview
//! `netharvest-ssh` implements the [`netharvest_core::DeviceConnector`] seam
//! with libssh2: platform driver profiles decide prompt and paging
//! conventions, and the session layer runs prompt-bounded command sequences
//! under a per-device wall-clock deadline.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod drivers;
pub mod session;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::drivers::DriverProfile;
pub use crate::drivers::at_prompt;
pub use crate::drivers::profile_for;
pub use crate::session::Ssh2Connector;
