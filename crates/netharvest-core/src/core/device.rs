// crates/netharvest-core/src/core/device.rs
// ============================================================================
// Module: Netharvest Device Model
// Description: Read-model device records joined across inventory lookup tables.
// Purpose: Give the resolver and execution pool one flat, owned device shape.
// Dependencies: serde, crate::core::identifiers, crate::core::time
// ============================================================================

//! ## Overview
//! The inventory store exposes devices joined with their site, platform,
//! manufacturer, and role rows. The core never mutates inventory during a
//! run; the single exception is the credential-test write-back performed by
//! discovery, whose payload ([`CredentialTest`]) is defined here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::CredentialId;
use crate::core::identifiers::DeviceId;
use crate::core::identifiers::PlatformId;
use crate::core::identifiers::RoleId;
use crate::core::identifiers::SiteId;

// ============================================================================
// SECTION: Device Status
// ============================================================================

/// Operational status of an inventory device.
///
/// # Invariants
/// - Variants are stable for serialization and filter matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Device is in service and eligible for collection.
    #[default]
    Active,
    /// Device is provisioned but not yet in service.
    Staged,
    /// Device is administratively out of service.
    Decommissioned,
}

impl DeviceStatus {
    /// Returns the stable textual form used in store rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Staged => "staged",
            Self::Decommissioned => "decommissioned",
        }
    }

    /// Parses the stable textual form used in store rows.
    #[must_use]
    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "staged" => Some(Self::Staged),
            "decommissioned" => Some(Self::Decommissioned),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Credential Test Result
// ============================================================================

/// Outcome of the most recent credential probe against a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialTestResult {
    /// Probe authenticated and reached a prompt.
    Success,
    /// Every candidate was rejected by the device.
    Untested,
    /// Probe could not reach the device at all.
    Unreachable,
}

impl CredentialTestResult {
    /// Returns the stable textual form used in store rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Untested => "untested",
            Self::Unreachable => "unreachable",
        }
    }

    /// Parses the stable textual form used in store rows.
    #[must_use]
    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(Self::Success),
            "untested" => Some(Self::Untested),
            "unreachable" => Some(Self::Unreachable),
            _ => None,
        }
    }
}

/// Credential probe record attached to a device row.
///
/// # Invariants
/// - `credential_id` is present only when `result` is `Success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialTest {
    /// Credential that produced the result, when one authenticated.
    pub credential_id: Option<CredentialId>,
    /// Probe outcome.
    pub result: CredentialTestResult,
    /// Wall-clock time the probe completed.
    #[serde(with = "time::serde::rfc3339")]
    pub tested_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Device Record
// ============================================================================

/// Flat device record joined across the inventory lookup tables.
///
/// # Invariants
/// - `name` is unique within `site_name`.
/// - `primary_address` may be empty; such devices are never eligible for
///   collection and the resolver drops them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identifier.
    pub id: DeviceId,
    /// Device name.
    pub name: String,
    /// Primary management address (hostname or IP literal).
    pub primary_address: String,
    /// Site identifier.
    pub site_id: SiteId,
    /// Site name.
    pub site_name: String,
    /// Platform identifier.
    pub platform_id: PlatformId,
    /// Platform name.
    pub platform_name: String,
    /// Manufacturer name linked through the platform.
    pub manufacturer: String,
    /// Driver hint telling the SSH layer which prompt/paging conventions apply.
    pub driver_hint: String,
    /// Platform-level paging-disable command, if the platform pages output.
    pub paging_disable: Option<String>,
    /// Role identifier.
    pub role_id: RoleId,
    /// Role name.
    pub role_name: String,
    /// Operational status.
    pub status: DeviceStatus,
    /// Credential pinned to this device, if any.
    pub pinned_credential_id: Option<CredentialId>,
    /// Most recent credential probe record, if any.
    pub last_credential_test: Option<CredentialTest>,
}

impl DeviceRecord {
    /// Returns whether the device can be contacted at all.
    #[must_use]
    pub fn is_reachable_candidate(&self) -> bool {
        !self.primary_address.trim().is_empty()
    }

    /// Returns the pinned credential only when the last probe succeeded.
    #[must_use]
    pub fn trusted_pin(&self) -> Option<CredentialId> {
        let pinned = self.pinned_credential_id?;
        match &self.last_credential_test {
            Some(test) if test.result == CredentialTestResult::Success => Some(pinned),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
