// crates/netharvest-core/src/core/filter.rs
// ============================================================================
// Module: Netharvest Device Filter
// Description: Declarative device filters and their compiled matchers.
// Purpose: Translate job filters into deterministic device-set selection.
// Dependencies: regex, serde, crate::core::{device, identifiers}
// ============================================================================

//! ## Overview
//! A [`DeviceFilter`] is the declarative half of device resolution: vendor
//! substring, exact site/role/platform references, a name regex, and a status
//! gate. Compilation happens once per run so a malformed regex fails the job
//! before any device is contacted. Matching itself is pure and deterministic,
//! which keeps the resolver's ordering law testable without a database.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::device::DeviceRecord;
use crate::core::device::DeviceStatus;
use crate::core::identifiers::PlatformId;
use crate::core::identifiers::RoleId;
use crate::core::identifiers::SiteId;

// ============================================================================
// SECTION: Filter
// ============================================================================

/// Declarative device filter carried by a job.
///
/// # Invariants
/// - An entirely empty filter matches every active device with an address.
/// - `status` defaults to [`DeviceStatus::Active`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    /// Case-insensitive substring matched against the manufacturer name.
    #[serde(default)]
    pub vendor: Option<String>,
    /// Exact site reference.
    #[serde(default)]
    pub site: Option<SiteId>,
    /// Exact role reference.
    #[serde(default)]
    pub role: Option<RoleId>,
    /// Exact platform reference.
    #[serde(default)]
    pub platform: Option<PlatformId>,
    /// Device-name regular expression. Anchors are honored when present;
    /// otherwise the pattern is an unanchored search.
    #[serde(default)]
    pub name_regex: Option<String>,
    /// Status a device must hold to be eligible.
    #[serde(default)]
    pub status: DeviceStatus,
    /// Optional global cap on the resolved device count.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl DeviceFilter {
    /// Compiles the filter, validating the name regex.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::BadRegex`] when `name_regex` does not compile.
    pub fn compile(&self) -> Result<CompiledFilter, FilterError> {
        let name_regex = match &self.name_regex {
            Some(pattern) => Some(
                Regex::new(pattern)
                    .map_err(|err| FilterError::BadRegex(pattern.clone(), err.to_string()))?,
            ),
            None => None,
        };
        Ok(CompiledFilter {
            vendor_lower: self.vendor.as_ref().map(|v| v.to_lowercase()),
            site: self.site,
            role: self.role,
            platform: self.platform,
            name_regex,
            status: self.status,
            limit: self.limit,
        })
    }
}

/// Errors raised while compiling a [`DeviceFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Name regex failed to compile.
    #[error("invalid device name regex {0:?}: {1}")]
    BadRegex(String, String),
}

// ============================================================================
// SECTION: Compiled Filter
// ============================================================================

/// Compiled, run-scoped form of a [`DeviceFilter`].
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    /// Lowercased vendor substring.
    vendor_lower: Option<String>,
    /// Exact site reference.
    site: Option<SiteId>,
    /// Exact role reference.
    role: Option<RoleId>,
    /// Exact platform reference.
    platform: Option<PlatformId>,
    /// Compiled name matcher.
    name_regex: Option<Regex>,
    /// Required device status.
    status: DeviceStatus,
    /// Optional cap on the resolved device count.
    limit: Option<usize>,
}

impl CompiledFilter {
    /// Returns whether a device satisfies every filter field.
    ///
    /// Eligibility also requires a non-empty primary address regardless of
    /// the declarative fields.
    #[must_use]
    pub fn matches(&self, device: &DeviceRecord) -> bool {
        if !device.is_reachable_candidate() {
            return false;
        }
        if device.status != self.status {
            return false;
        }
        if let Some(vendor) = &self.vendor_lower
            && !device.manufacturer.to_lowercase().contains(vendor)
        {
            return false;
        }
        if let Some(site) = self.site
            && device.site_id != site
        {
            return false;
        }
        if let Some(role) = self.role
            && device.role_id != role
        {
            return false;
        }
        if let Some(platform) = self.platform
            && device.platform_id != platform
        {
            return false;
        }
        if let Some(regex) = &self.name_regex
            && !regex.is_match(&device.name)
        {
            return false;
        }
        true
    }

    /// Returns the optional device-count cap.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// Sorts and deduplicates resolved devices by (site, name), then id.
///
/// Ordering is deterministic so progress numbering and retries observe
/// stable identity across runs with identical inventory.
pub fn order_devices(devices: &mut Vec<DeviceRecord>) {
    devices.sort_by(|a, b| {
        a.site_name
            .cmp(&b.site_name)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    devices.dedup_by_key(|d| d.id);
}

// ============================================================================
// SECTION: Tests
// ============================================================================
