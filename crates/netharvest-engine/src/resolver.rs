// crates/netharvest-engine/src/resolver.rs
// ============================================================================
// Module: Netharvest Device Resolver
// Description: Expands job filters into ordered, deduplicated device sets.
// Purpose: Give each run a deterministic device list before any contact.
// Dependencies: netharvest-core
// ============================================================================

//! ## Overview
//! Resolution is a pure pass over the inventory read model: compile the
//! filter (failing the job on a malformed regex), keep matching devices,
//! order by (site, name), deduplicate, and apply the optional cap. An empty
//! result is a job-level failure; the run never contacts a device.

// ============================================================================
// SECTION: Imports
// ============================================================================

use netharvest_core::DeviceFilter;
use netharvest_core::DeviceRecord;
use netharvest_core::InventoryStore;
use netharvest_core::JobError;
use netharvest_core::JobSlug;
use netharvest_core::order_devices;
use tracing::debug;

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the concrete device set for one job.
///
/// # Errors
///
/// Returns [`JobError::Config`] for a malformed filter,
/// [`JobError::InventoryEmpty`] when no device matches, and
/// [`JobError::Store`] when the inventory read fails.
pub fn resolve_devices(
    inventory: &dyn InventoryStore,
    slug: &JobSlug,
    filter: &DeviceFilter,
) -> Result<Vec<DeviceRecord>, JobError> {
    let compiled = filter.compile()?;
    let mut devices: Vec<DeviceRecord> =
        inventory.devices()?.into_iter().filter(|d| compiled.matches(d)).collect();
    order_devices(&mut devices);
    if let Some(limit) = compiled.limit() {
        devices.truncate(limit);
    }
    if devices.is_empty() {
        return Err(JobError::InventoryEmpty(slug.clone()));
    }
    debug!(job = %slug, devices = devices.len(), "resolved device set");
    Ok(devices)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use netharvest_core::CredentialTest;
    use netharvest_core::DeviceId;
    use netharvest_core::DeviceStatus;
    use netharvest_core::PlatformId;
    use netharvest_core::RoleId;
    use netharvest_core::SiteId;
    use netharvest_core::StoreError;

    use super::*;

    struct FakeInventory {
        devices: Mutex<Vec<DeviceRecord>>,
    }

    impl InventoryStore for FakeInventory {
        fn devices(&self) -> Result<Vec<DeviceRecord>, StoreError> {
            Ok(self.devices.lock().map(|d| d.clone()).unwrap_or_default())
        }

        fn record_credential_test(
            &self,
            _device: DeviceId,
            _test: &CredentialTest,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn device(id: u64, site: &str, name: &str, vendor: &str) -> DeviceRecord {
        DeviceRecord {
            id: DeviceId::from_raw(id).expect("id"),
            name: name.to_string(),
            primary_address: "192.0.2.1".to_string(),
            site_id: SiteId::from_raw(1).expect("id"),
            site_name: site.to_string(),
            platform_id: PlatformId::from_raw(1).expect("id"),
            platform_name: "p".to_string(),
            manufacturer: vendor.to_string(),
            driver_hint: "cisco-ios".to_string(),
            paging_disable: None,
            role_id: RoleId::from_raw(1).expect("id"),
            role_name: "access".to_string(),
            status: DeviceStatus::Active,
            pinned_credential_id: None,
            last_credential_test: None,
        }
    }

    fn inventory(devices: Vec<DeviceRecord>) -> FakeInventory {
        FakeInventory {
            devices: Mutex::new(devices),
        }
    }

    fn slug() -> JobSlug {
        JobSlug::parse("resolver-test").expect("slug")
    }

    #[test]
    fn resolution_is_deterministic_across_input_orders() {
        let forward = inventory(vec![
            device(1, "osl", "edge-01", "Cisco Systems"),
            device(2, "osl", "core-01", "Cisco Systems"),
            device(3, "trd", "edge-02", "Cisco Systems"),
        ]);
        let reversed = inventory(vec![
            device(3, "trd", "edge-02", "Cisco Systems"),
            device(2, "osl", "core-01", "Cisco Systems"),
            device(1, "osl", "edge-01", "Cisco Systems"),
        ]);
        let filter = DeviceFilter::default();
        let a = resolve_devices(&forward, &slug(), &filter).expect("resolve");
        let b = resolve_devices(&reversed, &slug(), &filter).expect("resolve");
        assert_eq!(a, b);
        let names: Vec<_> = a.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["core-01", "edge-01", "edge-02"]);
    }

    #[test]
    fn every_returned_device_satisfies_the_filter() {
        let store = inventory(vec![
            device(1, "osl", "edge-01", "Cisco Systems"),
            device(2, "osl", "fw-01", "Juniper Networks"),
        ]);
        let filter = DeviceFilter {
            vendor: Some("cisco".to_string()),
            ..DeviceFilter::default()
        };
        let devices = resolve_devices(&store, &slug(), &filter).expect("resolve");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "edge-01");
    }

    #[test]
    fn empty_match_is_job_fatal() {
        let store = inventory(vec![device(1, "osl", "edge-01", "Cisco Systems")]);
        let filter = DeviceFilter {
            vendor: Some("nokia".to_string()),
            ..DeviceFilter::default()
        };
        assert!(matches!(
            resolve_devices(&store, &slug(), &filter),
            Err(JobError::InventoryEmpty(_))
        ));
    }

    #[test]
    fn malformed_regex_is_config_fatal() {
        let store = inventory(vec![device(1, "osl", "edge-01", "Cisco Systems")]);
        let filter = DeviceFilter {
            name_regex: Some("(".to_string()),
            ..DeviceFilter::default()
        };
        assert!(matches!(
            resolve_devices(&store, &slug(), &filter),
            Err(JobError::Config(_))
        ));
    }

    #[test]
    fn cap_truncates_after_ordering() {
        let store = inventory(vec![
            device(1, "osl", "zeta", "Cisco Systems"),
            device(2, "osl", "alpha", "Cisco Systems"),
        ]);
        let filter = DeviceFilter {
            limit: Some(1),
            ..DeviceFilter::default()
        };
        let devices = resolve_devices(&store, &slug(), &filter).expect("resolve");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "alpha");
    }
}
