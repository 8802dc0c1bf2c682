// crates/netharvest-engine/src/credentials.rs
// ============================================================================
// Module: Netharvest Credential Resolution
// Description: Per-device credential selection over the unlocked vault.
// Purpose: Apply the pin -> override -> default chain for every session.
// Dependencies: netharvest-core
// ============================================================================

//! ## Overview
//! The resolution chain is fixed: a pinned credential whose last probe
//! succeeded wins, then the run-wide override, then the store default. A
//! device with nothing in the chain fails individually; the run continues.
//! A locked vault is a job-level failure surfaced before any device work.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use netharvest_core::CredentialError;
use netharvest_core::CredentialId;
use netharvest_core::CredentialSource;
use netharvest_core::DeviceError;
use netharvest_core::DeviceRecord;
use netharvest_core::ResolvedCredential;

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Run-scoped credential resolver.
#[derive(Clone)]
pub struct CredentialResolver {
    /// Unlocked credential source.
    source: Arc<dyn CredentialSource>,
    /// Run-wide override, when the caller supplied one.
    override_id: Option<CredentialId>,
}

impl CredentialResolver {
    /// Creates a resolver over the source with an optional run override.
    #[must_use]
    pub fn new(source: Arc<dyn CredentialSource>, override_id: Option<CredentialId>) -> Self {
        Self {
            source,
            override_id,
        }
    }

    /// Resolves the effective credential for one device.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NoCredential`] when the chain is exhausted,
    /// or [`DeviceError::Command`] when the vault fails mid-run.
    pub fn resolve(&self, device: &DeviceRecord) -> Result<ResolvedCredential, DeviceError> {
        if let Some(pinned) = device.trusted_pin()
            && let Some(credential) = self.lookup(pinned)?
        {
            return Ok(credential);
        }
        if let Some(override_id) = self.override_id
            && let Some(credential) = self.lookup(override_id)?
        {
            return Ok(credential);
        }
        if let Some(credential) =
            self.source.default_credential().map_err(map_source_error)?
        {
            return Ok(credential);
        }
        Err(DeviceError::NoCredential)
    }

    /// Looks up one credential by identifier.
    fn lookup(&self, id: CredentialId) -> Result<Option<ResolvedCredential>, DeviceError> {
        self.source.credential(id).map_err(map_source_error)
    }

    /// Verifies the vault is usable before any device work begins.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Locked`] when no session is live.
    pub fn check_unlocked(&self) -> Result<(), CredentialError> {
        // Any cache read proves a session exists.
        self.source.all_credentials().map(|_| ())
    }
}

/// Maps a source failure into a per-device error.
fn map_source_error(err: CredentialError) -> DeviceError {
    DeviceError::Command(format!("credential source: {err}"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use netharvest_core::CredentialTest;
    use netharvest_core::CredentialTestResult;
    use netharvest_core::DeviceId;
    use netharvest_core::DeviceStatus;
    use netharvest_core::PlatformId;
    use netharvest_core::RoleId;
    use netharvest_core::SiteId;
    use time::macros::datetime;

    use super::*;

    struct FakeSource {
        credentials: BTreeMap<u64, ResolvedCredential>,
        default_id: Option<u64>,
    }

    impl CredentialSource for FakeSource {
        fn credential(
            &self,
            id: CredentialId,
        ) -> Result<Option<ResolvedCredential>, CredentialError> {
            Ok(self.credentials.get(&id.get()).cloned())
        }

        fn default_credential(&self) -> Result<Option<ResolvedCredential>, CredentialError> {
            Ok(self.default_id.and_then(|id| self.credentials.get(&id).cloned()))
        }

        fn all_credentials(&self) -> Result<Vec<ResolvedCredential>, CredentialError> {
            Ok(self.credentials.values().cloned().collect())
        }
    }

    fn credential(id: u64, name: &str) -> ResolvedCredential {
        ResolvedCredential {
            id: CredentialId::from_raw(id).expect("id"),
            name: name.to_string(),
            username: "netops".to_string(),
            password: Some("pw".to_string()),
            private_key: None,
            key_passphrase: None,
        }
    }

    fn source(ids: &[(u64, &str)], default_id: Option<u64>) -> Arc<FakeSource> {
        Arc::new(FakeSource {
            credentials: ids.iter().map(|(id, name)| (*id, credential(*id, name))).collect(),
            default_id,
        })
    }

    fn device(pin: Option<u64>, pin_tested: bool) -> DeviceRecord {
        let pinned_credential_id = pin.map(|id| CredentialId::from_raw(id).expect("id"));
        DeviceRecord {
            id: DeviceId::from_raw(1).expect("id"),
            name: "edge-01".to_string(),
            primary_address: "192.0.2.1".to_string(),
            site_id: SiteId::from_raw(1).expect("id"),
            site_name: "osl".to_string(),
            platform_id: PlatformId::from_raw(1).expect("id"),
            platform_name: "p".to_string(),
            manufacturer: "Cisco Systems".to_string(),
            driver_hint: "cisco-ios".to_string(),
            paging_disable: None,
            role_id: RoleId::from_raw(1).expect("id"),
            role_name: "access".to_string(),
            status: DeviceStatus::Active,
            pinned_credential_id,
            last_credential_test: pin_tested.then(|| CredentialTest {
                credential_id: pinned_credential_id,
                result: CredentialTestResult::Success,
                tested_at: datetime!(2026-01-05 12:00:00 UTC),
            }),
        }
    }

    #[test]
    fn tested_pin_wins_over_default() {
        let resolver =
            CredentialResolver::new(source(&[(1, "legacy"), (2, "lab")], Some(2)), None);
        let resolved = resolver.resolve(&device(Some(1), true)).expect("resolve");
        assert_eq!(resolved.name, "legacy");
    }

    #[test]
    fn untested_pin_falls_through_to_default() {
        let resolver =
            CredentialResolver::new(source(&[(1, "legacy"), (2, "lab")], Some(2)), None);
        let resolved = resolver.resolve(&device(Some(1), false)).expect("resolve");
        assert_eq!(resolved.name, "lab");
    }

    #[test]
    fn override_beats_default_but_not_pin() {
        let src = source(&[(1, "legacy"), (2, "lab"), (3, "breakglass")], Some(2));
        let with_override = CredentialResolver::new(
            Arc::clone(&src) as Arc<dyn CredentialSource>,
            CredentialId::from_raw(3),
        );
        let no_pin = with_override.resolve(&device(None, false)).expect("resolve");
        assert_eq!(no_pin.name, "breakglass");
        let pinned = with_override.resolve(&device(Some(1), true)).expect("resolve");
        assert_eq!(pinned.name, "legacy");
    }

    #[test]
    fn exhausted_chain_fails_the_device() {
        let resolver = CredentialResolver::new(source(&[], None), None);
        assert!(matches!(
            resolver.resolve(&device(None, false)),
            Err(DeviceError::NoCredential)
        ));
    }
}
