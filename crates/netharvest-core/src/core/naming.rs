// crates/netharvest-core/src/core/naming.rs
// ============================================================================
// Module: Netharvest Capture Naming
// Description: Capture filename templates and path assembly.
// Purpose: Expand operator-supplied filename patterns deterministically.
// Dependencies: crate::core::{device, identifiers, time}
// ============================================================================

//! ## Overview
//! Capture filenames come from an operator-editable pattern with a small set
//! of recognized variables: `{device_name}`, `{device_id}`, `{timestamp}`.
//! Unrecognized variables fall through literally so a typo is visible in the
//! produced filename rather than silently erased. Expanded components are
//! sanitized: path separators in device names become underscores so no
//! pattern can escape the job's capture directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::core::device::DeviceRecord;
use crate::core::time::format_compact;

// ============================================================================
// SECTION: Expansion
// ============================================================================

/// Replaces path-hostile characters in one expanded component.
fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect()
}

/// Expands a filename pattern for one device.
///
/// Recognized variables: `{device_name}`, `{device_id}`, `{timestamp}`.
/// Unknown variables are left in place literally.
#[must_use]
pub fn expand_filename(pattern: &str, device: &DeviceRecord, at: OffsetDateTime) -> String {
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[.. start]);
        let tail = &rest[start ..];
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            rest = "";
            break;
        };
        let variable = &tail[1 .. end];
        match variable {
            "device_name" => out.push_str(&sanitize_component(&device.name)),
            "device_id" => out.push_str(&device.id.to_string()),
            "timestamp" => out.push_str(&format_compact(at)),
            _ => out.push_str(&tail[..= end]),
        }
        rest = &tail[end + 1 ..];
    }
    out.push_str(rest);
    sanitize_component(&out)
}

/// Assembles the full capture path for one device.
///
/// The job subdirectory is sanitized the same way as filenames; nested
/// subdirectories are not supported by the layout.
#[must_use]
pub fn capture_path(
    root: &Path,
    subdir: &str,
    pattern: &str,
    device: &DeviceRecord,
    at: OffsetDateTime,
) -> PathBuf {
    let mut path = root.to_path_buf();
    let subdir = sanitize_component(subdir.trim());
    if !subdir.is_empty() {
        path.push(subdir);
    }
    path.push(expand_filename(pattern, device, at));
    path
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::core::device::DeviceStatus;
    use crate::core::identifiers::DeviceId;
    use crate::core::identifiers::PlatformId;
    use crate::core::identifiers::RoleId;
    use crate::core::identifiers::SiteId;

    fn device(name: &str) -> DeviceRecord {
        DeviceRecord {
            id: DeviceId::from_raw(42).expect("id"),
            name: name.to_string(),
            primary_address: "192.0.2.1".to_string(),
            site_id: SiteId::from_raw(1).expect("id"),
            site_name: "osl".to_string(),
            platform_id: PlatformId::from_raw(1).expect("id"),
            platform_name: "catalyst-9300".to_string(),
            manufacturer: "Cisco Systems".to_string(),
            driver_hint: "cisco-ios".to_string(),
            paging_disable: None,
            role_id: RoleId::from_raw(1).expect("id"),
            role_name: "access".to_string(),
            status: DeviceStatus::Active,
            pinned_credential_id: None,
            last_credential_test: None,
        }
    }

    #[test]
    fn known_variables_expand() {
        let at = datetime!(2026-03-09 07:05:02 UTC);
        let name = expand_filename("{device_name}-{device_id}-{timestamp}.txt", &device("sw1"), at);
        assert_eq!(name, "sw1-42-20260309-070502.txt");
    }

    #[test]
    fn unknown_variables_fall_through_literally() {
        let at = datetime!(2026-03-09 07:05:02 UTC);
        let name = expand_filename("{device_name}-{serial}.txt", &device("sw1"), at);
        assert_eq!(name, "sw1-{serial}.txt");
    }

    #[test]
    fn separators_in_names_are_neutralized() {
        let at = datetime!(2026-03-09 07:05:02 UTC);
        let name = expand_filename("{device_name}.txt", &device("../etc/passwd"), at);
        assert!(!name.contains('/'));
        assert_eq!(name, ".._etc_passwd.txt");
    }

    #[test]
    fn capture_path_joins_root_subdir_and_name() {
        let at = datetime!(2026-03-09 07:05:02 UTC);
        let path = capture_path(Path::new("/data"), "arp", "{device_id}.txt", &device("sw1"), at);
        assert_eq!(path, PathBuf::from("/data/arp/42.txt"));
    }
}
