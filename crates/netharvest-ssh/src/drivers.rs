// crates/netharvest-ssh/src/drivers.rs
// ============================================================================
// Module: Netharvest Driver Profiles
// Description: Prompt and paging conventions keyed by platform driver hint.
// Purpose: Tell the session layer when a device is ready for the next command.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! A driver profile bundles the prompt pattern and default paging-disable
//! command for one family of network operating systems. Profiles resolve by
//! driver hint; an unknown hint falls back to the generic profile, whose
//! prompt pattern covers the common `>`/`#`/`$` endings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;

// ============================================================================
// SECTION: Profile
// ============================================================================

/// Prompt/paging conventions for one driver family.
#[derive(Debug, Clone)]
pub struct DriverProfile {
    /// Driver hint this profile serves.
    pub hint: &'static str,
    /// Prompt pattern matched against the tail line of the buffer.
    pub prompt: Regex,
    /// Default paging-disable command for the family.
    pub paging_disable: Option<&'static str>,
}

/// Builds a profile; the patterns below are static and must compile.
fn profile(hint: &'static str, prompt: &str, paging_disable: Option<&'static str>) -> DriverProfile {
    DriverProfile {
        hint,
        // Static pattern table; compilation cannot fail at run time.
        prompt: Regex::new(prompt).unwrap_or_else(|_| Regex::new(r"[#>$]\s*$").expect("fallback")),
        paging_disable,
    }
}

/// Resolves the profile for a driver hint.
///
/// Unknown hints resolve to the generic profile.
#[must_use]
pub fn profile_for(hint: &str) -> DriverProfile {
    match hint {
        "cisco-ios" | "cisco-xe" => {
            profile("cisco-ios", r"[\w.\-:/@()]+[#>]\s*$", Some("terminal length 0"))
        }
        "cisco-nxos" => profile("cisco-nxos", r"[\w.\-:/@()]+#\s*$", Some("terminal length 0")),
        "arista-eos" => {
            profile("arista-eos", r"[\w.\-:/@()]+[#>]\s*$", Some("terminal length 0"))
        }
        "juniper-junos" => {
            profile("juniper-junos", r"[\w.\-:/@()]+[%>]\s*$", Some("set cli screen-length 0"))
        }
        _ => profile("generic", r"[#>$%]\s*$", None),
    }
}

/// Returns whether the tail of a buffer ends at a prompt.
#[must_use]
pub fn at_prompt(profile: &DriverProfile, buffer: &str) -> bool {
    let tail = buffer.rsplit('\n').next().unwrap_or(buffer);
    profile.prompt.is_match(tail.trim_end_matches('\r'))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ios_prompt_matches_exec_and_enable() {
        let profile = profile_for("cisco-ios");
        assert!(at_prompt(&profile, "output\r\nedge-sw-01>"));
        assert!(at_prompt(&profile, "output\r\nedge-sw-01#"));
        assert!(at_prompt(&profile, "output\r\nedge-sw-01# "));
        assert!(!at_prompt(&profile, "Building configuration..."));
    }

    #[test]
    fn junos_prompt_matches_operational_mode() {
        let profile = profile_for("juniper-junos");
        assert!(at_prompt(&profile, "netops@edge-fw-01>"));
        assert!(at_prompt(&profile, "netops@edge-fw-01%"));
    }

    #[test]
    fn unknown_hint_falls_back_to_generic() {
        let profile = profile_for("frobnitz-os");
        assert_eq!(profile.hint, "generic");
        assert!(at_prompt(&profile, "something$ "));
        assert!(profile.paging_disable.is_none());
    }

    #[test]
    fn mid_output_lines_are_not_prompts() {
        let profile = profile_for("cisco-ios");
        assert!(!at_prompt(&profile, "Internet  10.0.0.1   5   0012.7f57.ac01  ARPA  Vlan10"));
    }
}
