// crates/netharvest-core/src/core/time.rs
// ============================================================================
// Module: Netharvest Timestamps
// Description: Wall-clock capture and stable textual timestamp forms.
// Purpose: Keep all timestamp formatting decisions in one place.
// Dependencies: time, serde
// ============================================================================

//! ## Overview
//! History rows and capture filenames both embed timestamps. History rows use
//! RFC 3339 so they sort and parse unambiguously; filenames use a compact
//! UTC form (`YYYYMMDD-HHMMSS`) that stays portable across filesystems.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Formats
// ============================================================================

/// Compact UTC timestamp format used in capture filenames.
const COMPACT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]-[hour][minute][second]");

// ============================================================================
// SECTION: Functions
// ============================================================================

/// Returns the current UTC wall-clock time.
#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Returns the current unix time in whole milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let now = OffsetDateTime::now_utc();
    now.unix_timestamp() * 1_000 + i64::from(now.millisecond())
}

/// Formats a timestamp as RFC 3339 for history rows.
///
/// Falls back to the unix-second form if formatting fails, which can only
/// happen for out-of-range dates.
#[must_use]
pub fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Parses an RFC 3339 timestamp from a history row.
///
/// # Errors
///
/// Returns [`time::error::Parse`] when the input is not RFC 3339.
pub fn parse_rfc3339(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(raw, &Rfc3339)
}

/// Formats a timestamp in the compact UTC filename form.
#[must_use]
pub fn format_compact(at: OffsetDateTime) -> String {
    at.format(&COMPACT).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
