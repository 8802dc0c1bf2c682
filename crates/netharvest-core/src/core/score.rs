// crates/netharvest-core/src/core/score.rs
// ============================================================================
// Module: Netharvest Match Scoring
// Description: Deterministic quality scoring for template match results.
// Purpose: Decide whether parsed output is structurally acceptable.
// Dependencies: serde, crate::core::template
// ============================================================================

//! ## Overview
//! A match score is the sum of four deterministic factors over the parse
//! result: record count (0-30), field richness (0-30), population rate
//! (0-25), and record consistency (0-15), clamped to [0, 100]. The factor
//! weights are a contract shared with stored history; they are not tuning
//! knobs. `show version`-style commands are special-cased: exactly one
//! record is the ideal shape and earns the full record-count factor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::template::Record;

// ============================================================================
// SECTION: Match Status
// ============================================================================

/// Outcome classification for one validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Best score met the job's minimum.
    Passed,
    /// A template matched but the best score fell below the minimum.
    Failed,
    /// No stored template satisfied the filter terms.
    NoTemplate,
}

/// Full result of running the validation pipeline for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Winning template identifier, when any candidate matched.
    pub template: Option<String>,
    /// Parsed records from the winning template, when any candidate matched.
    pub records: Option<Vec<Record>>,
    /// Best score across candidates (0 when no template matched).
    pub score: u8,
    /// Outcome classification.
    pub status: MatchStatus,
}

impl MatchOutcome {
    /// Returns the outcome for a filter that selected no templates.
    #[must_use]
    pub const fn no_template() -> Self {
        Self {
            template: None,
            records: None,
            score: 0,
            status: MatchStatus::NoTemplate,
        }
    }
}

// ============================================================================
// SECTION: Scoring
// ============================================================================

/// Scores a parse result for the given command identifier.
///
/// `identifier` is the template identifier (e.g. `cisco_ios_show_version`);
/// its text decides the single-record special case. Returns 0 for an empty
/// parse.
#[must_use]
pub fn score_records(identifier: &str, records: &[Record]) -> u8 {
    if records.is_empty() {
        return 0;
    }
    let field_count = records.first().map_or(0, BTreeMap::len);
    let record_factor = record_count_factor(identifier, records.len());
    let richness_factor = field_richness_factor(field_count);
    let population_factor = population_factor(records, field_count);
    let consistency_factor = consistency_factor(records);
    let total = record_factor + richness_factor + population_factor + consistency_factor;
    let clamped = total.clamp(0.0, 100.0);
    // Round half-up keeps boundary scores stable across platforms.
    let rounded = (clamped + 0.5).floor();
    if rounded >= 100.0 { 100 } else { rounded as u8 }
}

/// Record-count factor (0-30).
///
/// Version-style commands describe exactly one system; a single record is
/// the ideal shape. Everything else scales with diminishing returns.
fn record_count_factor(identifier: &str, count: usize) -> f64 {
    if identifier.contains("version") && count == 1 {
        return 30.0;
    }
    match count {
        0 => 0.0,
        1 | 2 => linear(count as f64, 1.0, 2.0, 10.0, 20.0),
        3 ..= 9 => linear(count as f64, 3.0, 9.0, 20.0, 30.0),
        _ => 30.0,
    }
}

/// Field-richness factor (0-30), linear within bands on field count.
fn field_richness_factor(fields: usize) -> f64 {
    match fields {
        0 => 0.0,
        1 | 2 => linear(fields as f64, 1.0, 2.0, 5.0, 10.0),
        3 ..= 5 => linear(fields as f64, 3.0, 5.0, 10.0, 20.0),
        6 ..= 9 => linear(fields as f64, 6.0, 9.0, 20.0, 30.0),
        _ => 30.0,
    }
}

/// Population factor (0-25): share of non-empty cells across the table.
fn population_factor(records: &[Record], field_count: usize) -> f64 {
    let cells = records.len() * field_count;
    if cells == 0 {
        return 0.0;
    }
    let populated: usize =
        records.iter().map(|r| r.values().filter(|v| !v.is_empty()).count()).sum();
    (populated as f64 / cells as f64) * 25.0
}

/// Consistency factor (0-15): share of records holding the dominant set of
/// populated fields.
fn consistency_factor(records: &[Record]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let mut shapes: BTreeMap<Vec<&str>, usize> = BTreeMap::new();
    for record in records {
        let shape: Vec<&str> = record
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, _)| name.as_str())
            .collect();
        *shapes.entry(shape).or_insert(0) += 1;
    }
    let dominant = shapes.values().copied().max().unwrap_or(0);
    (dominant as f64 / records.len() as f64) * 15.0
}

/// Linear interpolation of `x` from [x0, x1] onto [y0, y1].
fn linear(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if (x1 - x0).abs() < f64::EPSILON {
        return y1;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
