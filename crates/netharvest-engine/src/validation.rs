// crates/netharvest-engine/src/validation.rs
// ============================================================================
// Module: Netharvest Validation Pipeline
// Description: Template selection and best-score matching over transcripts.
// Purpose: Decide per device whether raw output is structurally acceptable.
// Dependencies: netharvest-core
// ============================================================================

//! ## Overview
//! The job's filter string splits on underscores into required terms; every
//! stored template containing all terms is a candidate. Each candidate runs
//! against the transcript and the best score wins. A template body that
//! fails to compile is skipped rather than failing the device: one broken
//! row in the template store must not poison every run that touches it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use netharvest_core::CompiledTemplate;
use netharvest_core::MatchOutcome;
use netharvest_core::MatchStatus;
use netharvest_core::StoreError;
use netharvest_core::TemplateStore;
use netharvest_core::score_records;
use tracing::debug;
use tracing::warn;

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Splits a template filter into its required terms.
#[must_use]
pub fn filter_terms(filter: &str) -> Vec<String> {
    filter.split('_').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// Runs the validation pipeline for one transcript.
///
/// # Errors
///
/// Returns [`StoreError`] only when the template store itself fails; match
/// quality is reported through the outcome, never as an error.
pub fn validate_output(
    templates: &dyn TemplateStore,
    template_filter: &str,
    min_score: u8,
    transcript: &str,
) -> Result<MatchOutcome, StoreError> {
    let terms = filter_terms(template_filter);
    let candidates = templates.candidates(&terms)?;
    if candidates.is_empty() {
        return Ok(MatchOutcome::no_template());
    }

    let mut best: Option<MatchOutcome> = None;
    for candidate in candidates {
        let compiled = match CompiledTemplate::compile(&candidate.body) {
            Ok(compiled) => compiled,
            Err(err) => {
                warn!(template = %candidate.identifier, error = %err, "skipping malformed template");
                continue;
            }
        };
        let records = compiled.run(transcript);
        let score = score_records(&candidate.identifier, &records);
        debug!(template = %candidate.identifier, score, records = records.len(), "scored candidate");
        let replace = best.as_ref().is_none_or(|current| score > current.score);
        if replace {
            best = Some(MatchOutcome {
                template: Some(candidate.identifier),
                records: Some(records),
                score,
                status: MatchStatus::Passed,
            });
        }
    }

    let Some(mut outcome) = best else {
        // Every candidate body was malformed.
        return Ok(MatchOutcome::no_template());
    };
    if outcome.score < min_score {
        outcome.status = MatchStatus::Failed;
    }
    Ok(outcome)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
