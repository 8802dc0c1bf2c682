// crates/netharvest-core/src/core/hashing.rs
// ============================================================================
// Module: Netharvest Hashing
// Description: Content hashing helpers for template deduplication.
// Purpose: Provide one stable hash form for template bodies.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! The template store deduplicates bodies by content hash. The hash form is
//! lowercase hex SHA-256 over the normalized body (trailing whitespace
//! stripped per line, `\n` line endings) so the same template imported from
//! different sources collapses to one row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Functions
// ============================================================================

/// Hashes raw bytes to lowercase hex SHA-256.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Computes the deduplication hash for a template body.
///
/// Normalizes line endings to `\n` and strips trailing whitespace per line
/// before hashing, so editor artifacts do not defeat deduplication.
#[must_use]
pub fn template_dedup_hash(body: &str) -> String {
    let mut normalized = String::with_capacity(body.len());
    for line in body.lines() {
        normalized.push_str(line.trim_end());
        normalized.push('\n');
    }
    sha256_hex(normalized.as_bytes())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
