// crates/netharvest-store-sqlite/src/templates.rs
// ============================================================================
// Module: SQLite Template Store
// Description: Read-only template table with content deduplication.
// Purpose: Serve validation candidates through per-worker read handles.
// Dependencies: rusqlite, netharvest-core, crate::pool
// ============================================================================

//! ## Overview
//! Templates are imported by external tooling and consumed read-only at run
//! time. Candidate selection filters identifiers by required terms; the term
//! filter runs in Rust because identifiers are short and the table is small.
//! Workers always go through the read pool, so a validation pass never
//! shares a handle across threads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use netharvest_core::StoreError;
use netharvest_core::TemplateRecord;
use netharvest_core::TemplateStore;
use netharvest_core::core::hashing::template_dedup_hash;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::pool::ConnectionPool;
use crate::pool::SqliteStoreError;
use crate::pool::apply_schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Template schema version.
const SCHEMA_VERSION: i64 = 1;

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed template store.
pub struct SqliteTemplateStore {
    /// Connection pool for this store file.
    pool: ConnectionPool,
}

impl SqliteTemplateStore {
    /// Opens (or creates) the template database.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the file cannot be opened or the
    /// schema cannot be initialized.
    pub fn open(path: &Path) -> Result<Self, SqliteStoreError> {
        let pool = ConnectionPool::open(path, initialize_schema)?;
        Ok(Self {
            pool,
        })
    }

    /// Imports one template, deduplicating by content hash.
    ///
    /// Returns `false` when an identical body already exists under the same
    /// identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on engine failure.
    pub fn import(&self, identifier: &str, body: &str) -> Result<bool, SqliteStoreError> {
        let hash = template_dedup_hash(body);
        let guard = self.pool.writer()?;
        let existing: Option<String> = guard
            .query_row(
                "SELECT dedup_hash FROM templates WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )
            .optional()?;
        if existing.as_deref() == Some(hash.as_str()) {
            return Ok(false);
        }
        guard.execute(
            "INSERT INTO templates (identifier, body, dedup_hash) VALUES (?1, ?2, ?3)
             ON CONFLICT (identifier) DO UPDATE SET body = ?2, dedup_hash = ?3",
            params![identifier, body, hash],
        )?;
        Ok(true)
    }

    /// Loads templates whose identifier contains every required term.
    fn load_candidates(&self, terms: &[String]) -> Result<Vec<TemplateRecord>, SqliteStoreError> {
        let guard = self.pool.reader()?;
        let mut stmt = guard
            .prepare("SELECT identifier, body, dedup_hash FROM templates ORDER BY identifier")?;
        let rows = stmt.query_map([], |row| {
            Ok(TemplateRecord {
                identifier: row.get(0)?,
                body: row.get(1)?,
                dedup_hash: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            let record = row?;
            if terms.iter().all(|term| record.identifier.contains(term.as_str())) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

impl TemplateStore for SqliteTemplateStore {
    fn candidates(&self, required_terms: &[String]) -> Result<Vec<TemplateRecord>, StoreError> {
        self.load_candidates(required_terms).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates the template table on first open.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    apply_schema(
        connection,
        SCHEMA_VERSION,
        "CREATE TABLE IF NOT EXISTS templates (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             identifier TEXT NOT NULL UNIQUE,
             body TEXT NOT NULL,
             dedup_hash TEXT NOT NULL
         );",
    )
}
