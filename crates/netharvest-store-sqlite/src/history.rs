// crates/netharvest-store-sqlite/src/history.rs
// ============================================================================
// Module: SQLite History Store
// Description: Durable run and capture records keyed by slug and run id.
// Purpose: Commit run lifecycles exactly twice and capture rows exactly once.
// Dependencies: rusqlite, netharvest-core, crate::pool
// ============================================================================

//! ## Overview
//! The history store is the only mutable store during a run, and the run's
//! owning controller is its only writer: `begin_run` at start, capture rows
//! as devices complete, one `finish_run` at the end. A unique index on
//! (run, device) enforces at-most-once capture commits per device.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use netharvest_core::CaptureId;
use netharvest_core::CaptureKind;
use netharvest_core::CaptureRecord;
use netharvest_core::DeviceCounts;
use netharvest_core::HistoryStore;
use netharvest_core::JobSlug;
use netharvest_core::NewCapture;
use netharvest_core::RunId;
use netharvest_core::RunKey;
use netharvest_core::RunRecord;
use netharvest_core::RunStatus;
use netharvest_core::StoreError;
use netharvest_core::core::time::format_rfc3339;
use netharvest_core::core::time::parse_rfc3339;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use time::OffsetDateTime;

use crate::pool::ConnectionPool;
use crate::pool::SqliteStoreError;
use crate::pool::apply_schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// History schema version.
const SCHEMA_VERSION: i64 = 1;

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed history store.
pub struct SqliteHistoryStore {
    /// Connection pool for this store file.
    pool: ConnectionPool,
}

impl SqliteHistoryStore {
    /// Opens (or creates) the history database.
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

    /// Maps one run row into the core record.
    fn map_run(row: &Row<'_>) -> rusqlite::Result<RawRunRow> {
        Ok(RawRunRow {
            id: row.get(0)?,
            job_slug: row.get(1)?,
            started_at: row.get(2)?,
            completed_at: row.get(3)?,
            total: row.get(4)?,
            success: row.get(5)?,
            failed: row.get(6)?,
            skipped: row.get(7)?,
            status: row.get(8)?,
            error: row.get(9)?,
        })
    }
}

/// Raw run row before validation.
struct RawRunRow {
    /// Run row id.
    id: i64,
    /// Owning slug text.
    job_slug: String,
    /// Start timestamp text.
    started_at: String,
    /// Completion timestamp text.
    completed_at: Option<String>,
    /// Total device count.
    total: i64,
    /// Success count.
    success: i64,
    /// Failed count.
    failed: i64,
    /// Skipped count.
    skipped: i64,
    /// Status text.
    status: String,
    /// Error text.
    error: Option<String>,
}

impl RawRunRow {
    /// Validates the row into a [`RunRecord`].
    fn into_record(self) -> Result<RunRecord, SqliteStoreError> {
        let id = u64::try_from(self.id)
            .ok()
            .and_then(RunId::from_raw)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("bad run id {}", self.id)))?;
        let job_slug = JobSlug::parse(self.job_slug)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let started_at = parse_rfc3339(&self.started_at)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(parse_rfc3339)
            .transpose()
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let status = RunStatus::from_str_opt(&self.status)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("bad status {:?}", self.status)))?;
        Ok(RunRecord {
            id,
            job_slug,
            started_at,
            completed_at,
            counts: DeviceCounts {
                total: u64::try_from(self.total).unwrap_or(0),
                success: u64::try_from(self.success).unwrap_or(0),
                failed: u64::try_from(self.failed).unwrap_or(0),
                skipped: u64::try_from(self.skipped).unwrap_or(0),
            },
            status,
            error: self.error,
        })
    }
}

/// Shared SELECT column list for run rows.
const RUN_COLUMNS: &str = "id, job_slug, started_at, completed_at, total, success, failed, \
                           skipped, status, error";

impl HistoryStore for SqliteHistoryStore {
    fn begin_run(
        &self,
        job: &JobSlug,
        total: u64,
        started_at: OffsetDateTime,
    ) -> Result<RunId, StoreError> {
        let guard = self.pool.writer().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO runs (job_slug, started_at, total, status) VALUES (?1, ?2, ?3, \
                 'running')",
                params![
                    job.as_str(),
                    format_rfc3339(started_at),
                    i64::try_from(total).unwrap_or(i64::MAX)
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        u64::try_from(guard.last_insert_rowid())
            .ok()
            .and_then(RunId::from_raw)
            .ok_or_else(|| StoreError::Invalid("run id out of range".to_string()))
    }

    fn finish_run(
        &self,
        run: RunId,
        counts: &DeviceCounts,
        status: RunStatus,
        error: Option<&str>,
        completed_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let guard = self.pool.writer().map_err(StoreError::from)?;
        let updated = guard
            .execute(
                "UPDATE runs SET completed_at = ?2, total = ?3, success = ?4, failed = ?5, \
                 skipped = ?6, status = ?7, error = ?8 WHERE id = ?1 AND status = 'running'",
                params![
                    i64::try_from(run.get()).unwrap_or(i64::MAX),
                    format_rfc3339(completed_at),
                    i64::try_from(counts.total).unwrap_or(i64::MAX),
                    i64::try_from(counts.success).unwrap_or(i64::MAX),
                    i64::try_from(counts.failed).unwrap_or(i64::MAX),
                    i64::try_from(counts.skipped).unwrap_or(i64::MAX),
                    status.as_str(),
                    error
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("running run {run}")));
        }
        Ok(())
    }

    fn record_cancelled_run(&self, job: &JobSlug, at: OffsetDateTime) -> Result<RunId, StoreError> {
        let guard = self.pool.writer().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO runs (job_slug, started_at, completed_at, total, status) VALUES \
                 (?1, ?2, ?2, 0, 'cancelled')",
                params![job.as_str(), format_rfc3339(at)],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        u64::try_from(guard.last_insert_rowid())
            .ok()
            .and_then(RunId::from_raw)
            .ok_or_else(|| StoreError::Invalid("run id out of range".to_string()))
    }

    fn record_capture(&self, capture: &NewCapture) -> Result<CaptureId, StoreError> {
        let guard = self.pool.writer().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO captures (run_id, device_name, kind, path, size_bytes, captured_at, \
                 score) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    i64::try_from(capture.run_id.get()).unwrap_or(i64::MAX),
                    capture.device_name,
                    capture.kind.as_str(),
                    capture.path.to_string_lossy(),
                    i64::try_from(capture.size_bytes).unwrap_or(i64::MAX),
                    format_rfc3339(capture.captured_at),
                    capture.score.map(i64::from)
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        u64::try_from(guard.last_insert_rowid())
            .ok()
            .and_then(CaptureId::from_raw)
            .ok_or_else(|| StoreError::Invalid("capture id out of range".to_string()))
    }

    fn runs(&self, job: Option<&JobSlug>, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let guard = self.pool.reader().map_err(StoreError::from)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut out = Vec::new();
        let rows: Vec<RawRunRow> = match job {
            Some(slug) => {
                let mut stmt = guard
                    .prepare(&format!(
                        "SELECT {RUN_COLUMNS} FROM runs WHERE job_slug = ?1 ORDER BY id DESC \
                         LIMIT ?2"
                    ))
                    .map_err(|err| StoreError::Db(err.to_string()))?;
                let mapped = stmt
                    .query_map(params![slug.as_str(), limit], Self::map_run)
                    .map_err(|err| StoreError::Db(err.to_string()))?;
                mapped
                    .collect::<rusqlite::Result<_>>()
                    .map_err(|err| StoreError::Db(err.to_string()))?
            }
            None => {
                let mut stmt = guard
                    .prepare(&format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT ?1"))
                    .map_err(|err| StoreError::Db(err.to_string()))?;
                let mapped = stmt
                    .query_map(params![limit], Self::map_run)
                    .map_err(|err| StoreError::Db(err.to_string()))?;
                mapped
                    .collect::<rusqlite::Result<_>>()
                    .map_err(|err| StoreError::Db(err.to_string()))?
            }
        };
        for row in rows {
            out.push(row.into_record().map_err(StoreError::from)?);
        }
        Ok(out)
    }

    fn run(&self, key: &RunKey) -> Result<Option<RunRecord>, StoreError> {
        let guard = self.pool.reader().map_err(StoreError::from)?;
        let row: Option<RawRunRow> = match key {
            RunKey::Id(id) => guard
                .query_row(
                    &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                    params![i64::try_from(id.get()).unwrap_or(i64::MAX)],
                    Self::map_run,
                )
                .optional()
                .map_err(|err| StoreError::Db(err.to_string()))?,
            RunKey::Identity {
                slug,
                started_at,
            } => guard
                .query_row(
                    &format!(
                        "SELECT {RUN_COLUMNS} FROM runs WHERE job_slug = ?1 AND started_at = ?2 \
                         ORDER BY id DESC"
                    ),
                    params![slug.as_str(), format_rfc3339(*started_at)],
                    Self::map_run,
                )
                .optional()
                .map_err(|err| StoreError::Db(err.to_string()))?,
        };
        row.map(|raw| raw.into_record().map_err(StoreError::from)).transpose()
    }

    fn captures(&self, run: RunId) -> Result<Vec<CaptureRecord>, StoreError> {
        let guard = self.pool.reader().map_err(StoreError::from)?;
        let mut stmt = guard
            .prepare(
                "SELECT id, run_id, device_name, kind, path, size_bytes, captured_at, score FROM \
                 captures WHERE run_id = ?1 ORDER BY id",
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![i64::try_from(run.get()).unwrap_or(i64::MAX)], |row| {
                let id: i64 = row.get(0)?;
                let run_id: i64 = row.get(1)?;
                let device_name: String = row.get(2)?;
                let kind: String = row.get(3)?;
                let path: String = row.get(4)?;
                let size_bytes: i64 = row.get(5)?;
                let captured_at: String = row.get(6)?;
                let score: Option<i64> = row.get(7)?;
                Ok((id, run_id, device_name, kind, path, size_bytes, captured_at, score))
            })
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let (id, run_id, device_name, kind, path, size_bytes, captured_at, score) =
                row.map_err(|err| StoreError::Db(err.to_string()))?;
            let id = u64::try_from(id)
                .ok()
                .and_then(CaptureId::from_raw)
                .ok_or_else(|| StoreError::Invalid("capture id out of range".to_string()))?;
            let run_id = u64::try_from(run_id)
                .ok()
                .and_then(RunId::from_raw)
                .ok_or_else(|| StoreError::Invalid("run id out of range".to_string()))?;
            let kind = CaptureKind::from_str_opt(&kind)
                .ok_or_else(|| StoreError::Invalid(format!("bad capture kind {kind:?}")))?;
            let captured_at = parse_rfc3339(&captured_at)
                .map_err(|err| StoreError::Invalid(err.to_string()))?;
            let score = score
                .map(|s| u8::try_from(s))
                .transpose()
                .map_err(|_| StoreError::Invalid("score out of range".to_string()))?;
            out.push(CaptureRecord {
                id,
                run_id,
                device_name,
                kind,
                path: PathBuf::from(path),
                size_bytes: u64::try_from(size_bytes).unwrap_or(0),
                captured_at,
                score,
            });
        }
        Ok(out)
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates history tables on first open.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    apply_schema(
        connection,
        SCHEMA_VERSION,
        "CREATE TABLE IF NOT EXISTS runs (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             job_slug TEXT NOT NULL,
             started_at TEXT NOT NULL,
             completed_at TEXT,
             total INTEGER NOT NULL DEFAULT 0,
             success INTEGER NOT NULL DEFAULT 0,
             failed INTEGER NOT NULL DEFAULT 0,
             skipped INTEGER NOT NULL DEFAULT 0,
             status TEXT NOT NULL,
             error TEXT
         );
         CREATE INDEX IF NOT EXISTS idx_runs_job_slug ON runs (job_slug, id);
         CREATE TABLE IF NOT EXISTS captures (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             run_id INTEGER NOT NULL REFERENCES runs (id),
             device_name TEXT NOT NULL,
             kind TEXT NOT NULL,
             path TEXT NOT NULL,
             size_bytes INTEGER NOT NULL,
             captured_at TEXT NOT NULL,
             score INTEGER,
             UNIQUE (run_id, device_name)
         );",
    )
}
