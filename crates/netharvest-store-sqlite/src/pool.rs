// crates/netharvest-store-sqlite/src/pool.rs
// ============================================================================
// Module: SQLite Connection Pool
// Description: Shared open/init plumbing for the SQLite-backed stores.
// Purpose: One writer connection plus a small read pool per store file.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Each store file is served by one mutex-guarded writer connection and a
//! small pool of read connections selected round-robin. Workers take their
//! own read handle from the pool, so no handle crosses threads; writes are
//! funneled through the owning controller and serialized on the writer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use netharvest_core::StoreError;
use rusqlite::Connection;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Busy timeout applied to every connection.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Read connections opened per store.
const READ_POOL_SIZE: usize = 4;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the SQLite store layer.
#[derive(Debug, Clone, Error)]
pub enum SqliteStoreError {
    /// Store I/O failure.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// Database engine failure.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data failed shape validation.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Requested row does not exist.
    #[error("sqlite store row not found: {0}")]
    NotFound(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Db(message)
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}

// ============================================================================
// SECTION: Pool
// ============================================================================

/// One writer connection plus a round-robin read pool.
pub struct ConnectionPool {
    /// Writer connection, serialized by mutex.
    write: Mutex<Connection>,
    /// Read connections, each guarded independently.
    reads: Vec<Mutex<Connection>>,
    /// Round-robin cursor for read selection.
    cursor: AtomicUsize,
}

impl ConnectionPool {
    /// Opens the pool and runs the store's schema initializer once.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the file cannot be opened or the
    /// initializer fails.
    pub fn open(
        path: &Path,
        initialize: impl Fn(&Connection) -> Result<(), SqliteStoreError>,
    ) -> Result<Self, SqliteStoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        }
        let write = open_connection(path)?;
        initialize(&write)?;
        let mut reads = Vec::with_capacity(READ_POOL_SIZE);
        for _ in 0 .. READ_POOL_SIZE {
            reads.push(Mutex::new(open_connection(path)?));
        }
        Ok(Self {
            write: Mutex::new(write),
            reads,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Locks the writer connection.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the mutex is poisoned.
    pub fn writer(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.write
            .lock()
            .map_err(|_| SqliteStoreError::Db("write mutex poisoned".to_string()))
    }

    /// Locks the next read connection (round-robin).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the mutex is poisoned.
    pub fn reader(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.reads.len();
        self.reads[index]
            .lock()
            .map_err(|_| SqliteStoreError::Db("read mutex poisoned".to_string()))
    }
}

/// Opens one connection with the store pragmas applied.
fn open_connection(path: &Path) -> Result<Connection, SqliteStoreError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.pragma_update(None, "journal_mode", "wal")?;
    connection.pragma_update(None, "synchronous", "normal")?;
    connection.pragma_update(None, "foreign_keys", "on")?;
    Ok(connection)
}

/// Runs idempotent schema DDL and stamps the schema version.
///
/// The DDL must be `IF NOT EXISTS`-safe: it runs on every open with version
/// zero, and the version is stamped only after the DDL commits.
///
/// # Errors
///
/// Returns [`SqliteStoreError::VersionMismatch`] when the file carries a
/// different non-zero version.
pub fn apply_schema(
    connection: &Connection,
    expected: i64,
    ddl: &str,
) -> Result<(), SqliteStoreError> {
    let version: i64 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == 0 {
        connection.execute_batch(ddl)?;
        connection.execute_batch(&format!("PRAGMA user_version = {expected}"))?;
        return Ok(());
    }
    if version != expected {
        return Err(SqliteStoreError::VersionMismatch(format!(
            "found schema version {version}, expected {expected}"
        )));
    }
    Ok(())
}
