// crates/netharvest-store-sqlite/src/inventory.rs
// ============================================================================
// Module: SQLite Inventory Store
// Description: Read model over devices and their lookup tables.
// Purpose: Serve resolver queries and discovery's credential-test write-back.
// Dependencies: rusqlite, netharvest-core, crate::pool
// ============================================================================

//! ## Overview
//! The inventory is maintained by external tooling; this store reads the
//! joined device view and performs exactly one write: recording credential
//! probe results during discovery. A provisioning API is exposed for
//! fixtures and local bring-up; it is never called during a run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use netharvest_core::CredentialId;
use netharvest_core::CredentialTest;
use netharvest_core::CredentialTestResult;
use netharvest_core::DeviceId;
use netharvest_core::DeviceRecord;
use netharvest_core::DeviceStatus;
use netharvest_core::InventoryStore;
use netharvest_core::PlatformId;
use netharvest_core::RoleId;
use netharvest_core::SiteId;
use netharvest_core::StoreError;
use netharvest_core::core::time::format_rfc3339;
use netharvest_core::core::time::parse_rfc3339;
use rusqlite::Connection;
use rusqlite::params;

use crate::pool::ConnectionPool;
use crate::pool::SqliteStoreError;
use crate::pool::apply_schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Inventory schema version.
const SCHEMA_VERSION: i64 = 1;

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed inventory read model.
pub struct SqliteInventoryStore {
    /// Connection pool for this store file.
    pool: ConnectionPool,
}

impl SqliteInventoryStore {
    /// Opens (or creates) the inventory database.
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

    /// Loads the full joined device view.
    fn load_devices(&self) -> Result<Vec<DeviceRecord>, SqliteStoreError> {
        let guard = self.pool.reader()?;
        let mut stmt = guard.prepare(
            "SELECT d.id, d.name, d.primary_address, d.status,
                    d.site_id, s.name,
                    d.platform_id, p.name, m.name, p.driver_hint, p.paging_disable,
                    d.role_id, r.name,
                    d.pinned_credential_id,
                    d.last_test_credential_id, d.last_test_result, d.last_test_at
             FROM devices d
             JOIN sites s ON s.id = d.site_id
             JOIN platforms p ON p.id = d.platform_id
             JOIN manufacturers m ON m.id = p.manufacturer_id
             JOIN roles r ON r.id = d.role_id
             ORDER BY s.name, d.name, d.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawDeviceRow {
                id: row.get(0)?,
                name: row.get(1)?,
                primary_address: row.get(2)?,
                status: row.get(3)?,
                site_id: row.get(4)?,
                site_name: row.get(5)?,
                platform_id: row.get(6)?,
                platform_name: row.get(7)?,
                manufacturer: row.get(8)?,
                driver_hint: row.get(9)?,
                paging_disable: row.get(10)?,
                role_id: row.get(11)?,
                role_name: row.get(12)?,
                pinned_credential_id: row.get(13)?,
                last_test_credential_id: row.get(14)?,
                last_test_result: row.get(15)?,
                last_test_at: row.get(16)?,
            })
        })?;
        let mut devices = Vec::new();
        for row in rows {
            devices.push(row?.into_record()?);
        }
        Ok(devices)
    }

    /// Writes one credential probe result onto a device row.
    fn write_credential_test(
        &self,
        device: DeviceId,
        test: &CredentialTest,
    ) -> Result<(), SqliteStoreError> {
        let guard = self.pool.writer()?;
        let tested_at = format_rfc3339(test.tested_at);
        let credential = test.credential_id.map(|id| i64::try_from(id.get()).unwrap_or(i64::MAX));
        let updated = if test.result == CredentialTestResult::Success {
            guard.execute(
                "UPDATE devices SET pinned_credential_id = ?2, last_test_credential_id = ?2, \
                 last_test_result = ?3, last_test_at = ?4 WHERE id = ?1",
                params![
                    i64::try_from(device.get()).unwrap_or(i64::MAX),
                    credential,
                    test.result.as_str(),
                    tested_at
                ],
            )?
        } else {
            guard.execute(
                "UPDATE devices SET last_test_credential_id = ?2, last_test_result = ?3, \
                 last_test_at = ?4 WHERE id = ?1",
                params![
                    i64::try_from(device.get()).unwrap_or(i64::MAX),
                    credential,
                    test.result.as_str(),
                    tested_at
                ],
            )?
        };
        if updated == 0 {
            return Err(SqliteStoreError::NotFound(format!("device {device}")));
        }
        Ok(())
    }
}

impl InventoryStore for SqliteInventoryStore {
    fn devices(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        self.load_devices().map_err(StoreError::from)
    }

    fn record_credential_test(
        &self,
        device: DeviceId,
        test: &CredentialTest,
    ) -> Result<(), StoreError> {
        self.write_credential_test(device, test).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw row shape before identifier validation.
struct RawDeviceRow {
    /// Device row id.
    id: i64,
    /// Device name.
    name: String,
    /// Primary address (may be empty).
    primary_address: String,
    /// Status text.
    status: String,
    /// Site row id.
    site_id: i64,
    /// Site name.
    site_name: String,
    /// Platform row id.
    platform_id: i64,
    /// Platform name.
    platform_name: String,
    /// Manufacturer name.
    manufacturer: String,
    /// Driver hint.
    driver_hint: String,
    /// Paging-disable command.
    paging_disable: Option<String>,
    /// Role row id.
    role_id: i64,
    /// Role name.
    role_name: String,
    /// Pinned credential row id.
    pinned_credential_id: Option<i64>,
    /// Last probe credential row id.
    last_test_credential_id: Option<i64>,
    /// Last probe result text.
    last_test_result: Option<String>,
    /// Last probe timestamp text.
    last_test_at: Option<String>,
}

impl RawDeviceRow {
    /// Validates identifiers and enum texts into a [`DeviceRecord`].
    fn into_record(self) -> Result<DeviceRecord, SqliteStoreError> {
        let id = to_id(self.id, DeviceId::from_raw, "device id")?;
        let site_id = to_id(self.site_id, SiteId::from_raw, "site id")?;
        let platform_id = to_id(self.platform_id, PlatformId::from_raw, "platform id")?;
        let role_id = to_id(self.role_id, RoleId::from_raw, "role id")?;
        let status = DeviceStatus::from_str_opt(&self.status)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("bad status {:?}", self.status)))?;
        let pinned_credential_id = self
            .pinned_credential_id
            .map(|raw| to_id(raw, CredentialId::from_raw, "pinned credential id"))
            .transpose()?;
        let last_credential_test = match (self.last_test_result, self.last_test_at) {
            (Some(result), Some(at)) => {
                let result = CredentialTestResult::from_str_opt(&result).ok_or_else(|| {
                    SqliteStoreError::Invalid(format!("bad test result {result:?}"))
                })?;
                let tested_at = parse_rfc3339(&at)
                    .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
                let credential_id = self
                    .last_test_credential_id
                    .map(|raw| to_id(raw, CredentialId::from_raw, "test credential id"))
                    .transpose()?;
                Some(CredentialTest {
                    credential_id,
                    result,
                    tested_at,
                })
            }
            _ => None,
        };
        Ok(DeviceRecord {
            id,
            name: self.name,
            primary_address: self.primary_address,
            site_id,
            site_name: self.site_name,
            platform_id,
            platform_name: self.platform_name,
            manufacturer: self.manufacturer,
            driver_hint: self.driver_hint,
            paging_disable: self.paging_disable,
            role_id,
            role_name: self.role_name,
            status,
            pinned_credential_id,
            last_credential_test,
        })
    }
}

/// Converts a row id into a typed identifier.
fn to_id<T>(
    raw: i64,
    build: impl Fn(u64) -> Option<T>,
    label: &str,
) -> Result<T, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(build)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("bad {label}: {raw}")))
}

// ============================================================================
// SECTION: Provisioning
// ============================================================================

/// New device row for provisioning.
#[derive(Debug, Clone)]
pub struct NewDevice {
    /// Device name (unique within site).
    pub name: String,
    /// Primary management address.
    pub primary_address: String,
    /// Site reference.
    pub site: SiteId,
    /// Platform reference.
    pub platform: PlatformId,
    /// Role reference.
    pub role: RoleId,
    /// Operational status.
    pub status: DeviceStatus,
    /// Pinned credential, if any.
    pub pinned_credential_id: Option<CredentialId>,
}

impl SqliteInventoryStore {
    /// Inserts a manufacturer row, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on constraint or engine failure.
    pub fn add_manufacturer(&self, name: &str) -> Result<u64, SqliteStoreError> {
        let guard = self.pool.writer()?;
        guard.execute("INSERT INTO manufacturers (name) VALUES (?1)", params![name])?;
        last_rowid(&guard)
    }

    /// Inserts a platform row, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on constraint or engine failure.
    pub fn add_platform(
        &self,
        name: &str,
        manufacturer: u64,
        driver_hint: &str,
        paging_disable: Option<&str>,
    ) -> Result<PlatformId, SqliteStoreError> {
        let guard = self.pool.writer()?;
        guard.execute(
            "INSERT INTO platforms (name, manufacturer_id, driver_hint, paging_disable) VALUES \
             (?1, ?2, ?3, ?4)",
            params![
                name,
                i64::try_from(manufacturer).unwrap_or(i64::MAX),
                driver_hint,
                paging_disable
            ],
        )?;
        let raw = last_rowid(&guard)?;
        PlatformId::from_raw(raw)
            .ok_or_else(|| SqliteStoreError::Invalid("platform id out of range".to_string()))
    }

    /// Inserts a site row, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on constraint or engine failure.
    pub fn add_site(&self, name: &str) -> Result<SiteId, SqliteStoreError> {
        let guard = self.pool.writer()?;
        guard.execute("INSERT INTO sites (name) VALUES (?1)", params![name])?;
        let raw = last_rowid(&guard)?;
        SiteId::from_raw(raw)
            .ok_or_else(|| SqliteStoreError::Invalid("site id out of range".to_string()))
    }

    /// Inserts a role row, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on constraint or engine failure.
    pub fn add_role(&self, name: &str) -> Result<RoleId, SqliteStoreError> {
        let guard = self.pool.writer()?;
        guard.execute("INSERT INTO roles (name) VALUES (?1)", params![name])?;
        let raw = last_rowid(&guard)?;
        RoleId::from_raw(raw)
            .ok_or_else(|| SqliteStoreError::Invalid("role id out of range".to_string()))
    }

    /// Inserts a device row, returning its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on constraint or engine failure.
    pub fn add_device(&self, device: &NewDevice) -> Result<DeviceId, SqliteStoreError> {
        let guard = self.pool.writer()?;
        guard.execute(
            "INSERT INTO devices (name, primary_address, site_id, platform_id, role_id, status, \
             pinned_credential_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                device.name,
                device.primary_address,
                i64::try_from(device.site.get()).unwrap_or(i64::MAX),
                i64::try_from(device.platform.get()).unwrap_or(i64::MAX),
                i64::try_from(device.role.get()).unwrap_or(i64::MAX),
                device.status.as_str(),
                device
                    .pinned_credential_id
                    .map(|id| i64::try_from(id.get()).unwrap_or(i64::MAX))
            ],
        )?;
        let raw = last_rowid(&guard)?;
        DeviceId::from_raw(raw)
            .ok_or_else(|| SqliteStoreError::Invalid("device id out of range".to_string()))
    }
}

/// Returns the last inserted row id as `u64`.
fn last_rowid(connection: &Connection) -> Result<u64, SqliteStoreError> {
    u64::try_from(connection.last_insert_rowid())
        .map_err(|_| SqliteStoreError::Invalid("row id out of range".to_string()))
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates inventory tables on first open.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    apply_schema(
        connection,
        SCHEMA_VERSION,
        "CREATE TABLE IF NOT EXISTS manufacturers (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL UNIQUE
         );
         CREATE TABLE IF NOT EXISTS platforms (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL UNIQUE,
             manufacturer_id INTEGER NOT NULL REFERENCES manufacturers (id),
             driver_hint TEXT NOT NULL,
             paging_disable TEXT
         );
         CREATE TABLE IF NOT EXISTS sites (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL UNIQUE
         );
         CREATE TABLE IF NOT EXISTS roles (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL UNIQUE
         );
         CREATE TABLE IF NOT EXISTS devices (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL,
             primary_address TEXT NOT NULL DEFAULT '',
             site_id INTEGER NOT NULL REFERENCES sites (id),
             platform_id INTEGER NOT NULL REFERENCES platforms (id),
             role_id INTEGER NOT NULL REFERENCES roles (id),
             status TEXT NOT NULL DEFAULT 'active',
             pinned_credential_id INTEGER,
             last_test_credential_id INTEGER,
             last_test_result TEXT,
             last_test_at TEXT,
             UNIQUE (site_id, name)
         );",
    )
}
