// crates/netharvest-vault/src/store.rs
// ============================================================================
// Module: Netharvest Vault Store
// Description: SQLite-backed encrypted credential store with unlock sessions.
// Purpose: Hold credentials encrypted at rest and decrypted only in memory.
// Dependencies: rusqlite, netharvest-core, crate::envelope
// ============================================================================

//! ## Overview
//! The vault is one SQLite file: a metadata row holding the salt, iteration
//! count, and password verifier, plus one row per credential with encrypted
//! secret columns. Unlocking derives the key and proves it by authenticated
//! decryption of the verifier, then decrypts every credential into an
//! in-memory cache. Locking drops the session; the cache and key zeroize on
//! drop, leaving no reachable decrypted material.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use netharvest_core::CredentialError;
use netharvest_core::CredentialId;
use netharvest_core::CredentialSource;
use netharvest_core::ResolvedCredential;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::envelope::KDF_ITERATIONS;
use crate::envelope::SALT_LEN;
use crate::envelope::VaultKey;
use crate::envelope::generate_salt;
use crate::envelope::open_string;
use crate::envelope::seal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Vault schema version stored in `user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Constant token sealed as the password verifier.
const VERIFIER_TOKEN: &[u8] = b"netharvest-vault-verifier-v1";

/// Environment variable consulted by [`Vault::unlock_from_env`].
pub const VAULT_PASSWORD_ENV: &str = "NETHARVEST_VAULT_PASSWORD";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by vault operations.
///
/// # Invariants
/// - Messages never embed decrypted material or key bytes.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Store has no metadata row yet.
    #[error("vault is not initialized")]
    NotInitialized,
    /// Store already holds a metadata row.
    #[error("vault is already initialized")]
    AlreadyInitialized,
    /// Operation requires an unlocked vault.
    #[error("vault is locked")]
    Locked,
    /// Password failed verifier authentication.
    #[error("vault password is incorrect")]
    WrongPassword,
    /// Environment fallback variable is unset.
    #[error("environment variable {VAULT_PASSWORD_ENV} is not set")]
    MissingEnvPassword,
    /// Stored envelope failed to decrypt or parse.
    #[error("vault entry is corrupt: {0}")]
    Corrupt(String),
    /// Credential shape invariant violated.
    #[error("invalid credential: {0}")]
    Invalid(String),
    /// Database failure.
    #[error("vault db error: {0}")]
    Db(String),
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

// ============================================================================
// SECTION: Credential Input
// ============================================================================

/// Plaintext credential submitted for storage.
///
/// # Invariants
/// - At least one of `password` / `private_key` is present.
#[derive(Debug, Clone, Default)]
pub struct NewCredential {
    /// Operator-facing short name (unique).
    pub name: String,
    /// Login username.
    pub username: String,
    /// Password, if password auth is used.
    pub password: Option<String>,
    /// Private key (PEM), if key auth is used.
    pub private_key: Option<String>,
    /// Key passphrase, if the key is encrypted.
    pub key_passphrase: Option<String>,
    /// Whether this credential becomes the store default.
    pub is_default: bool,
}

/// Metadata listing row; carries no secret material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSummary {
    /// Credential identifier.
    pub id: CredentialId,
    /// Operator-facing short name.
    pub name: String,
    /// Login username.
    pub username: String,
    /// Whether a password is stored.
    pub has_password: bool,
    /// Whether a private key is stored.
    pub has_private_key: bool,
    /// Whether this is the store default.
    pub is_default: bool,
}

// ============================================================================
// SECTION: Vault
// ============================================================================

/// Unlocked session state: derived key plus decrypted cache.
struct Session {
    /// Derived vault key.
    key: VaultKey,
    /// Decrypted credentials keyed by identifier.
    cache: BTreeMap<CredentialId, ResolvedCredential>,
}

/// SQLite-backed encrypted credential store.
///
/// # Invariants
/// - Decrypted material exists only inside the live [`Session`].
/// - At most one credential carries the default flag.
pub struct Vault {
    /// Database path, kept for diagnostics.
    path: PathBuf,
    /// Serialized database handle.
    connection: Mutex<Connection>,
    /// Unlock session; `None` while locked.
    session: Mutex<Option<Session>>,
}

impl Vault {
    /// Opens (or creates) the vault database file.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Db`] when the file cannot be opened or the
    /// schema cannot be initialized.
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| VaultError::Db(err.to_string()))?;
        }
        let connection = Connection::open(path)?;
        connection.busy_timeout(std::time::Duration::from_millis(5_000))?;
        initialize_schema(&connection)?;
        Ok(Self {
            path: path.to_path_buf(),
            connection: Mutex::new(connection),
            session: Mutex::new(None),
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether a metadata row exists.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Db`] on query failure.
    pub fn is_initialized(&self) -> Result<bool, VaultError> {
        let guard = self.lock_connection()?;
        let count: i64 = guard.query_row("SELECT COUNT(*) FROM vault_meta", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Initializes a fresh vault with the given password.
    ///
    /// Creates the salt and verifier and leaves the vault unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AlreadyInitialized`] when a metadata row exists.
    pub fn init(&self, password: &str) -> Result<(), VaultError> {
        if self.is_initialized()? {
            return Err(VaultError::AlreadyInitialized);
        }
        if password.is_empty() {
            return Err(VaultError::Invalid("password must not be empty".to_string()));
        }
        let salt = generate_salt();
        let key = VaultKey::derive(password, &salt, KDF_ITERATIONS);
        let verifier = seal(&key, VERIFIER_TOKEN);
        {
            let guard = self.lock_connection()?;
            guard.execute(
                "INSERT INTO vault_meta (id, salt, verifier, kdf_iterations) VALUES (1, ?1, ?2, \
                 ?3)",
                params![salt.as_slice(), verifier, i64::from(KDF_ITERATIONS)],
            )?;
        }
        let mut session = self.lock_session()?;
        *session = Some(Session {
            key,
            cache: BTreeMap::new(),
        });
        Ok(())
    }

    /// Unlocks the vault with a password.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::WrongPassword`] when verifier authentication
    /// fails, or [`VaultError::NotInitialized`] for a fresh store.
    pub fn unlock(&self, password: &str) -> Result<(), VaultError> {
        let (salt, verifier, iterations) = self.load_meta()?;
        let key = VaultKey::derive(password, &salt, iterations);
        match open_string(&key, &verifier) {
            Ok(token) if token.as_bytes() == VERIFIER_TOKEN => {}
            Ok(_) | Err(EnvelopeError::Authentication) => return Err(VaultError::WrongPassword),
            Err(err) => return Err(VaultError::Corrupt(err.to_string())),
        }
        let cache = self.decrypt_all(&key)?;
        let mut session = self.lock_session()?;
        *session = Some(Session {
            key,
            cache,
        });
        Ok(())
    }

    /// Unlocks using the configured environment fallback.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingEnvPassword`] when the variable is
    /// unset; otherwise behaves like [`Vault::unlock`].
    pub fn unlock_from_env(&self) -> Result<(), VaultError> {
        let password =
            std::env::var(VAULT_PASSWORD_ENV).map_err(|_| VaultError::MissingEnvPassword)?;
        self.unlock(&password)
    }

    /// Locks the vault, dropping every piece of decrypted material.
    pub fn lock(&self) {
        if let Ok(mut session) = self.session.lock() {
            *session = None;
        }
    }

    /// Returns whether an unlock session is live.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.session.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Stores a new credential, encrypting its secret fields.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Locked`] without a session,
    /// [`VaultError::Invalid`] when no secret field is present.
    pub fn add_credential(&self, credential: NewCredential) -> Result<CredentialId, VaultError> {
        if credential.name.trim().is_empty() || credential.username.trim().is_empty() {
            return Err(VaultError::Invalid("name and username are required".to_string()));
        }
        if credential.password.is_none() && credential.private_key.is_none() {
            return Err(VaultError::Invalid(
                "at least one of password or private key is required".to_string(),
            ));
        }
        let mut session_guard = self.lock_session()?;
        let session = session_guard.as_mut().ok_or(VaultError::Locked)?;
        let password_enc = credential.password.as_deref().map(|p| seal(&session.key, p.as_bytes()));
        let key_enc =
            credential.private_key.as_deref().map(|k| seal(&session.key, k.as_bytes()));
        let passphrase_enc =
            credential.key_passphrase.as_deref().map(|p| seal(&session.key, p.as_bytes()));
        let id = {
            let mut guard = self.lock_connection()?;
            let tx = guard.transaction()?;
            if credential.is_default {
                tx.execute("UPDATE credentials SET is_default = 0 WHERE is_default = 1", [])?;
            }
            tx.execute(
                "INSERT INTO credentials (name, username, password_enc, private_key_enc, \
                 key_passphrase_enc, is_default) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    credential.name,
                    credential.username,
                    password_enc,
                    key_enc,
                    passphrase_enc,
                    i64::from(credential.is_default)
                ],
            )?;
            let raw = tx.last_insert_rowid();
            tx.commit()?;
            u64::try_from(raw)
                .ok()
                .and_then(CredentialId::from_raw)
                .ok_or_else(|| VaultError::Db("row id out of range".to_string()))?
        };
        session.cache.insert(
            id,
            ResolvedCredential {
                id,
                name: credential.name,
                username: credential.username,
                password: credential.password,
                private_key: credential.private_key,
                key_passphrase: credential.key_passphrase,
            },
        );
        Ok(id)
    }

    /// Lists credential metadata without touching secret columns' plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Db`] on query failure.
    pub fn list(&self) -> Result<Vec<CredentialSummary>, VaultError> {
        let guard = self.lock_connection()?;
        let mut stmt = guard.prepare(
            "SELECT id, name, username, password_enc IS NOT NULL, private_key_enc IS NOT NULL, \
             is_default FROM credentials ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let username: String = row.get(2)?;
            let has_password: bool = row.get(3)?;
            let has_private_key: bool = row.get(4)?;
            let is_default: bool = row.get(5)?;
            Ok((id, name, username, has_password, has_private_key, is_default))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (raw, name, username, has_password, has_private_key, is_default) = row?;
            let id = u64::try_from(raw)
                .ok()
                .and_then(CredentialId::from_raw)
                .ok_or_else(|| VaultError::Db("row id out of range".to_string()))?;
            out.push(CredentialSummary {
                id,
                name,
                username,
                has_password,
                has_private_key,
                is_default,
            });
        }
        Ok(out)
    }

    /// Loads and decrypts every credential row with the given key.
    fn decrypt_all(
        &self,
        key: &VaultKey,
    ) -> Result<BTreeMap<CredentialId, ResolvedCredential>, VaultError> {
        let guard = self.lock_connection()?;
        let mut stmt = guard.prepare(
            "SELECT id, name, username, password_enc, private_key_enc, key_passphrase_enc FROM \
             credentials",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let username: String = row.get(2)?;
            let password_enc: Option<String> = row.get(3)?;
            let key_enc: Option<String> = row.get(4)?;
            let passphrase_enc: Option<String> = row.get(5)?;
            Ok((id, name, username, password_enc, key_enc, passphrase_enc))
        })?;
        let mut cache = BTreeMap::new();
        for row in rows {
            let (raw, name, username, password_enc, key_enc, passphrase_enc) = row?;
            let id = u64::try_from(raw)
                .ok()
                .and_then(CredentialId::from_raw)
                .ok_or_else(|| VaultError::Db("row id out of range".to_string()))?;
            let password = decrypt_field(key, password_enc.as_deref(), "password")?;
            let private_key = decrypt_field(key, key_enc.as_deref(), "private key")?;
            let key_passphrase = decrypt_field(key, passphrase_enc.as_deref(), "passphrase")?;
            cache.insert(
                id,
                ResolvedCredential {
                    id,
                    name,
                    username,
                    password,
                    private_key,
                    key_passphrase,
                },
            );
        }
        Ok(cache)
    }

    /// Returns the identifier of the default credential row, if flagged.
    fn default_id(&self) -> Result<Option<CredentialId>, VaultError> {
        let guard = self.lock_connection()?;
        let raw: Option<i64> = guard
            .query_row("SELECT id FROM credentials WHERE is_default = 1", [], |row| row.get(0))
            .optional()?;
        Ok(raw.and_then(|r| u64::try_from(r).ok()).and_then(CredentialId::from_raw))
    }

    /// Loads the metadata row.
    fn load_meta(&self) -> Result<([u8; SALT_LEN], String, u32), VaultError> {
        let guard = self.lock_connection()?;
        let row: Option<(Vec<u8>, String, i64)> = guard
            .query_row(
                "SELECT salt, verifier, kdf_iterations FROM vault_meta WHERE id = 1",
                [],
                |row| {
                    let salt: Vec<u8> = row.get(0)?;
                    let verifier: String = row.get(1)?;
                    let iterations: i64 = row.get(2)?;
                    Ok((salt, verifier, iterations))
                },
            )
            .optional()?;
        let Some((salt_vec, verifier, iterations)) = row else {
            return Err(VaultError::NotInitialized);
        };
        let salt: [u8; SALT_LEN] = salt_vec
            .try_into()
            .map_err(|_| VaultError::Corrupt("salt has wrong length".to_string()))?;
        let iterations = u32::try_from(iterations)
            .map_err(|_| VaultError::Corrupt("iteration count out of range".to_string()))?;
        Ok((salt, verifier, iterations))
    }

    /// Locks the connection mutex, mapping poisoning to a store error.
    fn lock_connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, VaultError> {
        self.connection.lock().map_err(|_| VaultError::Db("connection mutex poisoned".to_string()))
    }

    /// Locks the session mutex, mapping poisoning to a store error.
    fn lock_session(&self) -> Result<std::sync::MutexGuard<'_, Option<Session>>, VaultError> {
        self.session.lock().map_err(|_| VaultError::Db("session mutex poisoned".to_string()))
    }
}

/// Decrypts one optional secret column.
fn decrypt_field(
    key: &VaultKey,
    envelope: Option<&str>,
    label: &str,
) -> Result<Option<String>, VaultError> {
    match envelope {
        None => Ok(None),
        Some(envelope) => {
            let text = open_string(key, envelope)
                .map_err(|err| VaultError::Corrupt(format!("{label}: {err}")))?;
            Ok(Some(text.to_string()))
        }
    }
}

// ============================================================================
// SECTION: Credential Source
// ============================================================================

impl CredentialSource for Vault {
    fn credential(&self, id: CredentialId) -> Result<Option<ResolvedCredential>, CredentialError> {
        let session = self
            .session
            .lock()
            .map_err(|_| CredentialError::Store("session mutex poisoned".to_string()))?;
        let Some(session) = session.as_ref() else {
            return Err(CredentialError::Locked);
        };
        Ok(session.cache.get(&id).cloned())
    }

    fn default_credential(&self) -> Result<Option<ResolvedCredential>, CredentialError> {
        let default_id =
            self.default_id().map_err(|err| CredentialError::Store(err.to_string()))?;
        match default_id {
            Some(id) => self.credential(id),
            None => Ok(None),
        }
    }

    fn all_credentials(&self) -> Result<Vec<ResolvedCredential>, CredentialError> {
        let session = self
            .session
            .lock()
            .map_err(|_| CredentialError::Store("session mutex poisoned".to_string()))?;
        let Some(session) = session.as_ref() else {
            return Err(CredentialError::Locked);
        };
        Ok(session.cache.values().cloned().collect())
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Creates tables on first open and validates the schema version.
fn initialize_schema(connection: &Connection) -> Result<(), VaultError> {
    let version: i64 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == 0 {
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS vault_meta (
                 id INTEGER PRIMARY KEY CHECK (id = 1),
                 salt BLOB NOT NULL,
                 verifier TEXT NOT NULL,
                 kdf_iterations INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS credentials (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT NOT NULL UNIQUE,
                 username TEXT NOT NULL,
                 password_enc TEXT,
                 private_key_enc TEXT,
                 key_passphrase_enc TEXT,
                 is_default INTEGER NOT NULL DEFAULT 0
             );
             CREATE UNIQUE INDEX IF NOT EXISTS idx_credentials_default
                 ON credentials (is_default) WHERE is_default = 1;",
        )?;
        connection.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
        return Ok(());
    }
    if version != SCHEMA_VERSION {
        return Err(VaultError::Db(format!(
            "unsupported vault schema version {version} (expected {SCHEMA_VERSION})"
        )));
    }
    Ok(())
}
