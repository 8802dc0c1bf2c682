// crates/netharvest-config/src/settings.rs
// ============================================================================
// Module: Netharvest Collector Settings
// Description: Process-level settings: store paths, capture root, vault policy.
// Purpose: Resolve one TOML settings file with data-directory defaults.
// Dependencies: dirs, serde, toml
// ============================================================================

//! ## Overview
//! Settings name where everything lives: the four SQLite stores, the capture
//! root, and the job/batch directories. Every path defaults under the user's
//! data directory so a fresh install works without a settings file at all.
//! The vault's environment fallback is opt-in here; it is a configured
//! fallback, never a default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Directory name under the user data directory.
const APP_DIR: &str = "netharvest";

/// Environment variable consulted for vault unlock when enabled.
pub const VAULT_PASSWORD_ENV: &str = "NETHARVEST_VAULT_PASSWORD";

// ============================================================================
// SECTION: Settings Types
// ============================================================================

/// Store path block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Inventory database path.
    #[serde(default)]
    pub inventory_db: Option<PathBuf>,
    /// History database path.
    #[serde(default)]
    pub history_db: Option<PathBuf>,
    /// Template database path.
    #[serde(default)]
    pub templates_db: Option<PathBuf>,
    /// Vault database path.
    #[serde(default)]
    pub vault_db: Option<PathBuf>,
}

/// Vault policy block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Whether the unlock password may come from the environment variable.
    #[serde(default)]
    pub allow_env_unlock: bool,
}

/// On-disk settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsFile {
    /// Store paths.
    #[serde(default)]
    pub stores: StoreSettings,
    /// Capture root directory.
    #[serde(default)]
    pub capture_root: Option<PathBuf>,
    /// Job descriptor directory.
    #[serde(default)]
    pub jobs_dir: Option<PathBuf>,
    /// Batch descriptor directory.
    #[serde(default)]
    pub batches_dir: Option<PathBuf>,
    /// Vault policy.
    #[serde(default)]
    pub vault: VaultSettings,
    /// Log filter directive (overridden by the environment).
    #[serde(default)]
    pub log_filter: Option<String>,
}

/// Fully-resolved settings with every path populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Inventory database path.
    pub inventory_db: PathBuf,
    /// History database path.
    pub history_db: PathBuf,
    /// Template database path.
    pub templates_db: PathBuf,
    /// Vault database path.
    pub vault_db: PathBuf,
    /// Capture root directory.
    pub capture_root: PathBuf,
    /// Job descriptor directory.
    pub jobs_dir: PathBuf,
    /// Batch descriptor directory.
    pub batches_dir: PathBuf,
    /// Whether the vault may unlock from the environment variable.
    pub allow_env_unlock: bool,
    /// Log filter directive.
    pub log_filter: String,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Returns the default application data directory.
///
/// Falls back to the current directory when the platform exposes no data
/// directory (containers, stripped-down service users).
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from("."), |base| base.join(APP_DIR))
}

impl SettingsFile {
    /// Resolves the document against the default data directory.
    #[must_use]
    pub fn resolve(self) -> Settings {
        self.resolve_under(&default_data_dir())
    }

    /// Resolves the document against an explicit base directory.
    #[must_use]
    pub fn resolve_under(self, base: &Path) -> Settings {
        Settings {
            inventory_db: self.stores.inventory_db.unwrap_or_else(|| base.join("inventory.db")),
            history_db: self.stores.history_db.unwrap_or_else(|| base.join("history.db")),
            templates_db: self.stores.templates_db.unwrap_or_else(|| base.join("templates.db")),
            vault_db: self.stores.vault_db.unwrap_or_else(|| base.join("vault.db")),
            capture_root: self.capture_root.unwrap_or_else(|| base.join("captures")),
            jobs_dir: self.jobs_dir.unwrap_or_else(|| base.join("jobs")),
            batches_dir: self.batches_dir.unwrap_or_else(|| base.join("batches")),
            allow_env_unlock: self.vault.allow_env_unlock,
            log_filter: self.log_filter.unwrap_or_else(|| "info".to_string()),
        }
    }
}

/// Loads settings from a TOML file, or defaults when the file is absent.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file exists but cannot be read or
/// parsed.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(SettingsFile::default().resolve());
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: SettingsFile = toml::from_str(&text).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(file.resolve())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_land_under_base() {
        let settings = SettingsFile::default().resolve_under(Path::new("/data/nh"));
        assert_eq!(settings.inventory_db, PathBuf::from("/data/nh/inventory.db"));
        assert_eq!(settings.capture_root, PathBuf::from("/data/nh/captures"));
        assert!(!settings.allow_env_unlock);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn explicit_paths_win() {
        let file: SettingsFile = toml::from_str(
            r#"
capture_root = "/srv/captures"
log_filter = "debug"

[stores]
inventory_db = "/srv/inventory.db"

[vault]
allow_env_unlock = true
"#,
        )
        .expect("parse");
        let settings = file.resolve_under(Path::new("/data/nh"));
        assert_eq!(settings.inventory_db, PathBuf::from("/srv/inventory.db"));
        assert_eq!(settings.history_db, PathBuf::from("/data/nh/history.db"));
        assert_eq!(settings.capture_root, PathBuf::from("/srv/captures"));
        assert!(settings.allow_env_unlock);
        assert_eq!(settings.log_filter, "debug");
    }

    #[test]
    fn missing_file_resolves_to_defaults() {
        let settings = load_settings(Path::new("/nonexistent/netharvest.toml")).expect("load");
        assert!(settings.jobs_dir.ends_with("jobs"));
    }
}
