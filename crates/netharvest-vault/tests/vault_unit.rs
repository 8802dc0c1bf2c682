// crates/netharvest-vault/tests/vault_unit.rs
// ============================================================================
// Module: Vault Unit Tests
// Description: Lifecycle tests for the encrypted credential store.
// Purpose: Validate init/unlock/lock semantics and leak-free locking.
// ============================================================================

//! ## Overview
//! Unit-level tests for the vault lifecycle:
//! - Initialization and re-open with the right and wrong passwords
//! - Credential storage and default-flag exclusivity
//! - Lock semantics: no decrypted material reachable after lock

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use netharvest_core::CredentialError;
use netharvest_core::CredentialSource;
use netharvest_vault::NewCredential;
use netharvest_vault::Vault;
use netharvest_vault::VaultError;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open_vault(dir: &TempDir) -> Vault {
    Vault::open(&dir.path().join("vault.db")).expect("open vault")
}

fn lab_credential(name: &str, is_default: bool) -> NewCredential {
    NewCredential {
        name: name.to_string(),
        username: "netops".to_string(),
        password: Some("hunter2".to_string()),
        private_key: None,
        key_passphrase: None,
        is_default,
    }
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn init_unlocks_and_reopen_requires_password() {
    let dir = TempDir::new().expect("tempdir");
    {
        let vault = open_vault(&dir);
        assert!(!vault.is_initialized().expect("check"));
        vault.init("master-pw").expect("init");
        assert!(vault.is_unlocked());
        vault.add_credential(lab_credential("lab", true)).expect("add");
    }
    let reopened = open_vault(&dir);
    assert!(reopened.is_initialized().expect("check"));
    assert!(!reopened.is_unlocked());
    assert!(matches!(reopened.unlock("wrong"), Err(VaultError::WrongPassword)));
    reopened.unlock("master-pw").expect("unlock");
    let all = reopened.all_credentials().expect("all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].password.as_deref(), Some("hunter2"));
}

#[test]
fn double_init_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let vault = open_vault(&dir);
    vault.init("pw").expect("init");
    assert!(matches!(vault.init("pw"), Err(VaultError::AlreadyInitialized)));
}

#[test]
fn unlock_on_uninitialized_store_fails() {
    let dir = TempDir::new().expect("tempdir");
    let vault = open_vault(&dir);
    assert!(matches!(vault.unlock("pw"), Err(VaultError::NotInitialized)));
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

#[test]
fn default_flag_is_exclusive() {
    let dir = TempDir::new().expect("tempdir");
    let vault = open_vault(&dir);
    vault.init("pw").expect("init");
    vault.add_credential(lab_credential("first", true)).expect("add");
    let second = vault.add_credential(lab_credential("second", true)).expect("add");
    let summaries = vault.list().expect("list");
    let defaults: Vec<_> = summaries.iter().filter(|s| s.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, second);
    let resolved = vault.default_credential().expect("default").expect("present");
    assert_eq!(resolved.name, "second");
}

#[test]
fn credential_requires_some_secret() {
    let dir = TempDir::new().expect("tempdir");
    let vault = open_vault(&dir);
    vault.init("pw").expect("init");
    let bare = NewCredential {
        name: "bare".to_string(),
        username: "netops".to_string(),
        ..NewCredential::default()
    };
    assert!(matches!(vault.add_credential(bare), Err(VaultError::Invalid(_))));
}

#[test]
fn listing_works_while_locked() {
    let dir = TempDir::new().expect("tempdir");
    let vault = open_vault(&dir);
    vault.init("pw").expect("init");
    vault.add_credential(lab_credential("lab", false)).expect("add");
    vault.lock();
    let summaries = vault.list().expect("list");
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].has_password);
    assert!(!summaries[0].has_private_key);
}

// ============================================================================
// SECTION: Lock Semantics
// ============================================================================

#[test]
fn lock_removes_all_decrypted_material() {
    let dir = TempDir::new().expect("tempdir");
    let vault = open_vault(&dir);
    vault.init("pw").expect("init");
    let id = vault.add_credential(lab_credential("lab", true)).expect("add");
    assert!(vault.credential(id).expect("get").is_some());

    vault.lock();
    assert!(!vault.is_unlocked());
    assert!(matches!(vault.credential(id), Err(CredentialError::Locked)));
    assert!(matches!(vault.all_credentials(), Err(CredentialError::Locked)));
    assert!(matches!(vault.default_credential(), Err(CredentialError::Locked)));
    assert!(matches!(
        vault.add_credential(lab_credential("late", false)),
        Err(VaultError::Locked)
    ));
}

#[test]
fn stored_columns_are_not_plaintext() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("vault.db");
    {
        let vault = Vault::open(&path).expect("open");
        vault.init("pw").expect("init");
        vault.add_credential(lab_credential("lab", true)).expect("add");
    }
    let raw = std::fs::read(&path).expect("read db file");
    let haystack = String::from_utf8_lossy(&raw);
    assert!(!haystack.contains("hunter2"));
}
