// crates/netharvest-vault/src/lib.rs
// ============================================================================
// Module: Netharvest Vault
// Description: Password-protected encrypted container of device credentials.
// Purpose: Keep secrets encrypted at rest and decrypted only per session.
// Dependencies: aes-gcm, base64, netharvest-core, pbkdf2, rand, rusqlite, sha2
// ============================================================================

//! ## Overview
//! `netharvest-vault` implements the secret store: PBKDF2-derived AES-128
//! keys, authenticated envelopes for every secret column, and an unlock
//! session holding the only decrypted copies in memory. The engine consumes
//! the vault through the [`netharvest_core::CredentialSource`] seam.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod envelope;
pub mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::envelope::EnvelopeError;
pub use crate::envelope::KDF_ITERATIONS;
pub use crate::envelope::SALT_LEN;
pub use crate::envelope::VaultKey;
pub use crate::store::CredentialSummary;
pub use crate::store::NewCredential;
pub use crate::store::VAULT_PASSWORD_ENV;
pub use crate::store::Vault;
pub use crate::store::VaultError;
