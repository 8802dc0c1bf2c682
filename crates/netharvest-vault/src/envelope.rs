// crates/netharvest-vault/src/envelope.rs
// ============================================================================
// Module: Netharvest Vault Envelope
// Description: Key derivation and authenticated envelope encryption.
// Purpose: Turn a vault password into a key and wrap secrets with it.
// Dependencies: aes-gcm, base64, pbkdf2, rand, sha2, zeroize
// ============================================================================

//! ## Overview
//! The vault key is derived with PBKDF2-HMAC-SHA256 (480k iterations over a
//! 16-byte per-store salt) into an AES-128 key. Secrets are wrapped in a
//! versioned authenticated envelope: `version || nonce || ciphertext`,
//! base64-encoded for storage in text columns. Decryption authenticates, so
//! a wrong key is indistinguishable from tampering and both fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use aes_gcm::Aes128Gcm;
use aes_gcm::Key;
use aes_gcm::KeyInit;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// PBKDF2 iteration count for key derivation.
pub const KDF_ITERATIONS: u32 = 480_000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes (AES-128).
const KEY_LEN: usize = 16;

/// Nonce length in bytes (GCM standard).
const NONCE_LEN: usize = 12;

/// Envelope format version byte.
const ENVELOPE_VERSION: u8 = 0x01;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by envelope operations.
///
/// # Invariants
/// - Messages never embed plaintext or key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Ciphertext failed base64 decoding.
    #[error("envelope is not valid base64")]
    Encoding,
    /// Envelope bytes are truncated or carry an unknown version.
    #[error("envelope is malformed")]
    Malformed,
    /// Authentication failed: wrong key or tampered ciphertext.
    #[error("envelope failed authentication")]
    Authentication,
}

// ============================================================================
// SECTION: Key Derivation
// ============================================================================

/// Derived vault key, zeroized on drop.
pub struct VaultKey(Zeroizing<[u8; KEY_LEN]>);

impl VaultKey {
    /// Derives the key from a password and per-store salt.
    #[must_use]
    pub fn derive(password: &str, salt: &[u8; SALT_LEN], iterations: u32) -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, key.as_mut());
        Self(key)
    }

    /// Returns the raw key bytes for cipher construction.
    fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Generates a fresh random salt for a new store.
#[must_use]
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

// ============================================================================
// SECTION: Envelope Operations
// ============================================================================

/// Encrypts plaintext into a base64 envelope string.
#[must_use]
pub fn seal(key: &VaultKey, plaintext: &[u8]) -> String {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.bytes()));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    // Encryption with a fresh random nonce cannot fail for in-memory sizes.
    let ciphertext = cipher.encrypt(nonce, plaintext).unwrap_or_default();
    let mut envelope = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&ciphertext);
    BASE64.encode(envelope)
}

/// Decrypts a base64 envelope string, authenticating it.
///
/// # Errors
///
/// Returns [`EnvelopeError`] on malformed input or authentication failure.
pub fn open(key: &VaultKey, envelope: &str) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
    let bytes = BASE64.decode(envelope).map_err(|_| EnvelopeError::Encoding)?;
    if bytes.len() < 1 + NONCE_LEN || bytes[0] != ENVELOPE_VERSION {
        return Err(EnvelopeError::Malformed);
    }
    let nonce = Nonce::from_slice(&bytes[1 ..= NONCE_LEN]);
    let ciphertext = &bytes[1 + NONCE_LEN ..];
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.bytes()));
    let plaintext =
        cipher.decrypt(nonce, ciphertext).map_err(|_| EnvelopeError::Authentication)?;
    Ok(Zeroizing::new(plaintext))
}

/// Decrypts a base64 envelope into UTF-8 text.
///
/// # Errors
///
/// Returns [`EnvelopeError`] on malformed input, authentication failure, or
/// non-UTF-8 plaintext.
pub fn open_string(key: &VaultKey, envelope: &str) -> Result<Zeroizing<String>, EnvelopeError> {
    let plaintext = open(key, envelope)?;
    let text = std::str::from_utf8(&plaintext).map_err(|_| EnvelopeError::Malformed)?;
    Ok(Zeroizing::new(text.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> VaultKey {
        VaultKey::derive("correct horse", &[7u8; SALT_LEN], 1_000)
    }

    #[test]
    fn seal_open_round_trip() {
        let key = key();
        let envelope = seal(&key, b"t0ps3cret");
        let plaintext = open(&key, &envelope).expect("open");
        assert_eq!(plaintext.as_slice(), b"t0ps3cret");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let envelope = seal(&key(), b"t0ps3cret");
        let other = VaultKey::derive("battery staple", &[7u8; SALT_LEN], 1_000);
        assert_eq!(open(&other, &envelope), Err(EnvelopeError::Authentication));
    }

    #[test]
    fn tampered_envelope_fails_authentication() {
        let key = key();
        let envelope = seal(&key, b"t0ps3cret");
        let mut bytes = BASE64.decode(&envelope).expect("decode");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);
        assert_eq!(open(&key, &tampered), Err(EnvelopeError::Authentication));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let key = key();
        assert_eq!(open(&key, "@@not-base64@@"), Err(EnvelopeError::Encoding));
        assert_eq!(open(&key, &BASE64.encode([ENVELOPE_VERSION])), Err(EnvelopeError::Malformed));
        assert_eq!(open(&key, &BASE64.encode([0x7f; 40])), Err(EnvelopeError::Malformed));
    }

    #[test]
    fn same_plaintext_seals_to_distinct_envelopes() {
        let key = key();
        assert_ne!(seal(&key, b"x"), seal(&key, b"x"));
    }

    #[test]
    fn derivation_is_salt_sensitive() {
        let a = VaultKey::derive("pw", &[1u8; SALT_LEN], 1_000);
        let b = VaultKey::derive("pw", &[2u8; SALT_LEN], 1_000);
        let envelope = seal(&a, b"x");
        assert!(open(&b, &envelope).is_err());
    }
}
