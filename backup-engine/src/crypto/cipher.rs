//! Per-file authenticated encryption.
//!
//! Payload layout: `salt (16) || nonce (12) || tag (16) || ciphertext`.
//! The embedded salt makes every payload decryptable from the password alone,
//! given the KDF iteration count persisted in the folder's key record.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{EngineError, Result};

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// Minimum size of a valid encrypted payload (empty plaintext).
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Generate a random salt using OS entropy.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a password and salt with PBKDF2-HMAC-SHA-256.
/// Deterministic for equal (password, salt, iterations); restore depends on this.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut *key);
    key
}

/// Encrypt plaintext with AES-256-GCM under a fresh random nonce.
///
/// The salt is not used by the cipher itself; it is embedded in the header so
/// the payload stays self-describing for decryption.
pub fn encrypt_bytes(plaintext: &[u8], key: &[u8; KEY_LEN], salt: &[u8]) -> Result<Vec<u8>> {
    if salt.len() != SALT_LEN {
        return Err(EngineError::Encryption(format!(
            "salt must be {} bytes, got {}",
            SALT_LEN,
            salt.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| EngineError::Encryption(format!("cipher init: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    // aes-gcm appends the 16-byte tag to the ciphertext
    let sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| EngineError::Encryption(format!("encrypt: {e}")))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt_bytes`], re-deriving the key from
/// the embedded salt and the supplied password.
pub fn decrypt_bytes(payload: &[u8], password: &str, iterations: u32) -> Result<Vec<u8>> {
    if payload.len() < HEADER_LEN {
        return Err(EngineError::Format(format!(
            "payload is {} bytes, minimum is {}",
            payload.len(),
            HEADER_LEN
        )));
    }

    let salt = &payload[..SALT_LEN];
    let nonce_bytes = &payload[SALT_LEN..SALT_LEN + NONCE_LEN];
    let tag = &payload[SALT_LEN + NONCE_LEN..HEADER_LEN];
    let ciphertext = &payload[HEADER_LEN..];

    let key = derive_key(password, salt, iterations);
    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|_| EngineError::Authentication)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(nonce, sealed.as_ref())
        .map_err(|_| EngineError::Authentication)
}

/// SHA-256 digest of file content as a lowercase hex string.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ITERATIONS: u32 = 1000;

    #[test]
    fn test_round_trip() {
        let salt = generate_salt();
        let key = derive_key("secret", &salt, TEST_ITERATIONS);
        let payload = encrypt_bytes(b"hello world", &key, &salt).unwrap();
        let plain = decrypt_bytes(&payload, "secret", TEST_ITERATIONS).unwrap();
        assert_eq!(plain, b"hello world");
    }

    #[test]
    fn test_payload_size_is_header_plus_plaintext() {
        let salt = generate_salt();
        let key = derive_key("secret", &salt, TEST_ITERATIONS);
        let payload = encrypt_bytes(b"hello", &key, &salt).unwrap();
        assert_eq!(payload.len(), HEADER_LEN + 5);
    }

    #[test]
    fn test_wrong_password_fails_authentication() {
        let salt = generate_salt();
        let key = derive_key("secret", &salt, TEST_ITERATIONS);
        let payload = encrypt_bytes(b"hello", &key, &salt).unwrap();
        let err = decrypt_bytes(&payload, "not-secret", TEST_ITERATIONS).unwrap_err();
        assert!(matches!(err, EngineError::Authentication));
    }

    #[test]
    fn test_tampered_payload_fails_authentication() {
        let salt = generate_salt();
        let key = derive_key("secret", &salt, TEST_ITERATIONS);
        let mut payload = encrypt_bytes(b"hello", &key, &salt).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        let err = decrypt_bytes(&payload, "secret", TEST_ITERATIONS).unwrap_err();
        assert!(matches!(err, EngineError::Authentication));
    }

    #[test]
    fn test_short_payload_is_format_error() {
        let err = decrypt_bytes(&[0u8; HEADER_LEN - 1], "secret", TEST_ITERATIONS).unwrap_err();
        assert!(matches!(err, EngineError::Format(_)));
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let salt = generate_salt();
        let key = derive_key("secret", &salt, TEST_ITERATIONS);
        let a = encrypt_bytes(b"same input", &key, &salt).unwrap();
        let b = encrypt_bytes(b"same input", &key, &salt).unwrap();
        assert_ne!(
            a[SALT_LEN..SALT_LEN + NONCE_LEN],
            b[SALT_LEN..SALT_LEN + NONCE_LEN]
        );
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let salt = generate_salt();
        let a = derive_key("secret", &salt, TEST_ITERATIONS);
        let b = derive_key("secret", &salt, TEST_ITERATIONS);
        assert_eq!(a.as_ref(), b.as_ref());

        let other = derive_key("secret", &generate_salt(), TEST_ITERATIONS);
        assert_ne!(a.as_ref(), other.as_ref());
    }

    #[test]
    fn test_content_hash_matches_known_digest() {
        // sha256("hello")
        assert_eq!(
            content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
