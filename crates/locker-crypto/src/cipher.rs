//! AES-256-GCM file encryption with per-file keys.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// File key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// GCM tag length in bytes (128 bits), appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Generate random bytes from the operating system CSPRNG.
pub fn generate_random<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a random nonce (12 bytes).
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    generate_random()
}

/// Per-file symmetric key, zeroized on drop.
///
/// A `FileKey` lives for a single seal or open call. Only its wrapped form
/// is ever persisted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct FileKey([u8; KEY_LEN]);

impl FileKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(generate_random())
    }

    /// Rebuild a key from raw bytes (used after unwrapping).
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Ciphertext (tag appended) together with the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl EncryptedPayload {
    /// Rebuild a payload from stored parts.
    ///
    /// A nonce of the wrong length can only come from a corrupted or altered
    /// record, so it is reported the same way as a failed tag.
    pub fn from_parts(ciphertext: Vec<u8>, nonce: &[u8]) -> CryptoResult<Self> {
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| CryptoError::Authentication)?;
        Ok(Self { ciphertext, nonce })
    }
}

/// Encrypt plaintext under `key` with a freshly generated nonce.
pub fn encrypt(key: &FileKey, plaintext: &[u8]) -> CryptoResult<EncryptedPayload> {
    let nonce = generate_nonce();
    let ciphertext = aes_gcm_encrypt(key.as_bytes(), &nonce, plaintext)?;
    Ok(EncryptedPayload { ciphertext, nonce })
}

/// Verify and decrypt a payload. No plaintext is returned unless the tag
/// verifies.
pub fn decrypt(payload: &EncryptedPayload, key: &FileKey) -> CryptoResult<Vec<u8>> {
    aes_gcm_decrypt(key.as_bytes(), &payload.nonce, &payload.ciphertext)
}

/// Encrypt plaintext with AES-256-GCM under an explicit nonce.
///
/// Returns ciphertext with appended authentication tag (16 bytes).
pub fn aes_gcm_encrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;

    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))
}

/// Decrypt ciphertext with AES-256-GCM.
///
/// The ciphertext must include the authentication tag (16 bytes) at the end.
pub fn aes_gcm_decrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::Authentication)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_is_random() {
        let k1 = FileKey::generate();
        let k2 = FileKey::generate();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = FileKey::generate();
        let payload = encrypt(&key, b"Hello, World!").unwrap();
        assert_eq!(decrypt(&payload, &key).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_encrypt_empty_plaintext() {
        let key = FileKey::generate();
        let payload = encrypt(&key, b"").unwrap();
        assert_eq!(payload.ciphertext.len(), TAG_LEN);
        assert!(decrypt(&payload, &key).unwrap().is_empty());
    }

    #[test]
    fn test_ciphertext_carries_tag() {
        let key = FileKey::generate();
        let payload = encrypt(&key, b"Hello, World!").unwrap();
        assert_eq!(payload.ciphertext.len(), 13 + TAG_LEN);
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = FileKey::generate();
        let a = encrypt(&key, b"same message").unwrap();
        let b = encrypt(&key, b"same message").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_deterministic_for_fixed_nonce() {
        let key = [7u8; KEY_LEN];
        let nonce = [1u8; NONCE_LEN];
        let c1 = aes_gcm_encrypt(&key, &nonce, b"data").unwrap();
        let c2 = aes_gcm_encrypt(&key, &nonce, b"data").unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let payload = encrypt(&FileKey::generate(), b"Secret data").unwrap();
        let result = decrypt(&payload, &FileKey::generate());
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_decrypt_tampered_tag() {
        let key = FileKey::generate();
        let mut payload = encrypt(&key, b"Secret data").unwrap();
        let last = payload.ciphertext.len() - 1;
        payload.ciphertext[last] ^= 0x01;
        assert!(matches!(decrypt(&payload, &key), Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_decrypt_truncated_ciphertext() {
        let key = FileKey::generate();
        let mut payload = encrypt(&key, b"Secret data").unwrap();
        payload.ciphertext.truncate(4);
        assert!(matches!(decrypt(&payload, &key), Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_from_parts_rejects_bad_nonce_length() {
        let result = EncryptedPayload::from_parts(vec![0u8; 32], &[0u8; 16]);
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_from_parts_accepts_stored_nonce() {
        let key = FileKey::generate();
        let payload = encrypt(&key, b"stored").unwrap();
        let rebuilt =
            EncryptedPayload::from_parts(payload.ciphertext.clone(), &payload.nonce).unwrap();
        assert_eq!(rebuilt, payload);
    }

    #[test]
    fn test_file_key_debug_redacted() {
        let key = FileKey::from_bytes([0xAB; KEY_LEN]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }
}
