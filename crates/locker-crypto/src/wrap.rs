//! RSA-OAEP wrapping of file keys under the master keypair.
//!
//! OAEP uses SHA-256 for both the label hash and MGF1. The wrapped form is
//! standard base64 so it can be stored as a plain string field.
//!
//! Every unwrap failure (bad base64, OAEP check, wrong plaintext length) is
//! reported as the single [`CryptoError::Unwrap`] so callers cannot tell
//! padding failures apart from anything else.

use std::sync::Arc;

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::cipher::{FileKey, KEY_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode};
use crate::keys::MasterKeyPair;

/// A file key encrypted under the master public key, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey(String);

impl WrappedKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wrap a file key under `public_key`.
pub fn wrap(key: &FileKey, public_key: &RsaPublicKey) -> CryptoResult<WrappedKey> {
    let encrypted = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Wrap(e.to_string()))?;
    Ok(WrappedKey(base64_encode(&encrypted)))
}

/// Unwrap a file key with `private_key`.
pub fn unwrap(wrapped: &WrappedKey, private_key: &RsaPrivateKey) -> CryptoResult<FileKey> {
    let encrypted = base64_decode(wrapped.as_str()).map_err(|_| CryptoError::Unwrap)?;
    let raw = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha256>(), &encrypted)
            .map_err(|_| CryptoError::Unwrap)?,
    );

    let bytes: [u8; KEY_LEN] = raw
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::Unwrap)?;
    Ok(FileKey::from_bytes(bytes))
}

/// Wrapping scheme used by the envelope codec.
pub trait KeyWrapper: Send + Sync {
    /// Wrap a freshly generated file key.
    fn wrap(&self, key: &FileKey) -> CryptoResult<WrappedKey>;

    /// Recover the file key from its wrapped form.
    fn unwrap(&self, wrapped: &WrappedKey) -> CryptoResult<FileKey>;
}

/// RSA-OAEP wrapper bound to the deployment's master keypair.
#[derive(Debug, Clone)]
pub struct RsaOaepWrapper {
    keys: Arc<MasterKeyPair>,
}

impl RsaOaepWrapper {
    pub fn new(keys: Arc<MasterKeyPair>) -> Self {
        Self { keys }
    }
}

impl KeyWrapper for RsaOaepWrapper {
    fn wrap(&self, key: &FileKey) -> CryptoResult<WrappedKey> {
        wrap(key, self.keys.public_key())
    }

    fn unwrap(&self, wrapped: &WrappedKey) -> CryptoResult<FileKey> {
        unwrap(wrapped, self.keys.private_key())
    }
}
