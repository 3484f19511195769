//! Password-protected keystore holding the master keypair.
//!
//! A keystore holds exactly one entry: an RSA private key plus its
//! certificate (the SubjectPublicKeyInfo of the public half), stored under a
//! known alias. The private key is encrypted with AES-256-GCM under a key
//! derived from the store password with Argon2id.
//!
//! # Format: LOCKERKS
//!
//! ```text
//! +------------------+
//! | Magic: LOCKERKS  | 8 bytes
//! +------------------+
//! | Header Length    | 4 bytes (little-endian)
//! +------------------+
//! | Header (JSON)    | Variable
//! +------------------+
//! | Encrypted Key    | PKCS#8 DER + 16-byte auth tag
//! +------------------+
//! ```
//!
//! Loading is a startup step. Any failure is fatal: the process must not
//! serve requests without the master keypair.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::cipher::{aes_gcm_decrypt, aes_gcm_encrypt, generate_nonce, generate_random, TAG_LEN};
use crate::error::KeyStoreError;
use crate::format::{base64_decode, base64_encode};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{fingerprint_der, MasterKeyPair};

/// Magic bytes for the keystore format.
pub const MAGIC_KEYSTORE: &[u8; 8] = b"LOCKERKS";

/// Current keystore format version.
pub const KEYSTORE_VERSION: u8 = 1;

/// Alias used when none is configured.
pub const DEFAULT_ALIAS: &str = "locker-key";

/// The only key derivation a keystore may declare.
const KDF_ARGON2ID: &str = "argon2id";

const PREFIX_LEN: usize = 12;

/// Keystore header (plaintext JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStoreHeader {
    /// Format version.
    pub version: u8,
    /// Alias of the single key entry.
    pub alias: String,
    /// KDF algorithm; anything but "argon2id" is rejected as malformed.
    pub kdf: String,
    /// KDF parameters.
    pub kdf_params: KdfParams,
    /// Salt for key derivation (base64).
    pub salt: String,
    /// Nonce for the private key encryption (base64).
    pub nonce: String,
    /// DER SubjectPublicKeyInfo of the entry's public key (base64).
    pub certificate: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl KeyStoreHeader {
    /// Fingerprint of the stored certificate; readable without the password.
    pub fn certificate_fingerprint(&self) -> Result<String, KeyStoreError> {
        let der = base64_decode(&self.certificate)
            .map_err(|_| KeyStoreError::Malformed("certificate is not valid base64".into()))?;
        Ok(fingerprint_der(&der))
    }
}

/// Where the keystore bytes come from.
#[derive(Debug, Clone)]
pub enum KeyStoreSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl KeyStoreSource {
    fn read(&self) -> Result<Vec<u8>, KeyStoreError> {
        match self {
            KeyStoreSource::File(path) => Ok(std::fs::read(path)?),
            KeyStoreSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Loads the master keypair using configured alias and password.
///
/// The password never reaches codec callers; it lives here and is zeroized
/// when the provider is dropped.
pub struct KeyPairProvider {
    alias: String,
    password: Zeroizing<String>,
}

impl KeyPairProvider {
    pub fn new(alias: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Load and verify the keypair. The returned handle is immutable and
    /// meant to be shared for the lifetime of the process.
    pub fn load(&self, source: &KeyStoreSource) -> Result<Arc<MasterKeyPair>, KeyStoreError> {
        let bytes = source.read()?;
        let pair = open_keystore(&bytes, &self.alias, &self.password)?;
        info!(
            alias = %self.alias,
            bits = pair.bits(),
            fingerprint = %pair.fingerprint().unwrap_or_default(),
            "Master keypair loaded"
        );
        Ok(Arc::new(pair))
    }
}

impl std::fmt::Debug for KeyPairProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairProvider")
            .field("alias", &self.alias)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Serialize `pair` into a new keystore protected by `password`.
pub fn create_keystore(
    pair: &MasterKeyPair,
    alias: &str,
    password: &str,
    kdf_params: &KdfParams,
) -> Result<Vec<u8>, KeyStoreError> {
    if alias.trim().is_empty() {
        return Err(KeyStoreError::Malformed("alias must not be empty".into()));
    }

    let salt: [u8; 32] = generate_random();
    let nonce = generate_nonce();
    let derived = derive_key(password.as_bytes(), &salt, kdf_params)?;

    let pkcs8 = pair
        .private_key()
        .to_pkcs8_der()
        .map_err(|e| KeyStoreError::InvalidKey(e.to_string()))?;
    let ciphertext = aes_gcm_encrypt(derived.as_bytes(), &nonce, pkcs8.as_bytes())?;

    let certificate = pair
        .public_key_der()
        .map_err(|e| KeyStoreError::InvalidKey(e.to_string()))?;

    let header = KeyStoreHeader {
        version: KEYSTORE_VERSION,
        alias: alias.to_string(),
        kdf: KDF_ARGON2ID.to_string(),
        kdf_params: kdf_params.clone(),
        salt: base64_encode(&salt),
        nonce: base64_encode(&nonce),
        certificate: base64_encode(&certificate),
        created_at: Utc::now(),
    };
    let header_json = serde_json::to_vec(&header)
        .map_err(|e| KeyStoreError::Malformed(format!("header serialization failed: {}", e)))?;

    let mut output = Vec::with_capacity(PREFIX_LEN + header_json.len() + ciphertext.len());
    output.extend_from_slice(MAGIC_KEYSTORE);
    output.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
    output.extend_from_slice(&header_json);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Write a new keystore for `pair` to `path`.
pub fn save_keystore(
    pair: &MasterKeyPair,
    path: &Path,
    alias: &str,
    password: &str,
    kdf_params: &KdfParams,
) -> Result<(), KeyStoreError> {
    let bytes = create_keystore(pair, alias, password, kdf_params)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Parse the plaintext header without touching the encrypted entry.
pub fn read_header(data: &[u8]) -> Result<KeyStoreHeader, KeyStoreError> {
    split(data).map(|(header, _)| header)
}

/// Check if data is a keystore (starts with LOCKERKS magic).
pub fn is_keystore(data: &[u8]) -> bool {
    data.len() >= MAGIC_KEYSTORE.len() && &data[..MAGIC_KEYSTORE.len()] == MAGIC_KEYSTORE
}

fn split(data: &[u8]) -> Result<(KeyStoreHeader, &[u8]), KeyStoreError> {
    if !is_keystore(data) {
        return Err(KeyStoreError::InvalidMagic);
    }
    if data.len() < PREFIX_LEN {
        return Err(KeyStoreError::Malformed("file too short".into()));
    }

    let header_len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
    let body_start = PREFIX_LEN
        .checked_add(header_len)
        .filter(|end| *end + TAG_LEN <= data.len())
        .ok_or_else(|| KeyStoreError::Malformed("file truncated".into()))?;

    let header: KeyStoreHeader = serde_json::from_slice(&data[PREFIX_LEN..body_start])
        .map_err(|e| KeyStoreError::Malformed(format!("invalid header: {}", e)))?;
    if header.version != KEYSTORE_VERSION {
        return Err(KeyStoreError::Malformed(format!(
            "unsupported version {}",
            header.version
        )));
    }
    if header.kdf != KDF_ARGON2ID {
        return Err(KeyStoreError::Malformed(format!(
            "unsupported kdf {}",
            header.kdf
        )));
    }

    Ok((header, &data[body_start..]))
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N], KeyStoreError> {
    base64_decode(value)
        .ok()
        .and_then(|bytes| <[u8; N]>::try_from(bytes.as_slice()).ok())
        .ok_or_else(|| KeyStoreError::Malformed(format!("invalid {}", field)))
}

fn open_keystore(data: &[u8], alias: &str, password: &str) -> Result<MasterKeyPair, KeyStoreError> {
    let (header, ciphertext) = split(data)?;

    if header.alias != alias {
        return Err(KeyStoreError::AliasNotFound(alias.to_string()));
    }

    let salt: [u8; 32] = decode_fixed("salt", &header.salt)?;
    let nonce: [u8; 12] = decode_fixed("nonce", &header.nonce)?;
    let certificate = base64_decode(&header.certificate)
        .map_err(|_| KeyStoreError::Malformed("invalid certificate encoding".into()))?;
    let certificate = RsaPublicKey::from_public_key_der(&certificate)
        .map_err(|e| KeyStoreError::Malformed(format!("invalid certificate: {}", e)))?;

    let derived = derive_key(password.as_bytes(), &salt, &header.kdf_params)?;
    let pkcs8 = Zeroizing::new(
        aes_gcm_decrypt(derived.as_bytes(), &nonce, ciphertext)
            .map_err(|_| KeyStoreError::WrongPassword)?,
    );

    let private = RsaPrivateKey::from_pkcs8_der(&pkcs8)
        .map_err(|e| KeyStoreError::InvalidKey(e.to_string()))?;
    private
        .validate()
        .map_err(|e| KeyStoreError::InvalidKey(e.to_string()))?;

    let pair = MasterKeyPair::from_private(private);
    if pair.public_key() != &certificate {
        return Err(KeyStoreError::CertificateMismatch);
    }

    debug!(alias = %alias, created_at = %header.created_at, "Keystore entry verified");
    Ok(pair)
}
