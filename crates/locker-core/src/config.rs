//! Environment-driven configuration.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `LOCKER_KEYSTORE_PATH` | keystore file | `keystore.lks` |
//! | `LOCKER_KEYSTORE_ALIAS` | expected alias | `locker-key` |
//! | `LOCKER_KEYSTORE_PASSWORD` | keystore password | required |
//! | `LOCKER_BLOB_ROOT` | filesystem blob store root | `./data/blobs` |
//! | `LOCKER_MAX_UPLOAD_BYTES` | upload size limit | 25 MiB |
//! | `LOG_FORMAT` | `text` or `json` | `text` |
//! | `LOG_FILE` | optional log file path | unset |
//! | `LOG_ANSI` | force ANSI colors on or off | auto |

use std::path::PathBuf;

use locker_crypto::{KeyPairProvider, KeyStoreSource, DEFAULT_ALIAS};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::logging::LogConfig;

pub const DEFAULT_KEYSTORE_PATH: &str = "keystore.lks";
pub const DEFAULT_BLOB_ROOT: &str = "./data/blobs";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Runtime configuration of the locker.
#[derive(Clone)]
pub struct LockerConfig {
    pub keystore_path: PathBuf,
    pub keystore_alias: String,
    keystore_password: Zeroizing<String>,
    pub blob_root: PathBuf,
    pub max_upload_bytes: usize,
    pub log: LogConfig,
}

impl std::fmt::Debug for LockerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockerConfig")
            .field("keystore_path", &self.keystore_path)
            .field("keystore_alias", &self.keystore_alias)
            .field("keystore_password", &"[REDACTED]")
            .field("blob_root", &self.blob_root)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("log", &self.log)
            .finish()
    }
}

impl LockerConfig {
    /// Read configuration from the process environment, loading `.env` first
    /// when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let keystore_password = lookup("LOCKER_KEYSTORE_PASSWORD")
            .filter(|p| !p.is_empty())
            .map(Zeroizing::new)
            .ok_or_else(|| Error::Config("LOCKER_KEYSTORE_PASSWORD is required".to_string()))?;

        let max_upload_bytes = match lookup("LOCKER_MAX_UPLOAD_BYTES") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                Error::Config(format!("LOCKER_MAX_UPLOAD_BYTES is not a number: {}", raw))
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let log = LogConfig::from_lookup(&lookup);

        Ok(Self {
            keystore_path: lookup("LOCKER_KEYSTORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYSTORE_PATH)),
            keystore_alias: lookup("LOCKER_KEYSTORE_ALIAS")
                .unwrap_or_else(|| DEFAULT_ALIAS.to_string()),
            keystore_password,
            blob_root: lookup("LOCKER_BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BLOB_ROOT)),
            max_upload_bytes,
            log,
        })
    }

    /// Provider that loads the master keypair described by this config.
    pub fn key_pair_provider(&self) -> KeyPairProvider {
        KeyPairProvider::new(self.keystore_alias.clone(), self.keystore_password.as_str())
    }

    pub fn keystore_source(&self) -> KeyStoreSource {
        KeyStoreSource::File(self.keystore_path.clone())
    }
}
