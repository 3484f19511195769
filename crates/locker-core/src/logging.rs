//! Structured logging schema and subscriber setup for the document locker.
//!
//! ## Field Schema
//!
//! Events across both crates use these field names so log aggregation can
//! query them uniformly.
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `op` | logical operation ("upload", "list", "assign_patient") |
//! | `doc_id` | document UUID |
//! | `role` | caller role label ("admin", "doctor", "patient", "none") |
//! | `grant` | why the policy granted access |
//! | `alias` | keystore alias |
//! | `bits` | RSA modulus size |
//! | `fingerprint` | SHA-256 of the master public key |
//! | `storage_path` | blob path relative to the store root |
//! | `size` | payload size in bytes |
//! | `result_count` | entries returned by a listing |
//! | `error` | error message of a failed step |
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Integrity failures, orphaned blobs, rejected keystores |
//! | INFO  | Startup, key load, uploads and downloads |
//! | DEBUG | Access decisions (role only), storage paths |
//!
//! Key material, wrapped keys, tokens, claims, caller ids and plaintext are
//! never logged.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "locker_core=info,locker_crypto=info";

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `"json"` selects JSON; anything else is text.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Log to this file with daily rotation instead of stderr.
    pub file: Option<PathBuf>,
    /// Override ANSI colors (auto-detected on a terminal, off for files).
    pub ansi: Option<bool>,
}

impl LogConfig {
    /// Read `LOG_FORMAT`, `LOG_FILE` and `LOG_ANSI` through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            file: lookup("LOG_FILE").filter(|v| !v.is_empty()).map(PathBuf::from),
            ansi: lookup("LOG_ANSI").map(|v| v == "true" || v == "1"),
        }
    }
}

/// Install the global subscriber.
///
/// Console output goes to stderr so stdout stays free for command output.
///
/// Returns the file writer guard when file logging is enabled; keep it alive
/// for the life of the process or buffered lines are lost.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = config.file {
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("locker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        match config.format {
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .try_init(),
            LogFormat::Text => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(config.ansi.unwrap_or(false)),
                )
                .try_init(),
        }
        .map_err(|e| Error::Config(format!("logging: {}", e)))?;
        Some(guard)
    } else {
        match config.format {
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogFormat::Text => {
                let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
                if let Some(ansi) = config.ansi {
                    layer = layer.with_ansi(ansi);
                }
                registry.with(layer).try_init()
            }
        }
        .map_err(|e| Error::Config(format!("logging: {}", e)))?;
        None
    };

    tracing::info!(
        log_format = ?config.format,
        log_file = config
            .file
            .as_deref()
            .and_then(|p| p.to_str())
            .unwrap_or("(stderr)"),
        "Logging initialized"
    );

    Ok(guard)
}
