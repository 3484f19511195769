//! Error types for the document locker service.

use locker_crypto::{CryptoError, KeyStoreError, OpenError};
use thiserror::Error;

/// Result type alias using the locker's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Service error for locker operations.
///
/// Messages are for operators. Callers outside the service only ever see the
/// [`PublicFailure`] returned by [`Error::public_failure`].
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Stored document could not be produced (missing blob, failed decryption)
    #[error("Document unavailable: {0}")]
    Unavailable(String),

    /// Blob or document store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Sealing a new document failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Master keypair could not be loaded
    #[error("Keystore error: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<OpenError> for Error {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::AccessDenied => Error::Forbidden("access denied".to_string()),
            OpenError::DecryptionFailed => Error::Unavailable("decryption failed".to_string()),
        }
    }
}

/// Outward classification of a failure.
///
/// Carries a fixed message only; nothing from the underlying error is echoed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicFailure {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Unavailable,
}

impl PublicFailure {
    /// HTTP status a front end should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            PublicFailure::BadRequest => 400,
            PublicFailure::Unauthorized => 401,
            PublicFailure::Forbidden => 403,
            PublicFailure::NotFound => 404,
            PublicFailure::Unavailable => 500,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            PublicFailure::BadRequest => "Bad request",
            PublicFailure::Unauthorized => "Authentication required",
            PublicFailure::Forbidden => "Access denied",
            PublicFailure::NotFound => "Document not found",
            PublicFailure::Unavailable => "Document unavailable",
        }
    }
}

impl std::fmt::Display for PublicFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl Error {
    /// Map to the generic failure shown outside the service.
    pub fn public_failure(&self) -> PublicFailure {
        match self {
            Error::NotFound(_) => PublicFailure::NotFound,
            Error::Unauthorized(_) => PublicFailure::Unauthorized,
            Error::Forbidden(_) => PublicFailure::Forbidden,
            Error::InvalidInput(_) => PublicFailure::BadRequest,
            Error::Unavailable(_)
            | Error::Storage(_)
            | Error::Crypto(_)
            | Error::KeyStore(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Internal(_)
            | Error::Io(_) => PublicFailure::Unavailable,
        }
    }
}
