//! Error types for envelope encryption.
//!
//! Variants that sit on a decryption path carry no payload so that nothing
//! about the failing ciphertext, padding or key can leak through `Display`.

use thiserror::Error;

/// Errors from the symmetric cipher and the key wrapper.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Authentication tag did not verify; ciphertext or nonce was altered.
    #[error("Authentication failed - data may be tampered")]
    Authentication,

    /// Wrapped key could not be unwrapped under the master keypair.
    #[error("Key unwrap failed")]
    Unwrap,

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Key wrapping failed.
    #[error("Key wrap failed: {0}")]
    Wrap(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Passphrase too short.
    #[error("Passphrase too short (minimum {0} characters required)")]
    PassphraseTooShort(usize),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures while loading the master keypair. Always fatal at startup.
#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// Keystore could not be read or written.
    #[error("Keystore I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not a keystore file.
    #[error("Invalid magic bytes - not a keystore file")]
    InvalidMagic,

    /// Structure of the keystore is broken.
    #[error("Malformed keystore: {0}")]
    Malformed(String),

    /// The store does not hold an entry under the configured alias.
    #[error("No key entry under alias '{0}'")]
    AliasNotFound(String),

    /// The password did not open the private key entry.
    #[error("Keystore password rejected")]
    WrongPassword,

    /// The decrypted entry is not a usable RSA private key.
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// The private key does not belong to the stored certificate.
    #[error("Private key does not match the stored certificate")]
    CertificateMismatch,

    /// Password derivation or entry encryption failed.
    #[error("Keystore crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

/// Refusals from [`crate::envelope::EnvelopeCodec::open`].
///
/// The two variants are kept apart for operators; the service boundary folds
/// them into generic outward failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenError {
    /// The access policy refused the caller.
    #[error("Access denied")]
    AccessDenied,

    /// Unwrap or authenticated decryption failed after access was granted.
    #[error("Decryption failed")]
    DecryptionFailed,
}
