//! # locker-crypto
//!
//! Envelope encryption and access decisions for the document locker.
//!
//! Every uploaded file is encrypted under its own random key; that key is
//! then wrapped under a single long-lived RSA master keypair. Opening a file
//! evaluates the access policy first and only then touches the wrapped key.
//!
//! ## Cryptographic Primitives
//!
//! - **File encryption**: AES-256-GCM (AEAD, 96-bit nonce, 128-bit tag, no AAD)
//! - **Key wrapping**: RSA-OAEP with SHA-256 and MGF1-SHA-256
//! - **Keystore protection**: Argon2id + AES-256-GCM
//! - **Random generation**: operating system CSPRNG
//!
//! ## Examples
//!
//! ### Seal and open a file
//!
//! ```rust
//! use std::sync::Arc;
//! use locker_crypto::{AccessContext, DocumentMetadata, EnvelopeCodec, MasterKeyPair, Role};
//!
//! let keys = Arc::new(MasterKeyPair::generate(2048).unwrap());
//! let codec = EnvelopeCodec::new(keys);
//!
//! let sealed = codec.seal(b"lab results").unwrap();
//!
//! let patient = AccessContext::new("p1", Role::Patient);
//! let meta = DocumentMetadata::owned_by("p1");
//! let plaintext = codec
//!     .open(&sealed.payload, &sealed.wrapped_key, &patient, &meta)
//!     .unwrap();
//! assert_eq!(plaintext, b"lab results");
//! ```
//!
//! ### Load the master keypair at startup
//!
//! ```rust
//! use locker_crypto::{create_keystore, KdfParams, KeyPairProvider, KeyStoreSource, MasterKeyPair};
//!
//! # let pair = MasterKeyPair::generate(2048).unwrap();
//! # let bytes = create_keystore(&pair, "locker-key", "keystore-password", &KdfParams::insecure_fast()).unwrap();
//! let provider = KeyPairProvider::new("locker-key", "keystore-password");
//! let keys = provider.load(&KeyStoreSource::Bytes(bytes)).unwrap();
//! assert_eq!(keys.bits(), 2048);
//! ```

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod format;
pub mod kdf;
pub mod keys;
pub mod keystore;
pub mod policy;
pub mod wrap;

// Re-export commonly used types
pub use cipher::{EncryptedPayload, FileKey, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use envelope::{EnvelopeCodec, SealedEnvelope};
pub use error::{CryptoError, CryptoResult, KeyStoreError, OpenError};
pub use format::{base64_decode, base64_encode};
pub use kdf::KdfParams;
pub use keys::{fingerprint_der, MasterKeyPair, DEFAULT_KEY_BITS, MIN_KEY_BITS};
pub use keystore::{
    create_keystore, is_keystore, read_header, save_keystore, KeyPairProvider, KeyStoreHeader,
    KeyStoreSource, DEFAULT_ALIAS,
};
pub use policy::{can_decrypt, decide, AccessContext, AccessDecision, DocumentMetadata, Grant, Role};
pub use wrap::{KeyWrapper, RsaOaepWrapper, WrappedKey};
