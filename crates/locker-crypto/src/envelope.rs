//! Envelope codec: seal and open files.
//!
//! # Seal
//!
//! 1. Generate a random file key
//! 2. Encrypt the plaintext with AES-256-GCM under a fresh nonce
//! 3. Wrap the file key under the master public key
//!
//! # Open
//!
//! 1. Evaluate the access policy; stop on denial
//! 2. Unwrap the file key
//! 3. Verify and decrypt the ciphertext
//!
//! The file key never leaves the call that created or recovered it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cipher::{self, EncryptedPayload, FileKey};
use crate::error::{CryptoResult, OpenError};
use crate::keys::MasterKeyPair;
use crate::policy::{decide, AccessContext, AccessDecision, DocumentMetadata};
use crate::wrap::{KeyWrapper, RsaOaepWrapper, WrappedKey};

/// Output of [`EnvelopeCodec::seal`]. Both halves must be persisted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub payload: EncryptedPayload,
    pub wrapped_key: WrappedKey,
}

/// Composes the cipher, the key wrapper and the access policy.
///
/// Cheap to clone; all clones share the same wrapper.
#[derive(Debug)]
pub struct EnvelopeCodec<W = RsaOaepWrapper> {
    wrapper: Arc<W>,
}

impl<W> Clone for EnvelopeCodec<W> {
    fn clone(&self) -> Self {
        Self {
            wrapper: Arc::clone(&self.wrapper),
        }
    }
}

impl EnvelopeCodec<RsaOaepWrapper> {
    /// Codec over the deployment's master keypair.
    pub fn new(keys: Arc<MasterKeyPair>) -> Self {
        Self::with_wrapper(RsaOaepWrapper::new(keys))
    }
}

impl<W: KeyWrapper> EnvelopeCodec<W> {
    pub fn with_wrapper(wrapper: W) -> Self {
        Self {
            wrapper: Arc::new(wrapper),
        }
    }

    /// Encrypt `plaintext` under a new file key and wrap that key.
    ///
    /// Either both the payload and the wrapped key are returned or nothing is.
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<SealedEnvelope> {
        let key = FileKey::generate();
        let payload = cipher::encrypt(&key, plaintext)?;
        let wrapped_key = self.wrapper.wrap(&key)?;
        debug!(size = plaintext.len(), "Sealed envelope");
        Ok(SealedEnvelope {
            payload,
            wrapped_key,
        })
    }

    /// Decrypt a sealed file for `ctx`, after the access policy grants it.
    pub fn open(
        &self,
        payload: &EncryptedPayload,
        wrapped_key: &WrappedKey,
        ctx: &AccessContext,
        meta: &DocumentMetadata,
    ) -> Result<Vec<u8>, OpenError> {
        let grant = match decide(ctx, meta) {
            AccessDecision::Granted(grant) => grant,
            AccessDecision::Denied => {
                debug!(role = ctx.role_label(), "Access denied before unwrap");
                return Err(OpenError::AccessDenied);
            }
        };

        let key = self.wrapper.unwrap(wrapped_key).map_err(|e| {
            warn!(error = %e, "Envelope key unwrap failed");
            OpenError::DecryptionFailed
        })?;

        let plaintext = cipher::decrypt(payload, &key).map_err(|e| {
            warn!(error = %e, "Envelope payload failed authentication");
            OpenError::DecryptionFailed
        })?;

        debug!(role = ctx.role_label(), grant = ?grant, "Opened envelope");
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_support;
    use crate::policy::Role;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(test_support::master())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let codec = codec();
        let sealed = codec.seal(b"hello").unwrap();
        let opened = codec
            .open(
                &sealed.payload,
                &sealed.wrapped_key,
                &AccessContext::new("p1", Role::Patient),
                &DocumentMetadata::owned_by("p1"),
            )
            .unwrap();
        assert_eq!(opened, b"hello");
    }

    #[test]
    fn test_seal_does_not_contain_plaintext() {
        let sealed = codec().seal(b"hello hello hello").unwrap();
        assert!(!sealed
            .payload
            .ciphertext
            .windows(5)
            .any(|w| w == b"hello"));
    }

    #[test]
    fn test_open_denied() {
        let codec = codec();
        let sealed = codec.seal(b"hello").unwrap();
        let result = codec.open(
            &sealed.payload,
            &sealed.wrapped_key,
            &AccessContext::new("p2", Role::Patient),
            &DocumentMetadata::owned_by("p1"),
        );
        assert_eq!(result, Err(OpenError::AccessDenied));
    }

    #[test]
    fn test_open_with_foreign_master_key() {
        let sealed = EnvelopeCodec::new(test_support::other()).seal(b"hello").unwrap();
        let result = codec().open(
            &sealed.payload,
            &sealed.wrapped_key,
            &AccessContext::new("a1", Role::Admin),
            &DocumentMetadata::owned_by("p1"),
        );
        assert_eq!(result, Err(OpenError::DecryptionFailed));
    }

    #[test]
    fn test_open_tampered_ciphertext() {
        let codec = codec();
        let mut sealed = codec.seal(b"hello").unwrap();
        sealed.payload.ciphertext[0] ^= 0x80;
        let result = codec.open(
            &sealed.payload,
            &sealed.wrapped_key,
            &AccessContext::new("a1", Role::Admin),
            &DocumentMetadata::owned_by("p1"),
        );
        assert_eq!(result, Err(OpenError::DecryptionFailed));
    }

    #[test]
    fn test_open_swapped_wrapped_key() {
        let codec = codec();
        let a = codec.seal(b"first").unwrap();
        let b = codec.seal(b"second").unwrap();
        let result = codec.open(
            &a.payload,
            &b.wrapped_key,
            &AccessContext::new("a1", Role::Admin),
            &DocumentMetadata::owned_by("p1"),
        );
        assert_eq!(result, Err(OpenError::DecryptionFailed));
    }

    #[test]
    fn test_each_seal_uses_new_key_and_nonce() {
        let codec = codec();
        let a = codec.seal(b"same").unwrap();
        let b = codec.seal(b"same").unwrap();
        assert_ne!(a.payload.nonce, b.payload.nonce);
        assert_ne!(a.wrapped_key, b.wrapped_key);
    }
}
