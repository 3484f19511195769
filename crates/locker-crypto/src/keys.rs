//! The master RSA keypair.
//!
//! One `MasterKeyPair` exists per deployment. It is loaded once at startup
//! (see [`crate::keystore`]), wrapped in an `Arc`, and handed to the codec.
//! It is read-only after construction, so concurrent seal/open calls share
//! it without locking.
//!
//! # Security
//!
//! - The private half is zeroized on drop by the `rsa` crate
//! - `Debug` output never includes key material
//! - There is no `Serialize` impl; the only way out is the keystore writer

use rand::rngs::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Smallest modulus accepted for a master key.
pub const MIN_KEY_BITS: usize = 2048;

/// Modulus size used when generating a new master key.
pub const DEFAULT_KEY_BITS: usize = 3072;

/// Master RSA keypair: public half wraps, private half unwraps.
pub struct MasterKeyPair {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl MasterKeyPair {
    /// Generate a new random keypair.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        if bits < MIN_KEY_BITS {
            return Err(CryptoError::InvalidInput(format!(
                "RSA modulus must be at least {} bits",
                MIN_KEY_BITS
            )));
        }
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        Ok(Self::from_private(private))
    }

    /// Create a keypair from an existing private key.
    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self { public, private }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }

    /// DER-encoded SubjectPublicKeyInfo of the public half.
    pub fn public_key_der(&self) -> CryptoResult<Vec<u8>> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }

    /// SHA-256 fingerprint of the public key, lowercase hex.
    pub fn fingerprint(&self) -> CryptoResult<String> {
        Ok(fingerprint_der(&self.public_key_der()?))
    }
}

/// SHA-256 fingerprint of a DER SubjectPublicKeyInfo, lowercase hex.
pub fn fingerprint_der(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

impl std::fmt::Debug for MasterKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyPair")
            .field("bits", &self.bits())
            .field("private", &"[REDACTED]")
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_small_modulus() {
        let result = MasterKeyPair::generate(1024);
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn test_bits() {
        assert_eq!(test_support::master().bits(), 2048);
    }

    #[test]
    fn test_from_private_derives_public() {
        let pair = test_support::master();
        let rebuilt = MasterKeyPair::from_private(pair.private_key().clone());
        assert_eq!(rebuilt.public_key(), pair.public_key());
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let a = test_support::master();
        let b = test_support::other();
        assert_eq!(a.fingerprint().unwrap(), a.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_der_known_digest() {
        assert_eq!(
            fingerprint_der(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_debug_redacted() {
        let debug = format!("{:?}", test_support::master());
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("2048"));
    }
}
