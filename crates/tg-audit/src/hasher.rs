// hasher.rs - SHA-256 and HMAC-SHA256 utilities.
//
// Plain digests are SHA-256, lowercase hex. Keyed digests are HMAC-SHA256
// from `ring`, keyed by a process-held `SecretKey`. Both the audit log and
// the template signer go through this module so there is exactly one
// place that decides how bytes are hashed.

use std::fmt;

use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::error::AuditError;

/// Length of generated secret keys in bytes.
pub const SECRET_KEY_LEN: usize = 32;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Hash a UTF-8 string, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Secret key material for keyed hashing.
///
/// The key is an explicit constructor argument everywhere it is used.
/// Call [`SecretKey::generate`] when the host has no key of its own.
#[derive(Clone)]
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Wrap existing key material. Empty keys are rejected.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, AuditError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AuditError::EmptyKey);
        }
        Ok(Self { bytes })
    }

    /// Generate a fresh random key from the system RNG.
    pub fn generate() -> Result<Self, AuditError> {
        let rng = SystemRandom::new();
        let mut bytes = vec![0u8; SECRET_KEY_LEN];
        rng.fill(&mut bytes)
            .map_err(|_| AuditError::KeyGeneration)?;
        Ok(Self { bytes })
    }

    /// Use `existing` if present, otherwise generate a new key.
    pub fn or_generate(existing: Option<SecretKey>) -> Result<Self, AuditError> {
        match existing {
            Some(key) => Ok(key),
            None => {
                tracing::debug!("no secret key supplied, generating a random one");
                Self::generate()
            }
        }
    }

    fn hmac_key(&self) -> hmac::Key {
        hmac::Key::new(hmac::HMAC_SHA256, &self.bytes)
    }

    /// Compute the raw HMAC-SHA256 tag of `data`.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        hmac::sign(&self.hmac_key(), data).as_ref().to_vec()
    }

    /// Compute the HMAC-SHA256 tag of `data` as lowercase hex.
    pub fn sign_hex(&self, data: &[u8]) -> String {
        hex::encode(self.sign(data))
    }

    /// Constant-time check that `tag` is the HMAC of `data` under this key.
    ///
    /// Tags of the wrong length are rejected without comparing contents.
    pub fn verify(&self, data: &[u8], tag: &[u8]) -> bool {
        hmac::verify(&self.hmac_key(), data, tag).is_ok()
    }

    /// Constant-time check against a hex-encoded tag. Malformed hex never matches.
    pub fn verify_hex(&self, data: &[u8], tag_hex: &str) -> bool {
        match hex::decode(tag_hex) {
            Ok(tag) => self.verify(data, &tag),
            Err(_) => false,
        }
    }
}

// Key material never reaches logs.
impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
