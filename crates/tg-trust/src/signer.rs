// signer.rs - Template content signatures.
//
// Signatures are HMAC-SHA256 over the exact content bytes, base64 encoded.
// Verification compares decoded tags in constant time and memoizes the
// boolean outcome for a short TTL, keyed by a truncated hash of the
// content and the presented signature. The cache never holds content.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tg_audit::hasher::{hash_bytes, hash_str};
use tg_audit::SecretKey;

use crate::error::TrustError;

/// The only algorithm tag this signer produces or accepts.
pub const ALGORITHM: &str = "HMAC-SHA256";

/// Hex characters of the content hash used as a cache key.
const CACHE_KEY_LEN: usize = 32;

/// Hex characters of the public key fingerprint.
const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignerConfig {
    #[serde(default = "default_true")]
    pub enable_cache: bool,

    /// How long a cached verification result stays valid.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Published key text. Only its fingerprint is attached to signatures.
    #[serde(default)]
    pub public_key: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_ttl_secs: default_cache_ttl_secs(),
            public_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSignature {
    pub algorithm: String,
    /// Base64 (standard alphabet) HMAC tag.
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    pub signer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_fingerprint: Option<String>,
}

/// Outcome of a verification. Never an error: callers branch on `valid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureVerification {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    /// True when the result came from the verification cache.
    #[serde(default)]
    pub cached: bool,
}

impl SignatureVerification {
    fn valid(signer: &str) -> Self {
        Self {
            valid: true,
            error: None,
            signer: Some(signer.to_string()),
            cached: false,
        }
    }

    fn invalid(signer: &str, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            signer: Some(signer.to_string()),
            cached: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedVerification {
    valid: bool,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct TemplateSigner {
    key: SecretKey,
    config: SignerConfig,
    fingerprint: Option<String>,
    cache: Mutex<HashMap<String, CachedVerification>>,
}

impl TemplateSigner {
    pub fn new(key: SecretKey, config: SignerConfig) -> Self {
        let fingerprint = config.public_key.as_deref().map(fingerprint);
        Self {
            key,
            config,
            fingerprint,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    pub fn create_signature(&self, content: &[u8], signer: &str) -> TemplateSignature {
        let tag = self.key.sign(content);
        TemplateSignature {
            algorithm: ALGORITHM.to_string(),
            signature: STANDARD.encode(tag),
            timestamp: Utc::now(),
            signer: signer.to_string(),
            public_key_fingerprint: self.fingerprint.clone(),
        }
    }

    pub fn verify_signature(&self, content: &[u8], signature: &TemplateSignature) -> SignatureVerification {
        if signature.algorithm != ALGORITHM {
            tracing::warn!(algorithm = %signature.algorithm, signer = %signature.signer, "unsupported signature algorithm");
            return SignatureVerification::invalid(
                &signature.signer,
                format!("unsupported algorithm '{}'", signature.algorithm),
            );
        }

        let cache_key = self
            .config
            .enable_cache
            .then(|| cache_key(content, &signature.signature));

        if let Some(key) = &cache_key {
            if let Some(valid) = self.cached(key) {
                let mut result = if valid {
                    SignatureVerification::valid(&signature.signer)
                } else {
                    SignatureVerification::invalid(&signature.signer, "signature mismatch")
                };
                result.cached = true;
                return result;
            }
        }

        let result = match STANDARD.decode(&signature.signature) {
            Err(_) => SignatureVerification::invalid(&signature.signer, "malformed signature encoding"),
            Ok(tag) if self.key.verify(content, &tag) => SignatureVerification::valid(&signature.signer),
            Ok(_) => SignatureVerification::invalid(&signature.signer, "signature mismatch"),
        };

        if !result.valid {
            tracing::warn!(signer = %signature.signer, error = ?result.error, "signature verification failed");
        }
        if let Some(key) = cache_key {
            self.store(key, result.valid);
        }
        result
    }

    /// Signs the canonical JSON form of `template`.
    pub fn sign_template<T: Serialize>(&self, template: &T, signer: &str) -> Result<TemplateSignature, TrustError> {
        let bytes = serde_json::to_vec(template)?;
        Ok(self.create_signature(&bytes, signer))
    }

    /// Verifies `signature` against the canonical JSON form of `template`.
    /// A template that cannot be serialized fails verification.
    pub fn verify_template<T: Serialize>(&self, template: &T, signature: &TemplateSignature) -> SignatureVerification {
        match serde_json::to_vec(template) {
            Ok(bytes) => self.verify_signature(&bytes, signature),
            Err(e) => SignatureVerification::invalid(
                &signature.signer,
                format!("failed to serialize template: {}", e),
            ),
        }
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    /// Inserts a result after purging every expired entry, so the cache
    /// only ever holds results still within their TTL.
    fn store(&self, key: String, valid: bool) {
        let ttl = self.ttl();
        let mut cache = self.lock_cache();
        cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        if ttl.is_zero() {
            return;
        }
        cache.insert(
            key,
            CachedVerification {
                valid,
                stored_at: Instant::now(),
            },
        );
    }

    /// A live cached result. Expired entries are evicted.
    fn cached(&self, key: &str) -> Option<bool> {
        let ttl = self.ttl();
        let mut cache = self.lock_cache();
        let entry = *cache.get(key)?;
        if entry.stored_at.elapsed() < ttl {
            Some(entry.valid)
        } else {
            cache.remove(key);
            None
        }
    }

    // A panic while holding the lock cannot leave a half-written entry.
    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, CachedVerification>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cache_key(content: &[u8], signature: &str) -> String {
    let mut input = Vec::with_capacity(content.len() + signature.len() + 1);
    input.extend_from_slice(content);
    input.push(0);
    input.extend_from_slice(signature.as_bytes());
    let mut digest = hash_bytes(&input);
    digest.truncate(CACHE_KEY_LEN);
    digest
}

/// Short identifier for a published key.
pub fn fingerprint(public_key: &str) -> String {
    let mut digest = hash_str(public_key);
    digest.truncate(FINGERPRINT_LEN);
    digest
}
