// publisher.rs - Trusted publisher registry.
//
// Publishers are keyed by id and carry one of four ordered trust levels:
// untrusted < community < verified < official. The registry answers
// "may content from this publisher run?" and "what trust does a
// template's claimed publisher actually earn?". It holds no keys and
// performs no cryptography of its own.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrustError;

// ── Trust levels ──

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    #[default]
    Untrusted,
    Community,
    Verified,
    Official,
}

impl TrustLevel {
    /// The hierarchy, lowest first.
    pub const ALL: [TrustLevel; 4] = [
        TrustLevel::Untrusted,
        TrustLevel::Community,
        TrustLevel::Verified,
        TrustLevel::Official,
    ];

    pub fn index(&self) -> usize {
        match self {
            TrustLevel::Untrusted => 0,
            TrustLevel::Community => 1,
            TrustLevel::Verified => 2,
            TrustLevel::Official => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::Community => "community",
            TrustLevel::Verified => "verified",
            TrustLevel::Official => "official",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrustLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| TrustError::InvalidTrustLevel(s.to_string()))
    }
}

// ── Entries ──

/// A registered publisher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublisherEntry {
    pub id: String,
    pub name: String,
    pub trust_level: TrustLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Set only by a successful `verify_publisher`.
    #[serde(default)]
    pub verified: bool,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PublisherEntry {
    fn validate(&self) -> Result<(), TrustError> {
        validate_identity(&self.id, &self.name)
    }
}

fn validate_identity(id: &str, name: &str) -> Result<(), TrustError> {
    if id.trim().is_empty() {
        return Err(TrustError::EmptyField("id"));
    }
    if name.trim().is_empty() {
        return Err(TrustError::EmptyField("name"));
    }
    Ok(())
}

/// Input to `add_publisher`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPublisher {
    pub id: String,
    pub name: String,
    pub trust_level: TrustLevel,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewPublisher {
    pub fn new(id: impl Into<String>, name: impl Into<String>, trust_level: TrustLevel) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trust_level,
            public_key: None,
            metadata: None,
        }
    }

    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The publisher a template claims, as carried in its security metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublisherInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub trust_level: TrustLevel,
}

// ── Configuration ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Whether unknown or `untrusted` publishers may run content.
    #[serde(default)]
    pub allow_untrusted: bool,

    /// Cap unverified publishers at `community` in `inherit_trust`.
    #[serde(default)]
    pub strict_mode: bool,

    /// Trust given to publishers the registry has never heard of.
    #[serde(default)]
    pub default_trust_level: TrustLevel,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            allow_untrusted: false,
            strict_mode: false,
            default_trust_level: TrustLevel::Untrusted,
        }
    }
}

/// Filters for `query`. Unset fields match everything; set fields are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherQuery {
    pub trust_level: Option<TrustLevel>,
    pub verified: Option<bool>,
    /// Case-insensitive substring of the publisher name.
    pub name_contains: Option<String>,
}

impl PublisherQuery {
    pub fn trust_level(mut self, level: TrustLevel) -> Self {
        self.trust_level = Some(level);
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = Some(verified);
        self
    }

    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    fn matches(&self, entry: &PublisherEntry) -> bool {
        if let Some(level) = self.trust_level {
            if entry.trust_level != level {
                return false;
            }
        }
        if let Some(verified) = self.verified {
            if entry.verified != verified {
                return false;
            }
        }
        if let Some(needle) = &self.name_contains {
            if !entry.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

// ── Registry ──

#[derive(Debug, Clone, Default)]
pub struct PublisherRegistry {
    config: RegistryConfig,
    publishers: HashMap<String, PublisherEntry>,
}

impl PublisherRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            publishers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    /// Registers a publisher. It starts unverified.
    pub fn add_publisher(&mut self, publisher: NewPublisher) -> Result<&PublisherEntry, TrustError> {
        validate_identity(&publisher.id, &publisher.name)?;
        if self.publishers.contains_key(&publisher.id) {
            return Err(TrustError::DuplicatePublisher(publisher.id));
        }

        tracing::info!(
            publisher = %publisher.id,
            trust_level = %publisher.trust_level,
            "publisher registered"
        );
        let entry = PublisherEntry {
            id: publisher.id.clone(),
            name: publisher.name,
            trust_level: publisher.trust_level,
            public_key: publisher.public_key,
            verified: false,
            added_at: Utc::now(),
            metadata: publisher.metadata,
        };
        Ok(self.publishers.entry(publisher.id).or_insert(entry))
    }

    pub fn remove_publisher(&mut self, id: &str) -> Option<PublisherEntry> {
        let removed = self.publishers.remove(id);
        if removed.is_some() {
            tracing::info!(publisher = %id, "publisher removed");
        }
        removed
    }

    pub fn get_publisher(&self, id: &str) -> Option<&PublisherEntry> {
        self.publishers.get(id)
    }

    /// All publishers, sorted by id.
    pub fn list_publishers(&self) -> Vec<&PublisherEntry> {
        let mut list: Vec<&PublisherEntry> = self.publishers.values().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn update_trust_level(&mut self, id: &str, level: TrustLevel) -> Result<(), TrustError> {
        let entry = self
            .publishers
            .get_mut(id)
            .ok_or_else(|| TrustError::UnknownPublisher(id.to_string()))?;
        tracing::info!(publisher = %id, from = %entry.trust_level, to = %level, "publisher trust level changed");
        entry.trust_level = level;
        Ok(())
    }

    /// Whether content from `id` may run.
    pub fn is_trusted(&self, id: &str) -> bool {
        match self.publishers.get(id) {
            None => self.config.allow_untrusted,
            Some(entry) if entry.trust_level == TrustLevel::Untrusted => self.config.allow_untrusted,
            Some(_) => true,
        }
    }

    /// Marks a publisher verified.
    ///
    /// Known gap: any non-empty signature is accepted for a publisher that
    /// has a public key. No signature is checked against that key.
    pub fn verify_publisher(&mut self, id: &str, signature: &str) -> bool {
        let Some(entry) = self.publishers.get_mut(id) else {
            tracing::debug!(publisher = %id, "verification failed: unknown publisher");
            return false;
        };
        if entry.public_key.is_none() {
            tracing::debug!(publisher = %id, "verification failed: no public key on record");
            return false;
        }
        if signature.is_empty() {
            return false;
        }
        if !entry.verified {
            entry.verified = true;
            tracing::info!(publisher = %id, "publisher verified");
        }
        true
    }

    /// The trust level a template's claimed publisher actually earns.
    pub fn inherit_trust(&self, info: &PublisherInfo) -> TrustLevel {
        // Step 1: unknown publishers get the configured default.
        let Some(entry) = self.publishers.get(&info.id) else {
            return self.config.default_trust_level;
        };

        // Step 2: verified publishers never earn more than they registered with.
        if entry.verified {
            return info.trust_level.min(entry.trust_level);
        }

        // Step 3: strict mode caps unverified publishers at community.
        if self.config.strict_mode {
            return info.trust_level.min(TrustLevel::Community);
        }

        info.trust_level
    }

    /// Hierarchy index difference, `a - b`.
    pub fn compare_trust_levels(a: TrustLevel, b: TrustLevel) -> i32 {
        a.index() as i32 - b.index() as i32
    }

    /// Whether a registered publisher is at or above `minimum`. Unknown ids never are.
    pub fn meets_minimum(&self, id: &str, minimum: TrustLevel) -> bool {
        self.publishers
            .get(id)
            .is_some_and(|entry| entry.trust_level >= minimum)
    }

    /// Publishers matching every set filter, sorted by id.
    pub fn query(&self, query: &PublisherQuery) -> Vec<&PublisherEntry> {
        self.list_publishers()
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect()
    }

    // ── Persistence ──

    /// Snapshot of every entry, sorted by id, for host-managed storage.
    pub fn export(&self) -> Vec<PublisherEntry> {
        self.list_publishers().into_iter().cloned().collect()
    }

    pub fn export_json(&self) -> Result<String, TrustError> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Upserts entries by id, keeping their `verified` flag. Nothing is
    /// imported if any entry is invalid.
    pub fn import(&mut self, entries: Vec<PublisherEntry>) -> Result<usize, TrustError> {
        for entry in &entries {
            entry.validate()?;
        }
        let count = entries.len();
        for entry in entries {
            self.publishers.insert(entry.id.clone(), entry);
        }
        tracing::info!(count, "publishers imported");
        Ok(count)
    }

    pub fn import_json(&mut self, json: &str) -> Result<usize, TrustError> {
        let entries: Vec<PublisherEntry> = serde_json::from_str(json)?;
        self.import(entries)
    }
}
