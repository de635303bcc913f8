// log.rs - Append-only, tamper-evident audit log.
//
// Entries live in memory, oldest first. Each entry carries an HMAC over its
// canonical projection, so any edit to a hashed field is caught by
// `verify_integrity`. Persistence belongs to the host: `export_json` and
// `import_json` move the whole log in and out as a JSON array.
//
// Appending takes `&mut self`, so append and rotation are one atomic step
// from the point of view of any caller holding the log behind a lock.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{AuditEntry, AuditEvent, AuditEventType, AuditSeverity};
use crate::error::AuditError;
use crate::hasher::SecretKey;

/// When the log discards old entries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Keep at most `max_log_size` entries, dropping the oldest.
    #[default]
    Size,
    /// Never discard entries.
    None,
}

/// Audit log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// When false, `log_event` records nothing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Entry cap under size rotation. Zero keeps nothing.
    #[serde(default = "default_max_log_size")]
    pub max_log_size: usize,

    #[serde(default)]
    pub rotation_policy: RotationPolicy,

    /// Fire an alert synchronously for every critical event.
    #[serde(default = "default_alert_on_critical")]
    pub alert_on_critical: bool,

    /// Capture a backtrace into each entry's `stack_trace`.
    #[serde(default)]
    pub include_stack_trace: bool,

    /// User recorded on each entry. Falls back to `$USER` / `$USERNAME`.
    #[serde(default)]
    pub user: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_log_size: default_max_log_size(),
            rotation_policy: RotationPolicy::default(),
            alert_on_critical: default_alert_on_critical(),
            include_stack_trace: false,
            user: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_log_size() -> usize {
    10_000
}

fn default_alert_on_critical() -> bool {
    true
}

/// Receives critical entries as they are logged.
///
/// Called inline from `log_event`, before it returns.
pub trait AlertSink: Send + Sync {
    fn alert(&self, entry: &AuditEntry);
}

/// Filters for [`AuditLog::query`]. All set filters must match.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub end: Option<DateTime<Utc>>,
    pub template_id: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub severity: Option<AuditSeverity>,
    /// Keep only the most recent N matches.
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        if let Some(template_id) = &self.template_id {
            if &entry.template_id != template_id {
                return false;
            }
        }
        if let Some(event_type) = self.event_type {
            if entry.event_type != event_type {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if entry.severity != severity {
                return false;
            }
        }
        true
    }
}

/// Outcome of [`AuditLog::verify_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub valid: bool,
    /// Indices (into the current entry list) whose integrity no longer matches.
    pub tampered: Vec<usize>,
}

/// Entry counts, for dashboards and host-side summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
}

/// The tamper-evident audit log.
pub struct AuditLog {
    config: AuditConfig,
    key: SecretKey,
    user: String,
    pid: u32,
    entries: Vec<AuditEntry>,
    alert_sink: Option<Box<dyn AlertSink>>,
}

impl AuditLog {
    pub fn new(config: AuditConfig, key: SecretKey) -> Self {
        let user = config.user.clone().unwrap_or_else(current_user);
        Self {
            config,
            key,
            user,
            pid: std::process::id(),
            entries: Vec::new(),
            alert_sink: None,
        }
    }

    /// Attach a sink that receives every critical entry (when alerting is on).
    pub fn with_alert_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Record an event. Returns the stored entry, or `None` if logging is
    /// disabled or size rotation with `max_log_size == 0` dropped the entry
    /// straight away. Critical alerts fire in both the stored and dropped cases.
    pub fn log_event(&mut self, event: AuditEvent) -> Option<&AuditEntry> {
        if !self.config.enabled {
            return None;
        }

        let stack_trace = self
            .config
            .include_stack_trace
            .then(|| Backtrace::force_capture().to_string());

        let mut entry = AuditEntry {
            timestamp: Utc::now(),
            event_type: event.event_type,
            severity: event.severity,
            template_id: event.template_id,
            template_version: event.template_version,
            user: self.user.clone(),
            pid: self.pid,
            details: event.details,
            integrity: String::new(),
            stack_trace,
        };
        entry.integrity = self.calculate_integrity(&entry);

        tracing::debug!(
            event_type = %entry.event_type,
            severity = %entry.severity,
            template_id = %entry.template_id,
            "audit event recorded"
        );

        if self.config.alert_on_critical && entry.severity == AuditSeverity::Critical {
            self.alert(&entry);
        }

        self.entries.push(entry);
        self.rotate();
        self.entries.last()
    }

    /// Keyed hash over the entry's canonical projection.
    pub fn calculate_integrity(&self, entry: &AuditEntry) -> String {
        self.key.sign_hex(&entry.projection().canonical_bytes())
    }

    /// Recompute every entry's integrity value and report mismatches.
    pub fn verify_integrity(&self) -> IntegrityReport {
        let tampered: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                !self
                    .key
                    .verify_hex(&entry.projection().canonical_bytes(), &entry.integrity)
            })
            .map(|(i, _)| i)
            .collect();

        if !tampered.is_empty() {
            tracing::warn!(
                count = tampered.len(),
                indices = ?tampered,
                "audit log integrity check failed"
            );
        }

        IntegrityReport {
            valid: tampered.is_empty(),
            tampered,
        }
    }

    /// Entries matching every set filter, oldest first. With `limit`, only
    /// the last N matches are returned.
    pub fn query(&self, query: &AuditQuery) -> Vec<&AuditEntry> {
        let matched: Vec<&AuditEntry> = self.entries.iter().filter(|e| query.matches(e)).collect();
        match query.limit {
            Some(limit) if matched.len() > limit => matched[matched.len() - limit..].to_vec(),
            _ => matched,
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> AuditStats {
        let mut stats = AuditStats {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            *stats
                .by_type
                .entry(entry.event_type.to_string())
                .or_insert(0) += 1;
            *stats
                .by_severity
                .entry(entry.severity.to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Copy of every entry, for host-managed persistence.
    pub fn export(&self) -> Vec<AuditEntry> {
        self.entries.clone()
    }

    pub fn export_json(&self) -> Result<String, AuditError> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Append previously exported entries as-is, then apply rotation.
    ///
    /// Integrity values are not recomputed; run `verify_integrity` to check them.
    pub fn import(&mut self, entries: Vec<AuditEntry>) {
        self.entries.extend(entries);
        self.rotate();
    }

    pub fn import_json(&mut self, json: &str) -> Result<usize, AuditError> {
        let entries: Vec<AuditEntry> = serde_json::from_str(json)?;
        let count = entries.len();
        self.import(entries);
        Ok(count)
    }

    fn rotate(&mut self) {
        if self.config.rotation_policy != RotationPolicy::Size {
            return;
        }
        let max = self.config.max_log_size;
        if self.entries.len() > max {
            let excess = self.entries.len() - max;
            self.entries.drain(..excess);
            tracing::debug!(dropped = excess, "audit log rotated");
        }
    }

    fn alert(&self, entry: &AuditEntry) {
        tracing::error!(
            target: "tg_audit::alert",
            event_type = %entry.event_type,
            template_id = %entry.template_id,
            details = %entry.details,
            "critical security event"
        );
        if let Some(sink) = &self.alert_sink {
            sink.alert(entry);
        }
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn test_key() -> SecretKey {
        SecretKey::from_bytes(b"fixed-test-secret".to_vec()).unwrap()
    }

    fn test_log(config: AuditConfig) -> AuditLog {
        AuditLog::new(
            AuditConfig {
                user: Some("tester".to_string()),
                ..config
            },
            test_key(),
        )
    }

    fn event(template_id: &str, severity: AuditSeverity) -> AuditEvent {
        AuditEvent::new(AuditEventType::TemplateExecution, severity, template_id)
            .with_version("1.0.0")
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        seen: Arc<Mutex<Vec<AuditEntry>>>,
    }

    impl AlertSink for RecordingSink {
        fn alert(&self, entry: &AuditEntry) {
            self.seen.lock().unwrap().push(entry.clone());
        }
    }

    #[test]
    fn logged_entry_carries_context_and_integrity() {
        let mut log = test_log(AuditConfig::default());
        let entry = log
            .log_event(event("tpl-1", AuditSeverity::Info).with_details(json!({"step": 1})))
            .unwrap()
            .clone();

        assert_eq!(entry.user, "tester");
        assert_eq!(entry.pid, std::process::id());
        assert_eq!(entry.template_version, "1.0.0");
        assert_eq!(entry.integrity.len(), 64);
        assert!(entry.stack_trace.is_none());
    }

    #[test]
    fn integrity_is_deterministic_for_fixed_key_and_fields() {
        let mut log = test_log(AuditConfig::default());
        let entry = log.log_event(event("tpl-1", AuditSeverity::Low)).unwrap().clone();

        let again = test_log(AuditConfig::default());
        assert_eq!(log.calculate_integrity(&entry), log.calculate_integrity(&entry));
        assert_eq!(again.calculate_integrity(&entry), entry.integrity);
    }

    #[test]
    fn mutating_any_hashed_field_invalidates_integrity() {
        let mut log = test_log(AuditConfig::default());
        let original = log
            .log_event(event("tpl-1", AuditSeverity::Low).with_details(json!({"a": 1})))
            .unwrap()
            .clone();

        let mutations: Vec<Box<dyn Fn(&mut AuditEntry)>> = vec![
            Box::new(|e| e.timestamp = e.timestamp + chrono::Duration::seconds(1)),
            Box::new(|e| e.event_type = AuditEventType::SecurityViolation),
            Box::new(|e| e.severity = AuditSeverity::Critical),
            Box::new(|e| e.template_id = "other".to_string()),
            Box::new(|e| e.template_version = "2.0.0".to_string()),
            Box::new(|e| e.user = "mallory".to_string()),
            Box::new(|e| e.pid += 1),
            Box::new(|e| e.details = json!({"a": 2})),
        ];

        for mutate in mutations {
            let mut entry = original.clone();
            mutate(&mut entry);
            assert_ne!(log.calculate_integrity(&entry), original.integrity);
        }
    }

    #[test]
    fn stack_trace_is_not_hashed() {
        let mut log = test_log(AuditConfig::default());
        let mut entry = log.log_event(event("tpl-1", AuditSeverity::Low)).unwrap().clone();
        entry.stack_trace = Some("anything".to_string());
        assert_eq!(log.calculate_integrity(&entry), entry.integrity);
    }

    #[test]
    fn verify_integrity_reports_tampered_indices() {
        let mut log = test_log(AuditConfig::default());
        for i in 0..4 {
            log.log_event(event(&format!("tpl-{}", i), AuditSeverity::Info));
        }
        assert!(log.verify_integrity().valid);

        let mut exported = log.export();
        exported[1].severity = AuditSeverity::Critical;
        exported[3].details = json!({"forged": true});

        let mut reloaded = test_log(AuditConfig::default());
        reloaded.import(exported);
        let report = reloaded.verify_integrity();
        assert!(!report.valid);
        assert_eq!(report.tampered, vec![1, 3]);
    }

    #[test]
    fn verification_with_a_different_key_fails() {
        let mut log = test_log(AuditConfig::default());
        log.log_event(event("tpl-1", AuditSeverity::Info));

        let mut other = AuditLog::new(
            AuditConfig::default(),
            SecretKey::from_bytes(b"another".to_vec()).unwrap(),
        );
        other.import(log.export());
        assert_eq!(other.verify_integrity().tampered, vec![0]);
    }

    #[test]
    fn size_rotation_keeps_most_recent_in_order() {
        let max = 5;
        let extra = 3;
        let mut log = test_log(AuditConfig {
            max_log_size: max,
            ..AuditConfig::default()
        });
        for i in 0..(max + extra) {
            log.log_event(event(&format!("tpl-{}", i), AuditSeverity::Info));
        }

        let ids: Vec<&str> = log.entries().iter().map(|e| e.template_id.as_str()).collect();
        assert_eq!(ids, vec!["tpl-3", "tpl-4", "tpl-5", "tpl-6", "tpl-7"]);
        assert!(log.verify_integrity().valid);
    }

    #[test]
    fn no_rotation_policy_keeps_everything() {
        let mut log = test_log(AuditConfig {
            max_log_size: 2,
            rotation_policy: RotationPolicy::None,
            ..AuditConfig::default()
        });
        for i in 0..5 {
            log.log_event(event(&format!("tpl-{}", i), AuditSeverity::Info));
        }
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn zero_size_log_alerts_but_keeps_nothing() {
        let sink = RecordingSink::default();
        let mut log = test_log(AuditConfig {
            max_log_size: 0,
            ..AuditConfig::default()
        })
        .with_alert_sink(Box::new(sink.clone()));

        assert!(log.log_event(event("tpl-1", AuditSeverity::Critical)).is_none());
        assert!(log.is_empty());
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn disabled_log_records_nothing() {
        let mut log = test_log(AuditConfig {
            enabled: false,
            ..AuditConfig::default()
        });
        assert!(log.log_event(event("tpl-1", AuditSeverity::Critical)).is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn query_filters_compose_and_limit_keeps_last() {
        let mut log = test_log(AuditConfig::default());
        log.log_event(event("a", AuditSeverity::Info));
        log.log_event(event("b", AuditSeverity::High));
        log.log_event(
            AuditEvent::new(AuditEventType::DangerousCommand, AuditSeverity::High, "a")
                .with_details(json!({"n": 1})),
        );
        log.log_event(
            AuditEvent::new(AuditEventType::DangerousCommand, AuditSeverity::High, "a")
                .with_details(json!({"n": 2})),
        );
        log.log_event(
            AuditEvent::new(AuditEventType::DangerousCommand, AuditSeverity::High, "a")
                .with_details(json!({"n": 3})),
        );

        let by_template = log.query(&AuditQuery {
            template_id: Some("a".to_string()),
            ..Default::default()
        });
        assert_eq!(by_template.len(), 4);

        let dangerous_high = log.query(&AuditQuery {
            event_type: Some(AuditEventType::DangerousCommand),
            severity: Some(AuditSeverity::High),
            limit: Some(2),
            ..Default::default()
        });
        let ns: Vec<i64> = dangerous_high
            .iter()
            .map(|e| e.details["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![2, 3]);
    }

    #[test]
    fn query_time_bounds_are_inclusive() {
        let mut log = test_log(AuditConfig::default());
        let first = log.log_event(event("a", AuditSeverity::Info)).unwrap().timestamp;
        let second = log.log_event(event("b", AuditSeverity::Info)).unwrap().timestamp;

        let both = log.query(&AuditQuery {
            start: Some(first),
            end: Some(second),
            ..Default::default()
        });
        assert_eq!(both.len(), 2);

        let after = log.query(&AuditQuery {
            start: Some(second + chrono::Duration::seconds(1)),
            ..Default::default()
        });
        assert!(after.is_empty());
    }

    #[test]
    fn critical_events_alert_before_returning() {
        let sink = RecordingSink::default();
        let seen = sink.seen.clone();
        let mut log = test_log(AuditConfig::default()).with_alert_sink(Box::new(sink));

        log.log_event(event("tpl-1", AuditSeverity::High));
        assert!(seen.lock().unwrap().is_empty());

        log.log_event(event("tpl-2", AuditSeverity::Critical));
        let alerts = seen.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].template_id, "tpl-2");
    }

    #[test]
    fn alerting_can_be_disabled() {
        let sink = RecordingSink::default();
        let seen = sink.seen.clone();
        let mut log = test_log(AuditConfig {
            alert_on_critical: false,
            ..AuditConfig::default()
        })
        .with_alert_sink(Box::new(sink));

        log.log_event(event("tpl-1", AuditSeverity::Critical));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn stack_trace_captured_when_configured() {
        let mut log = test_log(AuditConfig {
            include_stack_trace: true,
            ..AuditConfig::default()
        });
        let entry = log.log_event(event("tpl-1", AuditSeverity::Info)).unwrap();
        assert!(entry.stack_trace.is_some());
    }

    #[test]
    fn json_export_import_preserves_integrity() {
        let mut log = test_log(AuditConfig::default());
        log.log_event(event("tpl-1", AuditSeverity::Info).with_details(json!({"z": 1, "a": [1, 2]})));
        log.log_event(event("tpl-2", AuditSeverity::Medium));

        let json = log.export_json().unwrap();
        let mut restored = test_log(AuditConfig::default());
        assert_eq!(restored.import_json(&json).unwrap(), 2);
        assert_eq!(restored.export(), log.export());
        assert!(restored.verify_integrity().valid);
    }

    #[test]
    fn float_details_survive_export_import() {
        let mut log = test_log(AuditConfig::default());
        // Values whose shortest decimal form needs all 17 significant digits.
        let floats = [0.1 + 0.2, 1.0 / 3.0, std::f64::consts::PI * 1e-7, 2.2250738585072014e-308, 123456.78901234567];
        for (i, x) in floats.iter().enumerate() {
            log.log_event(event(&format!("tpl-{}", i), AuditSeverity::Info).with_details(json!({"ratio": x, "nested": [x, -x]})));
        }
        let mut seed = 0x9e37_79b9_7f4a_7c15_u64;
        for i in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let x = (seed >> 11) as f64 / (1u64 << 53) as f64 * 1e6;
            log.log_event(event(&format!("rand-{}", i), AuditSeverity::Low).with_details(json!({"value": x})));
        }

        let json = log.export_json().unwrap();
        let mut restored = test_log(AuditConfig::default());
        restored.import_json(&json).unwrap();
        let report = restored.verify_integrity();
        assert!(report.valid, "tampered: {:?}", report.tampered);
        assert_eq!(restored.export(), log.export());
    }

    #[test]
    fn import_rejects_malformed_json() {
        let mut log = test_log(AuditConfig::default());
        assert!(matches!(
            log.import_json("{not json"),
            Err(AuditError::SerializationError(_))
        ));
    }

    #[test]
    fn stats_count_by_type_and_severity() {
        let mut log = test_log(AuditConfig::default());
        log.log_event(event("a", AuditSeverity::Info));
        log.log_event(event("b", AuditSeverity::Info));
        log.log_event(AuditEvent::new(
            AuditEventType::PathViolation,
            AuditSeverity::High,
            "c",
        ));

        let stats = log.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type["template_execution"], 2);
        assert_eq!(stats.by_type["path_violation"], 1);
        assert_eq!(stats.by_severity["info"], 2);
        assert_eq!(stats.by_severity["high"], 1);

        log.clear();
        assert_eq!(log.stats(), AuditStats::default());
    }
}
