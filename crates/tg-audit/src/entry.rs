// entry.rs - Audit entry data model.
//
// An `AuditEvent` is what the host hands to the log; an `AuditEntry` is what
// the log stores. The entry adds who/when/where context and an integrity
// value keyed over a fixed projection of its fields. Entries hold the
// template id by value so the log outlives any loaded template.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// What kind of decision or action an entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A template was loaded and assessed.
    TemplateLoad,
    /// A template (or one of its steps) was executed.
    TemplateExecution,
    /// A permission check was performed.
    PermissionCheck,
    /// A permission check denied an operation.
    PermissionDenied,
    /// The dangerous command detector reported a match.
    DangerousCommand,
    /// The injection preventer flagged a command.
    InjectionAttempt,
    /// The filesystem restrictor rejected a path.
    PathViolation,
    /// A template signature was verified (either outcome).
    SignatureVerification,
    /// Publisher trust was evaluated or changed.
    PublisherTrust,
    /// Any other policy violation.
    SecurityViolation,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::TemplateLoad => "template_load",
            AuditEventType::TemplateExecution => "template_execution",
            AuditEventType::PermissionCheck => "permission_check",
            AuditEventType::PermissionDenied => "permission_denied",
            AuditEventType::DangerousCommand => "dangerous_command",
            AuditEventType::InjectionAttempt => "injection_attempt",
            AuditEventType::PathViolation => "path_violation",
            AuditEventType::SignatureVerification => "signature_verification",
            AuditEventType::PublisherTrust => "publisher_trust",
            AuditEventType::SecurityViolation => "security_violation",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious an audited event is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Low => "low",
            AuditSeverity::Medium => "medium",
            AuditSeverity::High => "high",
            AuditSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditSeverity {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AuditSeverity::Info),
            "low" => Ok(AuditSeverity::Low),
            "medium" => Ok(AuditSeverity::Medium),
            "high" => Ok(AuditSeverity::High),
            "critical" => Ok(AuditSeverity::Critical),
            other => Err(AuditError::UnknownSeverity(other.to_string())),
        }
    }
}

/// An event submitted to [`AuditLog::log_event`](crate::AuditLog::log_event).
///
/// Builder style, like:
///   `AuditEvent::new(DangerousCommand, High, "tpl-1").with_details(json)`
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub template_id: String,
    pub template_version: String,
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        severity: AuditSeverity,
        template_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            severity,
            template_id: template_id.into(),
            template_version: String::new(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.template_version = version.into();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// One recorded entry. Immutable once logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub template_id: String,
    #[serde(default)]
    pub template_version: String,
    pub user: String,
    pub pid: u32,
    #[serde(default)]
    pub details: serde_json::Value,
    /// Keyed hash over [`IntegrityProjection`].
    pub integrity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl AuditEntry {
    /// The exact fields, in the exact order, covered by `integrity`.
    pub fn projection(&self) -> IntegrityProjection<'_> {
        IntegrityProjection {
            timestamp: &self.timestamp,
            event_type: self.event_type,
            severity: self.severity,
            template_id: &self.template_id,
            template_version: &self.template_version,
            user: &self.user,
            pid: self.pid,
            details: &self.details,
        }
    }
}

/// Canonical hash input for an entry. `integrity` and `stack_trace` are
/// never part of it. Field order here is the serialization order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityProjection<'a> {
    pub timestamp: &'a DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub template_id: &'a str,
    pub template_version: &'a str,
    pub user: &'a str,
    pub pid: u32,
    pub details: &'a serde_json::Value,
}

impl IntegrityProjection<'_> {
    /// Canonical bytes for hashing. Stable across JSON export/import since
    /// `details` keeps its key order through a round trip.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Serializing a struct of plain fields and a `Value` cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_entry() -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            event_type: AuditEventType::DangerousCommand,
            severity: AuditSeverity::High,
            template_id: "tpl-1".to_string(),
            template_version: "1.0.0".to_string(),
            user: "alice".to_string(),
            pid: 42,
            details: json!({"command": "rm -rf /tmp/x"}),
            integrity: "abc".to_string(),
            stack_trace: None,
        }
    }

    #[test]
    fn entry_uses_camel_case_wire_names() {
        let json = serde_json::to_value(sample_entry()).unwrap();
        assert_eq!(json["type"], "dangerous_command");
        assert_eq!(json["templateId"], "tpl-1");
        assert_eq!(json["templateVersion"], "1.0.0");
        assert!(json.get("stackTrace").is_none());
    }

    #[test]
    fn projection_excludes_integrity_and_stack_trace() {
        let mut entry = sample_entry();
        let before = entry.projection().canonical_bytes();
        entry.integrity = "changed".to_string();
        entry.stack_trace = Some("trace".to_string());
        assert_eq!(before, entry.projection().canonical_bytes());
    }

    #[test]
    fn projection_field_order_is_fixed() {
        let entry = sample_entry();
        let text = String::from_utf8(entry.projection().canonical_bytes()).unwrap();
        let order = [
            "\"timestamp\"",
            "\"type\"",
            "\"severity\"",
            "\"templateId\"",
            "\"templateVersion\"",
            "\"user\"",
            "\"pid\"",
            "\"details\"",
        ];
        let positions: Vec<usize> = order.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn severity_parses_and_orders() {
        assert_eq!("critical".parse::<AuditSeverity>().unwrap(), AuditSeverity::Critical);
        assert!(matches!(
            "fatal".parse::<AuditSeverity>(),
            Err(AuditError::UnknownSeverity(name)) if name == "fatal"
        ));
        assert!(AuditSeverity::Info < AuditSeverity::Critical);
    }
}
