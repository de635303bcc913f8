//! # tg-audit
//!
//! Tamper-evident audit log and keyed hashing for template-guard.
//!
//! Every evaluator decision the host cares about is recorded as an
//! [`AuditEntry`]. Each entry carries an HMAC-SHA256 `integrity` value
//! computed over a fixed projection of its fields with a process-held
//! [`SecretKey`]; [`AuditLog::verify_integrity`] reports any entry whose
//! fields no longer match.
//!
//! ## Quick Example
//!
//! ```rust
//! use tg_audit::{AuditConfig, AuditEvent, AuditEventType, AuditLog, AuditSeverity, SecretKey};
//!
//! let key = SecretKey::generate().unwrap();
//! let mut log = AuditLog::new(AuditConfig::default(), key);
//! log.log_event(
//!     AuditEvent::new(AuditEventType::DangerousCommand, AuditSeverity::High, "tpl-1")
//!         .with_details(serde_json::json!({ "command": "sudo make install" })),
//! );
//! assert!(log.verify_integrity().valid);
//! ```

pub mod entry;
pub mod error;
pub mod hasher;
pub mod log;

pub use entry::{AuditEntry, AuditEvent, AuditEventType, AuditSeverity, IntegrityProjection};
pub use error::AuditError;
pub use hasher::SecretKey;
pub use log::{
    AlertSink, AuditConfig, AuditLog, AuditQuery, AuditStats, IntegrityReport, RotationPolicy,
};
