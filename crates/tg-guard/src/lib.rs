//! # tg-guard
//!
//! Configuration and host-side composition for template-guard.
//!
//! The evaluators in `tg-policy`, `tg-command` and `tg-trust` are
//! independent and never call one another. This crate gives a host one
//! place to configure them all ([`GuardConfig`]) and a convenience fold
//! ([`SecurityContext::assess_template`]) that runs them in sequence and
//! records every finding in the tamper-evident audit log.
//!
//! ```no_run
//! use std::path::Path;
//! use tg_audit::SecretKey;
//! use tg_guard::{GuardConfig, GuardedTemplate, SecurityContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GuardConfig::load_or_default(Path::new(".template-guard/config.toml"));
//! let mut ctx = SecurityContext::new(config, SecretKey::generate()?)?;
//!
//! let template: GuardedTemplate = serde_json::from_str(r#"{"id": "hello", "steps": []}"#)?;
//! let granted = ctx.default_permission_set();
//! let assessment = ctx.assess_template(&template, &granted);
//! println!("allowed: {}", assessment.allowed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod metadata;

pub use config::{GuardConfig, PermissionConfig};
pub use context::{SecurityContext, TemplateAssessment};
pub use error::ConfigError;
pub use metadata::{GuardedTemplate, SecurityMetadata};

pub use tg_audit;
pub use tg_command;
pub use tg_policy;
pub use tg_trust;
