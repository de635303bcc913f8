//! # tg-command
//!
//! Shell command analysis for template-guard.
//!
//! - [`DangerousCommandDetector`] classifies commands against a categorized
//!   pattern library and reports every pattern that fires.
//! - [`InjectionPreventer`] sanitizes variable values and detects chaining,
//!   redirection and substitution syntax in composed commands.
//!
//! Both are pure evaluators: they return findings and leave the decision
//! (block, confirm, audit) to the caller.
//!
//! ```
//! use tg_command::{DangerousCommandDetector, Severity};
//!
//! let detector = DangerousCommandDetector::default();
//! let matches = detector.scan_command("sudo rm -rf /", "cmd-0");
//! assert_eq!(
//!     DangerousCommandDetector::highest_severity(&matches),
//!     Some(Severity::Critical)
//! );
//! assert!(detector.should_block(&matches));
//! ```

pub mod detector;
pub mod error;
pub mod injection;
pub mod pattern;
pub mod template;

pub use detector::{DangerousCommandDetector, DangerousCommandMatch, DetectorConfig};
pub use error::CommandError;
pub use injection::{InjectionConfig, InjectionPreventer, InjectionReport, ProcessedCommand};
pub use pattern::{DangerousPattern, Pattern, PatternCategory, PatternSpec, Severity, DEFAULT_PATTERNS};
pub use template::{Template, TemplateStep};
