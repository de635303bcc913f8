// injection.rs - Command injection prevention.
//
// Two independent capabilities:
//   - Sanitization strips shell metacharacters from variable values before
//     they are substituted into a command.
//   - Detection flags chaining, redirection and substitution syntax in a
//     string without modifying it.
//
// `process_command` interpolates first and detects second, so risky syntax
// in the template text itself is still reported when every variable was
// sanitized.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Characters removed by `sanitize_variable`.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>', '\\', '\n', '\r',
];

const CHAINING_OPERATORS: &[&str] = &["&&", "||", ";", "|"];
const REDIRECTION_OPERATORS: &[&str] = &["<", ">"];
const SUBSTITUTION_SYNTAX: &[&str] = &["$(", "`", "${", "<(", ">("];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]*)\}").expect("invalid placeholder pattern"));

pub const ISSUE_CHAINING: &str = "command chaining";
pub const ISSUE_REDIRECTION: &str = "redirection";
pub const ISSUE_SUBSTITUTION: &str = "command substitution";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InjectionConfig {
    #[serde(default = "default_true")]
    pub enable_sanitization: bool,

    #[serde(default = "default_true")]
    pub enable_detection: bool,

    /// Reduce sanitized values to alphanumerics, whitespace, `.`, `_` and `-`.
    #[serde(default)]
    pub strict_mode: bool,
}

fn default_true() -> bool {
    true
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enable_sanitization: true,
            enable_detection: true,
            strict_mode: false,
        }
    }
}

/// Outcome of `detect_injection`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InjectionReport {
    pub detected: bool,
    /// Human-readable category labels, in check order.
    pub issues: Vec<String>,
}

/// Outcome of `process_command`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessedCommand {
    /// The fully interpolated command.
    pub command: String,
    pub safe: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InjectionPreventer {
    config: InjectionConfig,
}

impl InjectionPreventer {
    pub fn new(config: InjectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InjectionConfig {
        &self.config
    }

    // ── Sanitization ──

    pub fn sanitize_variable(&self, value: &str) -> String {
        if !self.config.enable_sanitization {
            return value.to_string();
        }
        let stripped = value.chars().filter(|c| !SHELL_METACHARACTERS.contains(c));
        if self.config.strict_mode {
            stripped
                .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '.' | '_' | '-'))
                .collect()
        } else {
            stripped.collect()
        }
    }

    // ── Detection ──

    pub fn detect_command_chaining(&self, input: &str) -> bool {
        CHAINING_OPERATORS.iter().any(|op| input.contains(op))
    }

    pub fn detect_redirection(&self, input: &str) -> bool {
        REDIRECTION_OPERATORS.iter().any(|op| input.contains(op))
    }

    pub fn detect_process_substitution(&self, input: &str) -> bool {
        SUBSTITUTION_SYNTAX.iter().any(|op| input.contains(op))
    }

    /// Runs every check. Reports nothing when detection is disabled.
    pub fn detect_injection(&self, input: &str) -> InjectionReport {
        if !self.config.enable_detection {
            return InjectionReport::default();
        }

        let mut issues = Vec::new();
        if self.detect_command_chaining(input) {
            issues.push(ISSUE_CHAINING.to_string());
        }
        if self.detect_redirection(input) {
            issues.push(ISSUE_REDIRECTION.to_string());
        }
        if self.detect_process_substitution(input) {
            issues.push(ISSUE_SUBSTITUTION.to_string());
        }

        InjectionReport {
            detected: !issues.is_empty(),
            issues,
        }
    }

    // ── Interpolation ──

    /// Replaces each `${key}` with the sanitized value of `key`.
    /// Placeholders without a matching variable are left as written.
    pub fn safe_interpolate(&self, template: &str, variables: &HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
                Some(value) => self.sanitize_variable(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    pub fn process_command(&self, template: &str, variables: &HashMap<String, String>) -> ProcessedCommand {
        let command = self.safe_interpolate(template, variables);
        let report = self.detect_injection(&command);
        if report.detected {
            tracing::info!(issues = ?report.issues, "possible command injection");
        }
        ProcessedCommand {
            command,
            safe: !report.detected,
            issues: report.issues,
        }
    }
}
