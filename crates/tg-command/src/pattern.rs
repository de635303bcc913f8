// pattern.rs - The dangerous command pattern library.
//
// A pattern is either a literal substring (case-sensitive) or a compiled
// regex. Each carries a severity, a category, a human-readable reason and
// an optional remediation hint. The built-in library is compiled once;
// custom patterns are appended after it and never replace it.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CommandError;

/// Risk level of a pattern match. Ordered lowest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(CommandError::UnknownName {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

/// Which family of risk a pattern belongs to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Destructive,
    Privilege,
    Permissions,
    Process,
    Network,
    Evaluation,
    Metacharacters,
    #[default]
    Custom,
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatternCategory::Destructive => "destructive",
            PatternCategory::Privilege => "privilege",
            PatternCategory::Permissions => "permissions",
            PatternCategory::Process => "process",
            PatternCategory::Network => "network",
            PatternCategory::Evaluation => "evaluation",
            PatternCategory::Metacharacters => "metacharacters",
            PatternCategory::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// How a pattern is matched.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Case-sensitive substring.
    Literal(String),
    /// Regular expression, tested anywhere in the command.
    Regex(Regex),
}

impl Pattern {
    pub fn literal(text: impl Into<String>) -> Self {
        Pattern::Literal(text.into())
    }

    pub fn regex(source: &str) -> Result<Self, CommandError> {
        Regex::new(source)
            .map(Pattern::Regex)
            .map_err(|source_err| CommandError::InvalidPattern {
                pattern: source.to_string(),
                source: source_err,
            })
    }

    pub fn is_match(&self, command: &str) -> bool {
        match self {
            Pattern::Literal(text) => command.contains(text.as_str()),
            Pattern::Regex(re) => re.is_match(command),
        }
    }

    /// The literal text or the regex source, used to identify the pattern in reports.
    pub fn source(&self) -> &str {
        match self {
            Pattern::Literal(text) => text,
            Pattern::Regex(re) => re.as_str(),
        }
    }
}

/// One entry of the pattern library.
#[derive(Debug, Clone)]
pub struct DangerousPattern {
    pub pattern: Pattern,
    pub severity: Severity,
    pub category: PatternCategory,
    pub reason: String,
    pub suggestion: Option<String>,
}

/// Serializable description of a custom pattern, as found in config files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternSpec {
    pub pattern: String,
    /// Treat `pattern` as a regex rather than a literal substring.
    #[serde(default)]
    pub regex: bool,
    pub severity: Severity,
    pub reason: String,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub category: PatternCategory,
}

impl PatternSpec {
    pub fn compile(&self) -> Result<DangerousPattern, CommandError> {
        let pattern = if self.regex {
            Pattern::regex(&self.pattern)?
        } else {
            Pattern::literal(&self.pattern)
        };
        Ok(DangerousPattern {
            pattern,
            severity: self.severity,
            category: self.category,
            reason: self.reason.clone(),
            suggestion: self.suggestion.clone(),
        })
    }
}

fn builtin(
    pattern: Pattern,
    severity: Severity,
    category: PatternCategory,
    reason: &str,
    suggestion: Option<&str>,
) -> DangerousPattern {
    DangerousPattern {
        pattern,
        severity,
        category,
        reason: reason.to_string(),
        suggestion: suggestion.map(str::to_string),
    }
}

fn re(source: &str) -> Pattern {
    Pattern::Regex(Regex::new(source).expect("invalid built-in dangerous command pattern"))
}

/// The built-in library, compiled once per process.
pub static DEFAULT_PATTERNS: LazyLock<Vec<DangerousPattern>> = LazyLock::new(|| {
    use PatternCategory::*;
    use Severity::*;

    vec![
        // ── Destructive ──
        builtin(
            re(r"\brm\s+-[a-zA-Z]*[rR][a-zA-Z]*\s+/\*?(\s|$)"),
            Critical,
            Destructive,
            "Recursive deletion of the root directory",
            Some("Never delete the root directory; target a specific path instead"),
        ),
        builtin(
            re(r"\b(rm|rmdir|del)\s+"),
            High,
            Destructive,
            "Deletes files or directories",
            Some("Double-check the target path, or move files to a backup location instead"),
        ),
        builtin(
            re(r"\bformat\s+[a-zA-Z]:|\bmkfs(\.[a-z0-9]+)?\b"),
            Critical,
            Destructive,
            "Formats a disk or filesystem",
            Some("Disk formatting should never be part of a template"),
        ),
        // ── Privilege ──
        builtin(
            re(r"\b(sudo|su|runas|doas)\b"),
            High,
            Privilege,
            "Runs a command with elevated privileges",
            Some("Run without elevated privileges, or document why they are required"),
        ),
        // ── Permissions ──
        builtin(
            re(r"\b(chmod|chown|chgrp)\b"),
            Medium,
            Permissions,
            "Changes file permissions or ownership",
            Some("Limit permission changes to files the template creates"),
        ),
        builtin(
            re(r"\b(icacls|takeown)\b"),
            Medium,
            Permissions,
            "Changes Windows file permissions or ownership",
            Some("Limit permission changes to files the template creates"),
        ),
        // ── Process ──
        builtin(
            re(r"\b(kill|killall|taskkill|pkill)\b"),
            Medium,
            Process,
            "Terminates running processes",
            Some("Avoid terminating processes the template did not start"),
        ),
        // ── Network ──
        builtin(
            re(r"\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(sh|bash|zsh|ksh|dash|fish)\b"),
            Critical,
            Network,
            "Pipes downloaded content directly into a shell",
            Some("Download to a file, verify its checksum, then execute it"),
        ),
        builtin(
            re(r"\b(curl|wget|nc|netcat|telnet|ssh|ftp)\b"),
            High,
            Network,
            "Performs network access",
            Some("Declare network access in the template's permissions"),
        ),
        // ── Evaluation ──
        builtin(
            re(r"\b(eval|exec)\b"),
            Critical,
            Evaluation,
            "Evaluates dynamically constructed code",
            Some("Invoke the intended command directly instead of evaluating a string"),
        ),
        builtin(
            re(r"(^|[;&|]\s*)(source|\.)\s+\S"),
            Medium,
            Evaluation,
            "Sources a script into the current shell",
            Some("Review the sourced script, or run it as a separate process"),
        ),
        // ── Metacharacters ──
        builtin(
            Pattern::literal("&&"),
            Low,
            Metacharacters,
            "Chains commands with '&&'",
            Some("Split chained commands into separate steps"),
        ),
        builtin(
            Pattern::literal("||"),
            Low,
            Metacharacters,
            "Chains commands with '||'",
            Some("Split chained commands into separate steps"),
        ),
        builtin(
            Pattern::literal(";"),
            Low,
            Metacharacters,
            "Chains commands with ';'",
            Some("Split chained commands into separate steps"),
        ),
        builtin(
            Pattern::literal("$("),
            Medium,
            Metacharacters,
            "Uses command substitution '$(...)'",
            Some("Compute the value in a separate step and pass it as a variable"),
        ),
        builtin(
            Pattern::literal("`"),
            Medium,
            Metacharacters,
            "Uses backtick command substitution",
            Some("Compute the value in a separate step and pass it as a variable"),
        ),
        builtin(
            re(r"2>&1|&>|>>|>|<"),
            Low,
            Metacharacters,
            "Redirects command input or output",
            Some("Make file reads and writes explicit steps so their paths can be validated"),
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match_is_case_sensitive_substring() {
        let p = Pattern::literal("&&");
        assert!(p.is_match("make && make install"));
        assert!(!p.is_match("make & make"));

        let p = Pattern::literal("DROP");
        assert!(!p.is_match("drop table"));
    }

    #[test]
    fn source_reports_literal_text_or_regex_source() {
        assert_eq!(Pattern::literal("$(").source(), "$(");
        assert_eq!(Pattern::regex(r"\bsudo\b").unwrap().source(), r"\bsudo\b");
    }

    #[test]
    fn invalid_regex_is_an_error() {
        let err = Pattern::regex("(unclosed").unwrap_err();
        assert!(matches!(err, CommandError::InvalidPattern { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn builtin_library_covers_every_category() {
        for category in [
            PatternCategory::Destructive,
            PatternCategory::Privilege,
            PatternCategory::Permissions,
            PatternCategory::Process,
            PatternCategory::Network,
            PatternCategory::Evaluation,
            PatternCategory::Metacharacters,
        ] {
            assert!(
                DEFAULT_PATTERNS.iter().any(|p| p.category == category),
                "no pattern for {}",
                category
            );
        }
        assert!(!DEFAULT_PATTERNS.iter().any(|p| p.category == PatternCategory::Custom));
    }

    #[test]
    fn pattern_spec_compiles_literal_and_regex() {
        let spec: PatternSpec = serde_json::from_str(
            r#"{"pattern": "docker\\s+rm", "regex": true, "severity": "high", "reason": "Removes containers"}"#,
        )
        .unwrap();
        let compiled = spec.compile().unwrap();
        assert!(compiled.pattern.is_match("docker  rm abc"));
        assert_eq!(compiled.category, PatternCategory::Custom);

        let literal = PatternSpec {
            pattern: "git push --force".to_string(),
            regex: false,
            severity: Severity::High,
            reason: "Rewrites remote history".to_string(),
            suggestion: None,
            category: PatternCategory::Destructive,
        }
        .compile()
        .unwrap();
        assert!(matches!(literal.pattern, Pattern::Literal(_)));
    }

    #[test]
    fn severity_orders_and_parses() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!("medium".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("severe".parse::<Severity>().is_err());
    }
}
