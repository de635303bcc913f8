// detector.rs - Dangerous command detector.
//
// Scans shell commands against the pattern library. Every pattern is
// tested against every command; a single command routinely produces
// several matches across categories. Matches are returned to the caller
// and never recorded here.

use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::pattern::{DangerousPattern, PatternCategory, PatternSpec, Severity, DEFAULT_PATTERNS};
use crate::template::Template;

// ── Configuration ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectorConfig {
    /// When false, every scan returns no matches.
    #[serde(default = "default_true")]
    pub enable_detection: bool,

    /// Patterns appended after the built-in library.
    #[serde(default)]
    pub custom_patterns: Vec<PatternSpec>,

    /// `should_block` fires for matches at or above this severity.
    #[serde(default = "default_block_threshold")]
    pub block_threshold: Severity,
}

fn default_true() -> bool {
    true
}

fn default_block_threshold() -> Severity {
    Severity::Critical
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enable_detection: true,
            custom_patterns: Vec::new(),
            block_threshold: default_block_threshold(),
        }
    }
}

// ── Matches ──

/// One pattern that fired against one command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DangerousCommandMatch {
    pub command_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Literal text or regex source of the pattern that fired.
    pub pattern: String,
    pub severity: Severity,
    pub category: PatternCategory,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

// ── Detector ──

#[derive(Debug, Clone)]
pub struct DangerousCommandDetector {
    config: DetectorConfig,
    patterns: Vec<DangerousPattern>,
}

impl DangerousCommandDetector {
    /// Builds the detector, compiling any custom patterns from the config.
    pub fn new(config: DetectorConfig) -> Result<Self, CommandError> {
        let mut patterns = DEFAULT_PATTERNS.to_vec();
        for spec in &config.custom_patterns {
            patterns.push(spec.compile()?);
        }
        tracing::debug!(
            patterns = patterns.len(),
            custom = config.custom_patterns.len(),
            "dangerous command detector ready"
        );
        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn patterns(&self) -> &[DangerousPattern] {
        &self.patterns
    }

    pub fn patterns_in(&self, category: PatternCategory) -> Vec<&DangerousPattern> {
        self.patterns
            .iter()
            .filter(|p| p.category == category)
            .collect()
    }

    /// Appends a pattern. Built-in patterns are never replaced.
    pub fn add_pattern(&mut self, pattern: DangerousPattern) {
        self.patterns.push(pattern);
    }

    pub fn scan_command(&self, command: &str, command_id: &str) -> Vec<DangerousCommandMatch> {
        self.scan(command, command_id, None)
    }

    /// Scans every command of every step. Steps or templates without
    /// commands contribute nothing.
    pub fn scan_template(&self, template: &Template) -> Vec<DangerousCommandMatch> {
        if !self.config.enable_detection {
            return Vec::new();
        }
        let Some(steps) = &template.steps else {
            return Vec::new();
        };

        let mut matches = Vec::new();
        for (step_index, step) in steps.iter().enumerate() {
            let Some(commands) = &step.commands else {
                continue;
            };
            let step_id = format!("step-{}", step_index);
            for (cmd_index, command) in commands.iter().enumerate() {
                let command_id = format!("{}-cmd-{}", step_id, cmd_index);
                matches.extend(self.scan(command, &command_id, Some(&step_id)));
            }
        }

        if !matches.is_empty() {
            tracing::info!(
                template_id = %template.id,
                matches = matches.len(),
                highest = ?Self::highest_severity(&matches),
                "dangerous commands found in template"
            );
        }
        matches
    }

    fn scan(&self, command: &str, command_id: &str, step_id: Option<&str>) -> Vec<DangerousCommandMatch> {
        if !self.config.enable_detection {
            return Vec::new();
        }
        let matches: Vec<DangerousCommandMatch> = self
            .patterns
            .iter()
            .filter(|p| p.pattern.is_match(command))
            .map(|p| DangerousCommandMatch {
                command_id: command_id.to_string(),
                step_id: step_id.map(str::to_string),
                pattern: p.pattern.source().to_string(),
                severity: p.severity,
                category: p.category,
                reason: p.reason.clone(),
                suggestion: p.suggestion.clone(),
            })
            .collect();

        if !matches.is_empty() {
            tracing::debug!(command_id, matches = matches.len(), "command matched dangerous patterns");
        }
        matches
    }

    pub fn highest_severity(matches: &[DangerousCommandMatch]) -> Option<Severity> {
        matches.iter().map(|m| m.severity).max()
    }

    /// True iff any match reaches the configured block threshold.
    pub fn should_block(&self, matches: &[DangerousCommandMatch]) -> bool {
        matches
            .iter()
            .any(|m| m.severity >= self.config.block_threshold)
    }
}

impl Default for DangerousCommandDetector {
    fn default() -> Self {
        Self {
            config: DetectorConfig::default(),
            patterns: DEFAULT_PATTERNS.to_vec(),
        }
    }
}
