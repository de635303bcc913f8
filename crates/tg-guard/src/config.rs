// config.rs - Layered configuration for every evaluator.
//
// Each section is optional and each field inside a section falls back to
// its own default, so a file only needs to name what it changes. Secret
// keys are never read from here.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tg_audit::AuditConfig;
use tg_command::{DetectorConfig, InjectionConfig};
use tg_policy::{FilesystemConfig, PermissionLevel, PermissionSet};
use tg_trust::{RegistryConfig, SignerConfig};

use crate::error::ConfigError;

/// Top-level configuration, typically `.template-guard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub permissions: PermissionConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub injection: InjectionConfig,

    #[serde(default)]
    pub filesystem: FilesystemConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub signer: SignerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionConfig {
    /// Level granted to templates that ask for nothing more.
    #[serde(default = "default_level")]
    pub default_level: PermissionLevel,
}

fn default_level() -> PermissionLevel {
    PermissionLevel::Standard
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            default_level: default_level(),
        }
    }
}

impl GuardConfig {
    /// Load a config file, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        // Reject unknown formats before touching the filesystem.
        if !matches!(format.as_deref(), Some("toml" | "yaml" | "yml" | "json")) {
            return Err(ConfigError::UnsupportedFormat(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = match format.as_deref() {
            Some("toml") => Self::from_toml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_yaml_str(&content)?,
        };
        tracing::debug!(path = %path.display(), "loaded template-guard config");
        Ok(config)
    }

    /// Like [`load`](Self::load), but falls back to defaults when the file
    /// is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The unrestricted permission set at the configured default level.
    pub fn default_permission_set(&self) -> PermissionSet {
        PermissionSet::for_level(self.permissions.default_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_audit::RotationPolicy;
    use tg_command::Severity;
    use tg_trust::TrustLevel;

    #[test]
    fn empty_documents_yield_defaults() {
        let from_toml = GuardConfig::from_toml_str("").unwrap();
        assert_eq!(from_toml.permissions.default_level, PermissionLevel::Standard);
        assert!(from_toml.detector.enable_detection);
        assert_eq!(from_toml.detector.block_threshold, Severity::Critical);
        assert!(from_toml.injection.enable_sanitization);
        assert!(!from_toml.injection.strict_mode);
        assert_eq!(from_toml.filesystem.allowed_extensions.len(), 25);
        assert!(!from_toml.registry.allow_untrusted);
        assert_eq!(from_toml.registry.default_trust_level, TrustLevel::Untrusted);
        assert_eq!(from_toml.audit.max_log_size, 10_000);
        assert_eq!(from_toml.audit.rotation_policy, RotationPolicy::Size);
        assert!(from_toml.audit.alert_on_critical);
        assert_eq!(from_toml.signer.cache_ttl_secs, 300);

        let from_json = GuardConfig::from_json_str("{}").unwrap();
        assert_eq!(from_json.signer, from_toml.signer);
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = GuardConfig::from_toml_str(
            r#"
[permissions]
default_level = "restricted"

[audit]
max_log_size = 50
rotation_policy = "none"

[registry]
strict_mode = true
"#,
        )
        .unwrap();
        assert_eq!(config.permissions.default_level, PermissionLevel::Restricted);
        assert_eq!(config.audit.max_log_size, 50);
        assert_eq!(config.audit.rotation_policy, RotationPolicy::None);
        assert!(config.audit.enabled);
        assert!(config.registry.strict_mode);
        assert!(!config.registry.allow_untrusted);
    }

    #[test]
    fn yaml_custom_patterns() {
        let config = GuardConfig::from_yaml_str(
            r#"
detector:
  block_threshold: high
  custom_patterns:
    - pattern: "git push --force"
      severity: high
      reason: Rewrites remote history
injection:
  strict_mode: true
"#,
        )
        .unwrap();
        assert_eq!(config.detector.block_threshold, Severity::High);
        assert_eq!(config.detector.custom_patterns.len(), 1);
        assert!(!config.detector.custom_patterns[0].regex);
        assert!(config.injection.strict_mode);
    }

    #[test]
    fn unknown_level_is_a_parse_error() {
        let err = GuardConfig::from_toml_str("[permissions]\ndefault_level = \"root\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = GuardConfig::default();
        config.filesystem.denied_paths.push("/srv/secrets".to_string());
        let text = config.to_toml_string().unwrap();
        let back = GuardConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.filesystem, config.filesystem);
    }

    #[test]
    fn default_permission_set_uses_configured_level() {
        let config = GuardConfig::from_toml_str("[permissions]\ndefault_level = \"elevated\"\n").unwrap();
        assert_eq!(config.default_permission_set().level(), PermissionLevel::Elevated);
        assert!(config.default_permission_set().restrictions().is_empty());
    }
}
