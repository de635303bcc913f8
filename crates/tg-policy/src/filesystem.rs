// filesystem.rs - Path validation for template file operations.
//
// `validate_path` runs a fixed pipeline and stops at the first failure, so
// the order below is also the order in which reasons are reported:
//
// 1. Traversal: ".." anywhere in the raw input (unless allowed)
// 2. Normalize to an absolute, lexically cleaned path
// 3. System paths (/etc, /sys, /proc, /boot, /dev, /root, Windows dirs)
// 4. Configured denied paths
// 5. Configured allowed paths (default-deny once any are configured)
// 6. Allowed file extensions (paths without an extension pass)
// 7. Writes only: no hidden files (leading '.')
//
// Prefix checks compare whole path components after normalizing and
// lowercasing both sides, so "/etcetera" is not inside "/etc".

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

const UNIX_SYSTEM_PATHS: &[&str] = &["/etc", "/sys", "/proc", "/boot", "/dev", "/root"];

const WINDOWS_SYSTEM_PATHS: &[&str] = &[
    "C:\\Windows",
    "C:\\Program Files",
    "C:\\Program Files (x86)",
    "C:\\ProgramData",
];

/// Which kind of access is being validated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Read,
    Write,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOperation::Read => write!(f, "read"),
            FileOperation::Write => write!(f, "write"),
        }
    }
}

/// Why a path was rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathViolation {
    Traversal,
    SystemPath,
    DeniedPath,
    OutsideAllowedPaths,
    DisallowedExtension,
    HiddenFile,
}

/// Result of [`FilesystemRestrictor::validate_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<PathViolation>,
    /// The normalized path, once normalization has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<PathBuf>,
}

impl PathValidation {
    fn ok(normalized: PathBuf) -> Self {
        Self {
            valid: true,
            reason: None,
            violation: None,
            normalized: Some(normalized),
        }
    }

    fn reject(violation: PathViolation, reason: String, normalized: Option<PathBuf>) -> Self {
        tracing::debug!(?violation, %reason, "path rejected");
        Self {
            valid: false,
            reason: Some(reason),
            violation: Some(violation),
            normalized,
        }
    }
}

/// Filesystem restrictor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilesystemConfig {
    /// When non-empty, only paths under one of these are accepted.
    #[serde(default)]
    pub allowed_paths: Vec<String>,

    #[serde(default)]
    pub denied_paths: Vec<String>,

    /// Extensions without the leading dot, matched case-insensitively.
    /// Empty means any extension is accepted.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default)]
    pub allow_path_traversal: bool,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            allowed_paths: Vec::new(),
            denied_paths: Vec::new(),
            allowed_extensions: default_allowed_extensions(),
            allow_path_traversal: false,
        }
    }
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "txt", "md", "json", "yaml", "yml", "toml", "js", "ts", "jsx", "tsx", "py", "rs", "go",
        "java", "html", "css", "sh", "xml", "csv", "ini", "cfg", "conf", "env", "lock", "log",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Validates file paths against system, deny, allow and extension rules.
#[derive(Debug, Clone)]
pub struct FilesystemRestrictor {
    config: FilesystemConfig,
    system_paths: Vec<(String, PathBuf)>,
    denied: Vec<(String, PathBuf)>,
    allowed: Vec<(String, PathBuf)>,
    extensions: BTreeSet<String>,
}

impl FilesystemRestrictor {
    pub fn new(config: FilesystemConfig) -> Self {
        let mut system: Vec<&str> = UNIX_SYSTEM_PATHS.to_vec();
        if cfg!(windows) {
            system.extend_from_slice(WINDOWS_SYSTEM_PATHS);
        }

        let system_paths = prepare_prefixes(system.into_iter());
        let denied = prepare_prefixes(config.denied_paths.iter().map(String::as_str));
        let allowed = prepare_prefixes(config.allowed_paths.iter().map(String::as_str));
        let extensions = config
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();

        Self {
            config,
            system_paths,
            denied,
            allowed,
            extensions,
        }
    }

    pub fn config(&self) -> &FilesystemConfig {
        &self.config
    }

    /// Run the validation pipeline for one path.
    pub fn validate_path(&self, path: &str, operation: FileOperation) -> PathValidation {
        // 1. Traversal on the raw input, before anything can hide it.
        if !self.config.allow_path_traversal && path.contains("..") {
            return PathValidation::reject(
                PathViolation::Traversal,
                format!("path traversal detected in '{}'", path),
                None,
            );
        }

        // 2. Normalize.
        let normalized = normalize_path(path);
        let key = lowercase_path(&normalized);

        // 3. System paths.
        if let Some((name, _)) = self.system_paths.iter().find(|(_, p)| key.starts_with(p)) {
            return PathValidation::reject(
                PathViolation::SystemPath,
                format!("access to system path '{}' is not allowed", name),
                Some(normalized),
            );
        }

        // 4. Denied paths.
        if let Some((name, _)) = self.denied.iter().find(|(_, p)| key.starts_with(p)) {
            return PathValidation::reject(
                PathViolation::DeniedPath,
                format!("path is inside denied path '{}'", name),
                Some(normalized),
            );
        }

        // 5. Allowed paths.
        if !self.allowed.is_empty() && !self.allowed.iter().any(|(_, p)| key.starts_with(p)) {
            return PathValidation::reject(
                PathViolation::OutsideAllowedPaths,
                format!("path '{}' is outside the allowed paths", normalized.display()),
                Some(normalized),
            );
        }

        // 6. Extensions.
        if let Some(ext) = normalized.extension() {
            let ext = ext.to_string_lossy().to_lowercase();
            if !self.extensions.is_empty() && !self.extensions.contains(&ext) {
                return PathValidation::reject(
                    PathViolation::DisallowedExtension,
                    format!("file extension '.{}' is not allowed", ext),
                    Some(normalized),
                );
            }
        }

        // 7. Hidden files, writes only.
        if operation == FileOperation::Write {
            let hidden = normalized
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if hidden {
                return PathValidation::reject(
                    PathViolation::HiddenFile,
                    "writing hidden files is not allowed".to_string(),
                    Some(normalized),
                );
            }
        }

        PathValidation::ok(normalized)
    }

    pub fn validate_read(&self, path: &str) -> PathValidation {
        self.validate_path(path, FileOperation::Read)
    }

    pub fn validate_write(&self, path: &str) -> PathValidation {
        self.validate_path(path, FileOperation::Write)
    }

    /// Validate several paths, preserving input order.
    pub fn validate_all<'a, I>(&self, paths: I, operation: FileOperation) -> Vec<PathValidation>
    where
        I: IntoIterator<Item = &'a str>,
    {
        paths
            .into_iter()
            .map(|p| self.validate_path(p, operation))
            .collect()
    }
}

impl Default for FilesystemRestrictor {
    fn default() -> Self {
        Self::new(FilesystemConfig::default())
    }
}

fn prepare_prefixes<'a>(paths: impl Iterator<Item = &'a str>) -> Vec<(String, PathBuf)> {
    paths
        .map(|p| (p.to_string(), lowercase_path(&normalize_path(p))))
        .collect()
}

/// Make `path` absolute against the current directory and resolve `.`/`..`
/// lexically. If the current directory is unavailable the original path is
/// used as given.
pub fn normalize_path(path: &str) -> PathBuf {
    let raw = Path::new(path);
    let absolute = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(raw),
            Err(e) => {
                tracing::warn!(path, "cannot resolve current directory, using path as given: {}", e);
                return raw.to_path_buf();
            }
        }
    };
    lexical_normalize(&absolute)
}

/// Remove `.` and resolve `..` without touching the filesystem. `..` never
/// climbs above the root.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            other => components.push(other),
        }
    }
    components.iter().collect()
}

fn lowercase_path(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}
