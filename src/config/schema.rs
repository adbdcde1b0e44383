use crate::strategy::DEFAULT_PORT;
use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Launcher data directory below the user's home.
pub const RUNELITE_DIR: &str = ".runelite";
/// Artifact repository below [`RUNELITE_DIR`].
pub const REPO_DIR: &str = "repository2";
/// Patcher state below [`RUNELITE_DIR`].
pub const BASE_DIR: &str = "runenite";
pub const RESOURCES_DIR: &str = "resources";
pub const TEMP_DIR: &str = "temp";
/// Config file name inside the base directory.
pub const CONFIG_FILE: &str = "patcher.toml";

pub const DEFAULT_KEYSTORE: &str = "signing-keystore.pem";
pub const DEFAULT_PASSPHRASE: &str = "123456";
pub const DEFAULT_ALIAS: &str = "test";

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PatcherConfig {
    pub paths: PathsConfig,
    pub signing: SigningConfig,
    pub patch: PatchSettings,
}

/// Directory overrides. Relative paths and `~/` are resolved against the
/// home directory.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub base_dir: Option<PathBuf>,
    pub repo_dir: Option<PathBuf>,
    pub resources_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    /// Bundled payloads: `resources/`, `artifacts/` and `bootstrap.json`
    pub bundle_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SigningConfig {
    /// Keystore file name inside the resources directory
    pub keystore: String,
    pub passphrase: String,
    pub alias: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            keystore: DEFAULT_KEYSTORE.to_string(),
            passphrase: DEFAULT_PASSPHRASE.to_string(),
            alias: DEFAULT_ALIAS.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PatchSettings {
    /// Port compiled into the client, replaced by the staged one
    pub default_port: u16,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
        }
    }
}

/// Concrete directories for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub base_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub resources_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub bundle_dir: Option<PathBuf>,
}

/// `<home>/.runelite/runenite`, where the config file lives by default.
pub fn default_base_dir(home: &Path) -> PathBuf {
    home.join(RUNELITE_DIR).join(BASE_DIR)
}

fn expand(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) if path.is_relative() => home.join(path),
        Err(_) => path.to_path_buf(),
    }
}

impl PatcherConfig {
    pub fn resolve(&self, home: &Path) -> ResolvedPaths {
        let paths = &self.paths;
        let base_dir = paths
            .base_dir
            .as_deref()
            .map(|p| expand(p, home))
            .unwrap_or_else(|| default_base_dir(home));

        ResolvedPaths {
            repo_dir: paths
                .repo_dir
                .as_deref()
                .map(|p| expand(p, home))
                .unwrap_or_else(|| home.join(RUNELITE_DIR).join(REPO_DIR)),
            resources_dir: paths
                .resources_dir
                .as_deref()
                .map(|p| expand(p, home))
                .unwrap_or_else(|| base_dir.join(RESOURCES_DIR)),
            temp_dir: paths
                .temp_dir
                .as_deref()
                .map(|p| expand(p, home))
                .unwrap_or_else(|| base_dir.join(TEMP_DIR)),
            bundle_dir: paths.bundle_dir.as_deref().map(|p| expand(p, home)),
            base_dir,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        let keystore = self.signing.keystore.trim();
        if keystore.is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "signing.keystore",
            });
        } else if !is_file_name(keystore) {
            issues.push(ValidationIssue::InvalidValue {
                field: "signing.keystore",
                message: format!("'{keystore}' must be a plain file name"),
            });
        }

        let alias = &self.signing.alias;
        if alias.is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "signing.alias",
            });
        } else if !alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            issues.push(ValidationIssue::InvalidValue {
                field: "signing.alias",
                message: format!("'{alias}' may only contain ASCII letters, digits, '_' and '-'"),
            });
        }

        if self.patch.default_port == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "patch.default_port",
                message: "port 0 is not a valid server port".to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn is_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField { field: &'static str },
    InvalidValue { field: &'static str, message: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid '{field}': {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let paths = PatcherConfig::default().resolve(Path::new("/home/u"));
        assert_eq!(paths.base_dir, Path::new("/home/u/.runelite/runenite"));
        assert_eq!(paths.repo_dir, Path::new("/home/u/.runelite/repository2"));
        assert_eq!(
            paths.resources_dir,
            Path::new("/home/u/.runelite/runenite/resources")
        );
        assert_eq!(paths.temp_dir, Path::new("/home/u/.runelite/runenite/temp"));
        assert_eq!(paths.bundle_dir, None);
    }

    #[test]
    fn test_overrides_follow_base_dir() {
        let mut config = PatcherConfig::default();
        config.paths.base_dir = Some(PathBuf::from("~/state"));
        config.paths.repo_dir = Some(PathBuf::from("/srv/repo"));

        let paths = config.resolve(Path::new("/home/u"));

        assert_eq!(paths.base_dir, Path::new("/home/u/state"));
        assert_eq!(paths.repo_dir, Path::new("/srv/repo"));
        assert_eq!(paths.temp_dir, Path::new("/home/u/state/temp"));
    }

    #[test]
    fn test_validate_defaults() {
        assert!(PatcherConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_issues() {
        let mut config = PatcherConfig::default();
        config.signing.keystore = "../escape.pem".to_string();
        config.signing.alias = "bad alias".to_string();
        config.patch.default_port = 0;

        let err = config.validate().unwrap_err();

        assert_eq!(err.issues.len(), 3);
        assert!(err.to_string().contains("signing.alias"));
    }
}
