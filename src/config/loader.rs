use crate::config::schema::{default_base_dir, PatcherConfig, ValidationError, CONFIG_FILE};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read patcher config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patcher config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patcher config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patcher config ({}): {}", path.display(), source),
                None => write!(f, "invalid patcher config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatcherConfig, ConfigError> {
    let config: PatcherConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatcherConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Default config location, `<home>/.runelite/runenite/patcher.toml`.
pub fn default_config_path(home: &Path) -> PathBuf {
    default_base_dir(home).join(CONFIG_FILE)
}

/// Load `explicit` if given, else the default file if it exists, else defaults.
///
/// Only an explicitly named file is required to exist.
pub fn load(explicit: Option<&Path>, home: &Path) -> Result<PatcherConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }

    let path = default_config_path(home);
    if path.is_file() {
        tracing::debug!(config = %path.display(), "loading patcher config");
        load_from_path(&path)
    } else {
        Ok(PatcherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_str_partial() {
        let config = load_from_str("[patch]\ndefault_port = 40000\n").unwrap();
        assert_eq!(config.patch.default_port, 40000);
        assert_eq!(config.signing.alias, "test");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = load_from_str("[signing]\nkeystroe = \"x.pem\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_validation_error_carries_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("patcher.toml");
        fs::write(&path, "[signing]\nalias = \"\"\n").unwrap();

        let err = load_from_path(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Validation { path: Some(_), .. }));
        assert!(err.to_string().contains("patcher.toml"));
    }

    #[test]
    fn test_load_defaults_when_absent() {
        let home = tempfile::tempdir().unwrap();
        assert_eq!(load(None, home.path()).unwrap(), PatcherConfig::default());

        let missing = home.path().join("missing.toml");
        assert!(matches!(
            load(Some(&missing), home.path()),
            Err(ConfigError::Io { .. })
        ));
    }
}
