pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load, load_from_path, load_from_str, ConfigError};
pub use schema::{
    PatchSettings, PatcherConfig, PathsConfig, ResolvedPaths, SigningConfig, ValidationError,
    ValidationIssue,
};
