//! Binary patch strategies.
//!
//! Each strategy pairs an applicability predicate over an artifact's logical
//! name with an operation over the exploded archive. The set is closed and
//! its order is significant, so it is an enum rather than a trait object.

mod api_additions;
mod client_files;
mod loopback;
mod modulus;
mod port;

pub use api_additions::ApiAdditionsPatch;
pub use client_files::{ClientFilesPatch, FileOutcome};
pub use loopback::{LoopbackPatch, LOOPBACK_PATTERN};
pub use modulus::{rewrite_modulus, ModulusPatch, MODULUS_HEX_LEN, MODULUS_MARKER};
pub use port::{encode_port, PortPatch, DEFAULT_PORT};

use crate::bytes::FramingError;
use crate::edit::EditError;
use crate::key::KeyError;
use crate::staging::ResourceLayout;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const INJECTED_CLIENT_PREFIX: &str = "injected-client-";
pub const CLIENT_PREFIX: &str = "client-";
pub const API_PREFIX: &str = "runelite-api-";

/// Non-fatal result of a strategy run. Fatal conditions are [`PatchError`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for applied/already-applied"]
pub enum PatchResult {
    /// Files rewritten, relative to the working directory
    Applied { files: Vec<PathBuf> },
    /// Nothing left to change
    AlreadyApplied { files: Vec<PathBuf> },
    /// Strategy ran but found nothing it was allowed to change
    Skipped { reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { files } => write!(f, "applied to {} file(s)", files.len()),
            PatchResult::AlreadyApplied { files } if files.is_empty() => {
                write!(f, "already applied")
            }
            PatchResult::AlreadyApplied { files } => {
                write!(f, "already applied to {} file(s)", files.len())
            }
            PatchResult::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("pattern not found: {pattern}")]
    PatternNotFound { pattern: String },

    #[error("value at offset {offset} of {file} continues past its expected end")]
    AmbiguousBoundary { file: PathBuf, offset: usize },

    #[error("replacement of {replacement} bytes does not fit the {capacity}-byte value in {file}")]
    CapacityViolation {
        file: PathBuf,
        capacity: usize,
        replacement: usize,
    },

    #[error("malformed length prefix at offset {offset} of {file}: {detail}")]
    MalformedPrefix {
        file: PathBuf,
        offset: usize,
        detail: String,
    },

    #[error("replacement key unusable: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("invalid port {value:?} in {path}")]
    InvalidPort { path: PathBuf, value: String },

    #[error("cannot rewrite {file}: {source}")]
    Framing { file: PathBuf, source: FramingError },

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PatchError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        PatchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Modulus(ModulusPatch),
    Loopback(LoopbackPatch),
    Port(PortPatch),
    ClientFiles(ClientFilesPatch),
    ApiAdditions(ApiAdditionsPatch),
}

impl Strategy {
    /// The full strategy list, in application order.
    pub fn standard_set(layout: &ResourceLayout, default_port: u16) -> Vec<Strategy> {
        vec![
            Strategy::Modulus(ModulusPatch::new(layout.key_file())),
            Strategy::Loopback(LoopbackPatch),
            Strategy::Port(PortPatch::new(layout.port_file(), default_port)),
            Strategy::ClientFiles(ClientFilesPatch::new(layout.client_dir())),
            Strategy::ApiAdditions(ApiAdditionsPatch::new(layout.api_dir())),
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Modulus(_) => "modulus",
            Strategy::Loopback(_) => "loopback",
            Strategy::Port(_) => "port",
            Strategy::ClientFiles(_) => "client-files",
            Strategy::ApiAdditions(_) => "api-additions",
        }
    }

    /// Whether this strategy patches the artifact with `logical_name`.
    ///
    /// Strategies driven by staged resources only apply once those resources
    /// exist.
    pub fn applies_to(&self, logical_name: &str) -> bool {
        match self {
            Strategy::Modulus(patch) => {
                logical_name.starts_with(INJECTED_CLIENT_PREFIX) && patch.key_file().is_file()
            }
            Strategy::Loopback(_) => logical_name.starts_with(INJECTED_CLIENT_PREFIX),
            Strategy::Port(patch) => {
                logical_name.starts_with(INJECTED_CLIENT_PREFIX) && patch.port_file().is_file()
            }
            Strategy::ClientFiles(patch) => {
                logical_name.starts_with(CLIENT_PREFIX) && patch.patch_dir().is_dir()
            }
            Strategy::ApiAdditions(patch) => {
                logical_name.starts_with(API_PREFIX) && patch.patch_dir().is_dir()
            }
        }
    }

    pub fn apply(&self, workdir: &Path) -> Result<PatchResult, PatchError> {
        match self {
            Strategy::Modulus(patch) => patch.apply(workdir),
            Strategy::Loopback(patch) => patch.apply(workdir),
            Strategy::Port(patch) => patch.apply(workdir),
            Strategy::ClientFiles(patch) => patch.apply(workdir),
            Strategy::ApiAdditions(patch) => patch.apply(workdir),
        }
    }
}

/// `path` relative to `root`, or `path` itself when it is not below `root`.
pub(crate) fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
