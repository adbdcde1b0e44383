//! Staged patch resources.
//!
//! Patch payloads live under a resources root that is filled once from the
//! bundle shipped with the program and only checked for existence afterwards:
//!
//! ```text
//! <resources>/
//!   injected-client/key.rsa     replacement private key (PEM)
//!   injected-client/port.txt    replacement port (decimal text)
//!   client/**                   replacement files
//!   client/**.original          baseline copy of each replaced file
//!   runelite-api/**             files added to the API library
//!   signing-keystore.pem        keystore used to re-sign archives
//! ```

use crate::safety::regular_files;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const KEY_FILE: &str = "injected-client/key.rsa";
pub const PORT_FILE: &str = "injected-client/port.txt";
pub const CLIENT_PATCH_DIR: &str = "client";
pub const API_PATCH_DIR: &str = "runelite-api";
/// Suffix of the baseline copy kept next to each client replacement file.
pub const ORIGINAL_SUFFIX: &str = ".original";

/// Sub-directory of a bundle holding the resources to stage.
pub const BUNDLE_RESOURCES_DIR: &str = "resources";
/// Sub-directory of a bundle holding known artifact archives.
pub const BUNDLE_ARTIFACTS_DIR: &str = "artifacts";

/// Resolved locations of staged resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    root: PathBuf,
}

impl ResourceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key_file(&self) -> PathBuf {
        self.root.join(KEY_FILE)
    }

    pub fn port_file(&self) -> PathBuf {
        self.root.join(PORT_FILE)
    }

    pub fn client_dir(&self) -> PathBuf {
        self.root.join(CLIENT_PATCH_DIR)
    }

    pub fn api_dir(&self) -> PathBuf {
        self.root.join(API_PATCH_DIR)
    }

    pub fn keystore(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("failed to stage {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What a staging pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
    /// Resources copied by this pass (relative paths)
    pub staged: Vec<PathBuf>,
    /// Resources that were already present and left alone
    pub existing: Vec<PathBuf>,
}

/// Copy every resource in `<bundle>/resources` that is not staged yet.
///
/// Existing files are never overwritten, so staging is idempotent and local
/// edits to staged resources survive. A bundle without resources stages
/// nothing.
pub fn stage_resources(bundle: &Path, layout: &ResourceLayout) -> Result<StagingReport, StagingError> {
    let source_root = bundle.join(BUNDLE_RESOURCES_DIR);
    let mut report = StagingReport::default();

    if !source_root.is_dir() {
        tracing::debug!(bundle = %bundle.display(), "bundle has no resources to stage");
        return Ok(report);
    }

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| StagingError::Io { path, source }
    };

    fs::create_dir_all(layout.root()).map_err(io_err(layout.root()))?;

    for source in regular_files(&source_root).map_err(io_err(&source_root))? {
        let relative = match source.strip_prefix(&source_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => continue,
        };
        let dest = layout.root().join(&relative);

        if fs::symlink_metadata(&dest).is_ok() {
            report.existing.push(relative);
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        tracing::info!(resource = %relative.display(), "unpacking bundled patch resource");
        fs::copy(&source, &dest).map_err(io_err(&dest))?;
        report.staged.push(relative);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_with(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let bundle = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = bundle.path().join(BUNDLE_RESOURCES_DIR).join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        bundle
    }

    #[test]
    fn test_layout_paths() {
        let layout = ResourceLayout::new("/res");
        assert_eq!(layout.key_file(), Path::new("/res/injected-client/key.rsa"));
        assert_eq!(layout.port_file(), Path::new("/res/injected-client/port.txt"));
        assert_eq!(layout.client_dir(), Path::new("/res/client"));
        assert_eq!(layout.api_dir(), Path::new("/res/runelite-api"));
    }

    #[test]
    fn test_stage_copies_missing_resources() {
        let bundle = bundle_with(&[(PORT_FILE, b"40000"), ("client/a.class", b"A")]);
        let target = tempfile::tempdir().unwrap();
        let layout = ResourceLayout::new(target.path().join("resources"));

        let report = stage_resources(bundle.path(), &layout).unwrap();

        assert_eq!(report.staged.len(), 2);
        assert!(report.existing.is_empty());
        assert_eq!(fs::read(layout.port_file()).unwrap(), b"40000");
        assert_eq!(fs::read(layout.client_dir().join("a.class")).unwrap(), b"A");
    }

    #[test]
    fn test_stage_is_idempotent_and_never_overwrites() {
        let bundle = bundle_with(&[(PORT_FILE, b"40000")]);
        let target = tempfile::tempdir().unwrap();
        let layout = ResourceLayout::new(target.path());

        stage_resources(bundle.path(), &layout).unwrap();
        fs::write(layout.port_file(), b"41000").unwrap();

        let report = stage_resources(bundle.path(), &layout).unwrap();

        assert!(report.staged.is_empty());
        assert_eq!(report.existing, vec![PathBuf::from(PORT_FILE)]);
        assert_eq!(fs::read(layout.port_file()).unwrap(), b"41000");
    }

    #[test]
    fn test_stage_without_resources_dir() {
        let bundle = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let report = stage_resources(bundle.path(), &ResourceLayout::new(target.path())).unwrap();
        assert_eq!(report, StagingReport::default());
    }
}
