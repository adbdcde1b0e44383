//! Patch orchestrator.
//!
//! Drives one artifact through extract → patch → repackage → sign → replace.
//! The original archive is only touched by the final rename, so any failure
//! before it leaves the artifact byte-identical. Scratch state lives in a
//! [`ScratchDir`] guard and a [`tempfile::NamedTempFile`], both removed on
//! every exit path.

use crate::archive::{ArchiveCodec, ArchiveError, ZipCodec, SIGNATURE_DIR};
use crate::safety::{remove_tree, SafetyError, ScratchDir};
use crate::signing::{is_signed, ArchiveSigner, KeystoreSigner, SignOutcome, SigningError};
use crate::strategy::{PatchError, PatchResult, Strategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Archive extension; artifacts without it are never patched.
pub const ARCHIVE_EXTENSION: &str = ".jar";

/// An artifact on disk, identified by file name and declared content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub hash: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }
}

/// Result of patching one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked for what was patched"]
pub enum PatchOutcome {
    /// No strategy applies; nothing was read or written
    NotApplicable,
    /// Artifact replaced with its patched form
    Patched {
        strategies: Vec<(&'static str, PatchResult)>,
        /// `None` when the original archive was unsigned
        signature: Option<SignOutcome>,
    },
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::NotApplicable => write!(f, "no applicable patches"),
            PatchOutcome::Patched {
                strategies,
                signature,
            } => {
                let names: Vec<&str> = strategies.iter().map(|(name, _)| *name).collect();
                write!(f, "patched ({})", names.join(", "))?;
                match signature {
                    Some(SignOutcome::Signed { alias }) => write!(f, ", re-signed as {alias}"),
                    Some(SignOutcome::Unsigned { reason }) => write!(f, ", left unsigned: {reason}"),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Fatal errors for a single artifact
#[derive(Debug)]
pub enum ArtifactError {
    /// Scratch directory could not be prepared
    Scratch(SafetyError),
    /// Extraction or repackaging failed
    Archive(ArchiveError),
    /// A strategy failed; later strategies did not run
    Strategy {
        strategy: &'static str,
        source: PatchError,
    },
    /// Keystore present but unusable, or signing failed
    Signing(SigningError),
    /// File I/O error
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::Scratch(e) => write!(f, "scratch error: {}", e),
            ArtifactError::Archive(e) => write!(f, "archive error: {}", e),
            ArtifactError::Strategy { strategy, source } => {
                write!(f, "{} patch failed: {}", strategy, source)
            }
            ArtifactError::Signing(e) => write!(f, "signing error: {}", e),
            ArtifactError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ArtifactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArtifactError::Scratch(e) => Some(e),
            ArtifactError::Archive(e) => Some(e),
            ArtifactError::Strategy { source, .. } => Some(source),
            ArtifactError::Signing(e) => Some(e),
            ArtifactError::Io { source, .. } => Some(source),
        }
    }
}

impl From<SafetyError> for ArtifactError {
    fn from(e: SafetyError) -> Self {
        ArtifactError::Scratch(e)
    }
}

impl From<ArchiveError> for ArtifactError {
    fn from(e: ArchiveError) -> Self {
        ArtifactError::Archive(e)
    }
}

impl From<SigningError> for ArtifactError {
    fn from(e: SigningError) -> Self {
        ArtifactError::Signing(e)
    }
}

/// Artifact name with the archive extension stripped.
///
/// Returns `None` for names that are not archives.
pub fn logical_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(ARCHIVE_EXTENSION)
        .filter(|name| !name.is_empty())
}

/// Applies an ordered strategy list to artifact archives.
pub struct ArtifactPatcher<C = ZipCodec, S = KeystoreSigner> {
    repo_dir: PathBuf,
    temp_dir: PathBuf,
    strategies: Vec<Strategy>,
    codec: C,
    signer: S,
}

impl<C: ArchiveCodec, S: ArchiveSigner> ArtifactPatcher<C, S> {
    /// `repo_dir` holds the artifacts; per-artifact scratch directories are
    /// created under `temp_dir`.
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        strategies: Vec<Strategy>,
        codec: C,
        signer: S,
    ) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            temp_dir: temp_dir.into(),
            strategies,
            codec,
            signer,
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Strategies that apply to `logical_name`, in application order.
    pub fn applicable(&self, logical_name: &str) -> Vec<&Strategy> {
        self.strategies
            .iter()
            .filter(|s| s.applies_to(logical_name))
            .collect()
    }

    /// Patch the artifact stored at `<repo_dir>/<name>`.
    pub fn patch(&self, artifact: &Artifact) -> Result<PatchOutcome, ArtifactError> {
        self.patch_file(&self.repo_dir.join(&artifact.name))
    }

    /// Patch every artifact. One failure never stops the others.
    pub fn patch_all(&self, artifacts: &[Artifact]) -> Vec<(String, Result<PatchOutcome, ArtifactError>)> {
        artifacts
            .iter()
            .map(|artifact| {
                let result = self.patch(artifact);
                if let Err(e) = &result {
                    tracing::error!(artifact = %artifact.name, error = %e, "artifact left unpatched");
                }
                (artifact.name.clone(), result)
            })
            .collect()
    }

    /// Patch the archive at `archive` in place.
    pub fn patch_file(&self, archive: &Path) -> Result<PatchOutcome, ArtifactError> {
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(name) = logical_name(&file_name) else {
            tracing::debug!(file = %file_name, "not an archive, skipping");
            return Ok(PatchOutcome::NotApplicable);
        };

        let applicable = self.applicable(name);
        if applicable.is_empty() {
            tracing::debug!(artifact = name, "no applicable patches");
            return Ok(PatchOutcome::NotApplicable);
        }

        let span = tracing::info_span!("patch", artifact = name);
        let _entered = span.enter();

        fs::create_dir_all(&self.temp_dir).map_err(|source| ArtifactError::Io {
            path: self.temp_dir.clone(),
            source,
        })?;
        let scratch = ScratchDir::recreate(&self.temp_dir, name)?;

        tracing::info!(archive = %archive.display(), "extracting");
        let metadata = self.codec.extract(archive, scratch.path())?;

        let was_signed = is_signed(scratch.path()).map_err(|source| ArtifactError::Io {
            path: scratch.path().to_path_buf(),
            source,
        })?;

        let mut results = Vec::with_capacity(applicable.len());
        for strategy in applicable {
            match strategy.apply(scratch.path()) {
                Ok(result) => {
                    tracing::info!(strategy = strategy.name(), %result, "strategy finished");
                    results.push((strategy.name(), result));
                }
                Err(source) => {
                    tracing::error!(strategy = strategy.name(), error = %source, "strategy failed, aborting");
                    return Err(ArtifactError::Strategy {
                        strategy: strategy.name(),
                        source,
                    });
                }
            }
        }

        if was_signed {
            let signature_dir = scratch.path().join(SIGNATURE_DIR);
            tracing::debug!("removing stale signature metadata");
            remove_tree(&signature_dir).map_err(|source| ArtifactError::Io {
                path: signature_dir,
                source,
            })?;
        }

        let parent = archive
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let output = tempfile::Builder::new()
            .prefix(&format!(".{name}-"))
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|source| ArtifactError::Io {
                path: parent.to_path_buf(),
                source,
            })?;

        tracing::info!("repackaging");
        self.codec.create(scratch.path(), output.path(), &metadata)?;

        let signature = if was_signed {
            Some(self.signer.sign(output.path())?)
        } else {
            None
        };

        output.persist(archive).map_err(|e| ArtifactError::Io {
            path: archive.to_path_buf(),
            source: e.error,
        })?;
        tracing::info!("artifact replaced");

        Ok(PatchOutcome::Patched {
            strategies: results,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::ResourceLayout;
    use crate::strategy::DEFAULT_PORT;

    #[test]
    fn test_logical_name() {
        assert_eq!(logical_name("client-1.2.jar"), Some("client-1.2"));
        assert_eq!(logical_name("client-1.2.zip"), None);
        assert_eq!(logical_name("client-1.2.JAR"), None);
        assert_eq!(logical_name(".jar"), None);
    }

    #[test]
    fn test_not_applicable_is_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let layout = ResourceLayout::new(temp.path().join("resources"));
        let patcher = ArtifactPatcher::new(
            temp.path(),
            temp.path().join("temp"),
            Strategy::standard_set(&layout, DEFAULT_PORT),
            ZipCodec,
            KeystoreSigner::new(layout.keystore("signing-keystore.pem"), "123456", "test"),
        );

        fs::write(temp.path().join("guava-33.jar"), b"not even a zip").unwrap();
        let outcome = patcher.patch(&Artifact::new("guava-33.jar", "")).unwrap();

        assert_eq!(outcome, PatchOutcome::NotApplicable);
        assert!(!temp.path().join("temp").exists());
        assert_eq!(fs::read(temp.path().join("guava-33.jar")).unwrap(), b"not even a zip");
    }

    #[test]
    fn test_outcome_display() {
        let outcome = PatchOutcome::Patched {
            strategies: vec![("loopback", PatchResult::Applied { files: vec![] })],
            signature: Some(SignOutcome::Signed {
                alias: "test".to_string(),
            }),
        };
        assert_eq!(outcome.to_string(), "patched (loopback), re-signed as test");
    }
}
