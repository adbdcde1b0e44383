//! Per-run artifact selection.
//!
//! The acquisition pipeline hands over a list of artifacts with declared
//! hashes. Each one is compared with what is on disk and with the bundled
//! list of artifacts this build knows how to patch, and [`RunContext`] then
//! patches the selection.

use crate::archive::ZipCodec;
use crate::config::{PatcherConfig, ResolvedPaths};
use crate::patcher::{Artifact, ArtifactError, ArtifactPatcher, PatchOutcome};
use crate::safety::remove_tree;
use crate::signing::KeystoreSigner;
use crate::staging::{stage_resources, ResourceLayout, StagingError, StagingReport, BUNDLE_ARTIFACTS_DIR};
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bootstrap file shipped inside a bundle.
pub const BUNDLE_BOOTSTRAP_FILE: &str = "bootstrap.json";

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid bootstrap {path}: {source}")]
    Bootstrap {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("missing or unusable artifacts: {}", names.join(", "))]
    MissingArtifacts { names: Vec<String> },

    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Artifact list as published in a bootstrap document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bootstrap {
    pub artifacts: Vec<Artifact>,
}

impl Bootstrap {
    pub fn load(path: &Path) -> Result<Self, LaunchError> {
        let file = File::open(path).map_err(|source| LaunchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(io::BufReader::new(file)).map_err(|source| LaunchError::Bootstrap {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Patch artifacts whose on-disk hash differs from the declared one
    pub patch_anyway: bool,
    /// Carry on when artifacts are missing
    pub ignore_missing_artifacts: bool,
}

/// What a run does with one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Patch,
    /// Copy the bundled archive into the repository first, then patch it
    Restore { source: PathBuf },
    Skip { reason: String },
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub entries: Vec<(Artifact, Selection)>,
}

impl Plan {
    pub fn missing(&self) -> Vec<&Artifact> {
        self.entries
            .iter()
            .filter(|(_, selection)| *selection == Selection::Missing)
            .map(|(artifact, _)| artifact)
            .collect()
    }

    /// Artifacts the run will patch, in list order.
    pub fn selected(&self) -> Vec<&Artifact> {
        self.entries
            .iter()
            .filter(|(_, selection)| matches!(selection, Selection::Patch | Selection::Restore { .. }))
            .map(|(artifact, _)| artifact)
            .collect()
    }
}

/// SHA-256 of a file's content as lowercase hex.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Everything one launcher run needs.
pub struct RunContext {
    paths: ResolvedPaths,
    options: RunOptions,
    patcher: ArtifactPatcher,
}

impl RunContext {
    pub fn new(config: &PatcherConfig, paths: ResolvedPaths, options: RunOptions) -> Self {
        let layout = ResourceLayout::new(&paths.resources_dir);
        let signer = KeystoreSigner::new(
            layout.keystore(&config.signing.keystore),
            config.signing.passphrase.clone(),
            config.signing.alias.clone(),
        );
        let patcher = ArtifactPatcher::new(
            &paths.repo_dir,
            &paths.temp_dir,
            Strategy::standard_set(&layout, config.patch.default_port),
            ZipCodec,
            signer,
        );

        Self {
            paths,
            options,
            patcher,
        }
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn layout(&self) -> ResourceLayout {
        ResourceLayout::new(&self.paths.resources_dir)
    }

    pub fn patcher(&self) -> &ArtifactPatcher {
        &self.patcher
    }

    /// Bundled list of known artifacts; empty without a bundle.
    pub fn known_artifacts(&self) -> Result<Vec<Artifact>, LaunchError> {
        let Some(bundle) = &self.paths.bundle_dir else {
            return Ok(Vec::new());
        };
        let path = bundle.join(BUNDLE_BOOTSTRAP_FILE);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        Ok(Bootstrap::load(&path)?.artifacts)
    }

    /// Decide what to do with each artifact.
    ///
    /// Fails with [`LaunchError::MissingArtifacts`] when any artifact is
    /// missing, unless missing artifacts are ignored.
    pub fn plan(&self, artifacts: &[Artifact], known: &[Artifact]) -> Result<Plan, LaunchError> {
        let mut plan = Plan::default();

        for artifact in artifacts {
            let path = self.paths.repo_dir.join(&artifact.name);
            // An artifact that cannot be read counts as absent so a known
            // one can still be restored from the bundle.
            let on_disk = match sha256_file(&path) {
                Ok(hash) => Some(hash),
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => {
                    tracing::warn!(artifact = %artifact.name, error = %e, "unreadable artifact, treating it as absent");
                    None
                }
            };
            let is_known = known.contains(artifact);

            let selection = match on_disk {
                Some(hash) if hash.eq_ignore_ascii_case(&artifact.hash) => Selection::Patch,
                Some(_) if self.options.patch_anyway => Selection::Patch,
                Some(_) if is_known => Selection::Skip {
                    reason: "hash differs from the known artifact, likely already patched".to_string(),
                },
                Some(_) => Selection::Missing,
                None if is_known => match self.bundled_artifact(&artifact.name) {
                    Some(source) => Selection::Restore { source },
                    None => Selection::Missing,
                },
                None => Selection::Missing,
            };

            tracing::debug!(artifact = %artifact.name, ?selection, "planned");
            plan.entries.push((artifact.clone(), selection));
        }

        let missing: Vec<String> = plan.missing().iter().map(|a| a.name.clone()).collect();
        if !missing.is_empty() {
            if !self.options.ignore_missing_artifacts {
                return Err(LaunchError::MissingArtifacts { names: missing });
            }
            tracing::warn!(count = missing.len(), "ignoring missing artifacts");
        }

        Ok(plan)
    }

    fn bundled_artifact(&self, name: &str) -> Option<PathBuf> {
        let path = self.paths.bundle_dir.as_ref()?.join(BUNDLE_ARTIFACTS_DIR).join(name);
        path.is_file().then_some(path)
    }

    /// Stage bundled resources, if a bundle is configured.
    pub fn stage(&self) -> Result<Option<StagingReport>, LaunchError> {
        match &self.paths.bundle_dir {
            Some(bundle) => Ok(Some(stage_resources(bundle, &self.layout())?)),
            None => Ok(None),
        }
    }

    /// Stage resources, restore bundled artifacts and patch the selection.
    pub fn execute(&self, plan: &Plan) -> Result<Vec<(String, Result<PatchOutcome, ArtifactError>)>, LaunchError> {
        self.stage()?;

        for (artifact, selection) in &plan.entries {
            if let Selection::Restore { source } = selection {
                let dest = self.paths.repo_dir.join(&artifact.name);
                fs::create_dir_all(&self.paths.repo_dir).map_err(|e| LaunchError::Io {
                    path: self.paths.repo_dir.clone(),
                    source: e,
                })?;
                tracing::info!(artifact = %artifact.name, "restoring bundled artifact");
                remove_tree(&dest).map_err(|e| LaunchError::Io {
                    path: dest.clone(),
                    source: e,
                })?;
                fs::copy(source, &dest).map_err(|e| LaunchError::Io { path: dest, source: e })?;
            }
        }

        let selected: Vec<Artifact> = plan.selected().into_iter().cloned().collect();
        Ok(self.patcher.patch_all(&selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.jar");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_bootstrap_json() {
        let json = r#"{"artifacts":[{"name":"client-1.0.jar","hash":"ab12"}]}"#;
        let bootstrap: Bootstrap = serde_json::from_str(json).unwrap();
        assert_eq!(bootstrap.artifacts, vec![Artifact::new("client-1.0.jar", "ab12")]);
    }
}
