use super::{relative_to, PatchError, PatchResult};
use crate::safety::regular_files;
use std::fs;
use std::path::{Path, PathBuf};

/// Adds staged files to the API library without touching existing entries.
#[derive(Debug, Clone)]
pub struct ApiAdditionsPatch {
    patch_dir: PathBuf,
}

impl ApiAdditionsPatch {
    pub fn new(patch_dir: impl Into<PathBuf>) -> Self {
        Self {
            patch_dir: patch_dir.into(),
        }
    }

    pub fn patch_dir(&self) -> &Path {
        &self.patch_dir
    }

    pub fn apply(&self, workdir: &Path) -> Result<PatchResult, PatchError> {
        let staged = regular_files(&self.patch_dir).map_err(|e| PatchError::io(&self.patch_dir, e))?;

        let mut added = Vec::new();
        let mut present = Vec::new();
        for source in staged {
            let relative = relative_to(&self.patch_dir, &source);
            let dest = workdir.join(&relative);

            if fs::symlink_metadata(&dest).is_ok() {
                present.push(relative);
                continue;
            }

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| PatchError::io(parent, e))?;
            }
            fs::copy(&source, &dest).map_err(|e| PatchError::io(&dest, e))?;
            tracing::debug!(file = %relative.display(), "added file");
            added.push(relative);
        }

        if added.is_empty() {
            return Ok(PatchResult::AlreadyApplied { files: present });
        }
        tracing::info!(count = added.len(), "added files to library");
        Ok(PatchResult::Applied { files: added })
    }
}
