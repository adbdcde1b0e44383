use super::{relative_to, PatchError, PatchResult};
use crate::edit::{EditError, EditResult, FileEdit};
use crate::safety::regular_files;
use crate::staging::ORIGINAL_SUFFIX;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-file result of the guarded replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Patched,
    AlreadyPatched,
    /// File no longer matches its baseline and was left alone
    Diverged,
    /// Replacement staged without a baseline; left alone
    MissingBaseline,
}

/// Replaces whole files, guarded by a staged baseline copy of each.
#[derive(Debug, Clone)]
pub struct ClientFilesPatch {
    patch_dir: PathBuf,
}

impl ClientFilesPatch {
    pub fn new(patch_dir: impl Into<PathBuf>) -> Self {
        Self {
            patch_dir: patch_dir.into(),
        }
    }

    pub fn patch_dir(&self) -> &Path {
        &self.patch_dir
    }

    /// Patch every file in `workdir` that has a staged replacement.
    ///
    /// Files without a staged replacement are not reported.
    pub fn patch_files(&self, workdir: &Path) -> Result<Vec<(PathBuf, FileOutcome)>, PatchError> {
        let mut report = Vec::new();

        for file in regular_files(workdir).map_err(|e| PatchError::io(workdir, e))? {
            let relative = relative_to(workdir, &file);
            let replacement = self.patch_dir.join(&relative);
            if !replacement.is_file() {
                continue;
            }

            let mut baseline = replacement.clone().into_os_string();
            baseline.push(ORIGINAL_SUFFIX);
            let baseline = PathBuf::from(baseline);
            if !baseline.is_file() {
                tracing::warn!(file = %relative.display(), "replacement has no baseline copy, skipping");
                report.push((relative, FileOutcome::MissingBaseline));
                continue;
            }

            let expected = fs::read(&baseline).map_err(|e| PatchError::io(&baseline, e))?;
            let content = fs::read(&replacement).map_err(|e| PatchError::io(&replacement, e))?;

            let outcome = match FileEdit::new(&file, expected, content).apply() {
                Ok(EditResult::Applied { .. }) => {
                    tracing::info!(file = %relative.display(), "replaced file");
                    FileOutcome::Patched
                }
                Ok(EditResult::AlreadyApplied { .. }) => {
                    tracing::debug!(file = %relative.display(), "already patched");
                    FileOutcome::AlreadyPatched
                }
                Err(EditError::BeforeContentMismatch { .. }) => {
                    tracing::warn!(file = %relative.display(), "file diverged from its baseline, leaving it unpatched");
                    FileOutcome::Diverged
                }
                Err(e) => return Err(e.into()),
            };
            report.push((relative, outcome));
        }

        Ok(report)
    }

    pub fn apply(&self, workdir: &Path) -> Result<PatchResult, PatchError> {
        let report = self.patch_files(workdir)?;

        let with = |wanted: FileOutcome| -> Vec<PathBuf> {
            report
                .iter()
                .filter(|(_, outcome)| *outcome == wanted)
                .map(|(path, _)| path.clone())
                .collect()
        };

        let patched = with(FileOutcome::Patched);
        if !patched.is_empty() {
            return Ok(PatchResult::Applied { files: patched });
        }
        let already = with(FileOutcome::AlreadyPatched);
        if !already.is_empty() {
            return Ok(PatchResult::AlreadyApplied { files: already });
        }
        Ok(PatchResult::Skipped {
            reason: format!("no patchable files ({} considered)", report.len()),
        })
    }
}
