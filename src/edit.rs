use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Whole-file replacement guarded by the content it expects to replace.
///
/// This is the compare-and-swap used for shipped file replacements: the edit
/// only lands when the file on disk still holds `expected_before`, and is a
/// no-op when it already holds `new_content`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "FileEdit does nothing until apply() is called"]
pub struct FileEdit {
    /// File to rewrite
    pub file: PathBuf,
    /// Content the file must hold before the edit
    pub expected_before: Vec<u8>,
    /// Content written by the edit
    pub new_content: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("{file} differs from its expected baseline ({found_len} bytes on disk, {expected_len} expected)")]
    BeforeContentMismatch {
        file: PathBuf,
        expected_len: usize,
        found_len: usize,
    },

    #[error("File I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl EditError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        EditError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for applied/already-applied"]
pub enum EditResult {
    /// Edit was written to disk
    Applied { file: PathBuf, bytes_written: usize },
    /// File already held the new content
    AlreadyApplied { file: PathBuf },
}

impl FileEdit {
    pub fn new(
        file: impl Into<PathBuf>,
        expected_before: impl Into<Vec<u8>>,
        new_content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file: file.into(),
            expected_before: expected_before.into(),
            new_content: new_content.into(),
        }
    }

    /// Check the edit against the current file contents.
    ///
    /// Returns `Ok(true)` when the edit would change the file and `Ok(false)`
    /// when it is already applied.
    fn validate(&self, current: &[u8]) -> Result<bool, EditError> {
        // Idempotency first: a patched file no longer matches its baseline.
        if current == self.new_content.as_slice() {
            return Ok(false);
        }

        if current != self.expected_before.as_slice() {
            return Err(EditError::BeforeContentMismatch {
                file: self.file.clone(),
                expected_len: self.expected_before.len(),
                found_len: current.len(),
            });
        }

        Ok(true)
    }

    /// Apply this edit to the file system atomically.
    pub fn apply(&self) -> Result<EditResult, EditError> {
        let current = fs::read(&self.file).map_err(|e| EditError::io(&self.file, e))?;

        if !self.validate(&current)? {
            return Ok(EditResult::AlreadyApplied {
                file: self.file.clone(),
            });
        }

        atomic_write(&self.file, &self.new_content)?;

        Ok(EditResult::Applied {
            file: self.file.clone(),
            bytes_written: self.new_content.len(),
        })
    }
}

/// Read `path`, hand its bytes to `transform`, and write back what it returns.
///
/// `transform` returns `Ok(None)` when the file holds nothing to change; the
/// file is then left untouched and `Ok(false)` is returned. Errors from the
/// transform leave the file untouched as well.
pub fn rewrite_file<E>(
    path: &Path,
    transform: impl FnOnce(Vec<u8>) -> Result<Option<Vec<u8>>, E>,
) -> Result<bool, E>
where
    E: From<EditError>,
{
    let original = fs::read(path).map_err(|e| EditError::io(path, e))?;

    match transform(original)? {
        Some(modified) => {
            atomic_write(path, &modified)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write lands or the file keeps its previous content.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = path.parent().ok_or_else(|| {
        EditError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path has no parent directory"),
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| EditError::io(path, e))?;

    temp.write_all(content).map_err(|e| EditError::io(path, e))?;

    // Flush to disk (fsync)
    temp.as_file()
        .sync_all()
        .map_err(|e| EditError::io(path, e))?;

    // Atomic rename
    temp.persist(path).map_err(|e| EditError::io(path, e.error))?;

    Ok(())
}
