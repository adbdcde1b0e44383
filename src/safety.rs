use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Exclusively owned scratch directory for one patch run.
///
/// Any leftover directory of the same name is destroyed before the fresh one
/// is created, and the directory is destroyed again when the guard drops.
/// Deletion never follows symbolic links, so an extracted archive containing
/// a link cannot make cleanup escape the scratch root.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside scratch root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Scratch name is not a single path component: {0:?}")]
    InvalidName(String),

    #[error("Scratch I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl ScratchDir {
    /// Recreate `<root>/<name>` as an empty directory.
    pub fn recreate(root: impl AsRef<Path>, name: &str) -> Result<Self, SafetyError> {
        let root = root.as_ref();
        let path = root.join(checked_component(name)?);

        remove_tree(&path).map_err(|source| SafetyError::Io {
            path: path.clone(),
            source,
        })?;
        fs::create_dir_all(&path).map_err(|source| SafetyError::Io {
            path: path.clone(),
            source,
        })?;

        ensure_within(root, &path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = remove_tree(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to delete scratch directory");
        }
    }
}

/// Reject names that would resolve outside their parent directory.
fn checked_component(name: &str) -> Result<&str, SafetyError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(SafetyError::InvalidName(name.to_string())),
    }
}

/// Check that `path` resolves inside `root` once symlinks are resolved.
pub fn ensure_within(root: &Path, path: &Path) -> Result<PathBuf, SafetyError> {
    let canonical_root = root.canonicalize().map_err(|source| SafetyError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let canonical = path.canonicalize().map_err(|source| SafetyError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if !canonical.starts_with(&canonical_root) {
        return Err(SafetyError::OutsideRoot {
            path: canonical,
            root: canonical_root,
        });
    }
    Ok(canonical)
}

/// Recursively delete `path` without following symbolic links.
///
/// A symlink is removed as a link; its target is never visited. A missing
/// path is not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if !metadata.is_dir() {
        // Regular files and symlinks (to files or directories) alike.
        return fs::remove_file(path);
    }

    for entry in fs::read_dir(path)? {
        remove_tree(&entry?.path())?;
    }
    fs::remove_dir(path)
}

/// Regular files under `dir`, in sorted file-system order.
///
/// Symlinks are neither followed nor reported.
pub fn regular_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recreate_clears_leftovers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let stale = temp_dir.path().join("client-1.0/stale.class");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old").unwrap();

        let scratch = ScratchDir::recreate(temp_dir.path(), "client-1.0").unwrap();

        assert!(scratch.path().is_dir());
        assert!(!stale.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchDir::recreate(temp_dir.path(), "work").unwrap();
            fs::write(scratch.path().join("a.bin"), b"x").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
        assert!(temp_dir.path().exists());
    }

    #[test]
    fn test_rejects_escaping_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        for name in ["../evil", "a/b", "", ".", ".."] {
            let result = ScratchDir::recreate(temp_dir.path(), name);
            assert!(
                matches!(result, Err(SafetyError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_remove_tree_missing_is_ok() {
        let temp_dir = tempfile::tempdir().unwrap();
        remove_tree(&temp_dir.path().join("nope")).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_remove_tree_does_not_follow_symlinks() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let outside = temp_dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("keep.txt"), b"precious").unwrap();

        let scratch = temp_dir.path().join("scratch");
        fs::create_dir_all(scratch.join("nested")).unwrap();
        symlink(&outside, scratch.join("nested/escape")).unwrap();
        symlink(outside.join("keep.txt"), scratch.join("file-link")).unwrap();

        remove_tree(&scratch).unwrap();

        assert!(!scratch.exists());
        assert_eq!(fs::read(outside.join("keep.txt")).unwrap(), b"precious");
    }

    #[test]
    #[cfg(unix)]
    fn test_ensure_within_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let outside = temp_dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        symlink(&outside, root.join("escape")).unwrap();

        let result = ensure_within(&root, &root.join("escape"));
        assert!(matches!(result, Err(SafetyError::OutsideRoot { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn test_regular_files_skips_symlinks() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        fs::create_dir_all(dir.join("b")).unwrap();
        fs::write(dir.join("b/two.bin"), b"2").unwrap();
        fs::write(dir.join("a.bin"), b"1").unwrap();
        symlink(dir.join("a.bin"), dir.join("link.bin")).unwrap();

        let files = regular_files(dir).unwrap();
        assert_eq!(files, vec![dir.join("a.bin"), dir.join("b/two.bin")]);
    }
}
