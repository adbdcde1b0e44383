use super::{relative_to, PatchError, PatchResult};
use crate::bytes::{index_of, rewrite_length_prefixed};
use crate::edit::rewrite_file;
use crate::safety::regular_files;
use std::path::Path;

/// Length-prefixed `127.0.0.1` as stored in compiled constant pools.
pub const LOOPBACK_PATTERN: &[u8] = b"\x00\x09127.0.0.1";

/// Empties the hard-coded loopback address so the client's local-server
/// check never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackPatch;

impl LoopbackPatch {
    /// Rewrite the first file holding the loopback string, then stop.
    pub fn apply(&self, workdir: &Path) -> Result<PatchResult, PatchError> {
        let files = regular_files(workdir).map_err(|e| PatchError::io(workdir, e))?;

        for file in files {
            let rewritten = rewrite_file(&file, |bytes| {
                let Some(index) = index_of(&bytes, LOOPBACK_PATTERN) else {
                    return Ok(None);
                };
                rewrite_length_prefixed(&bytes, index + 2, b"")
                    .map(Some)
                    .map_err(|source| PatchError::Framing {
                        file: file.clone(),
                        source,
                    })
            })?;

            if rewritten {
                let relative = relative_to(workdir, &file);
                tracing::info!(file = %relative.display(), "removed loopback address");
                return Ok(PatchResult::Applied {
                    files: vec![relative],
                });
            }
        }

        Err(PatchError::PatternNotFound {
            pattern: "length-prefixed 127.0.0.1".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_first_matching_file_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = [&b"\xca\xfe"[..], LOOPBACK_PATTERN, &b"rest"[..]].concat();
        fs::write(temp_dir.path().join("a.class"), &first).unwrap();
        fs::write(temp_dir.path().join("b.class"), &first).unwrap();

        let result = LoopbackPatch.apply(temp_dir.path()).unwrap();

        assert_eq!(
            result,
            PatchResult::Applied {
                files: vec!["a.class".into()]
            }
        );
        assert_eq!(
            fs::read(temp_dir.path().join("a.class")).unwrap(),
            b"\xca\xfe\x00\x00rest"
        );
        assert_eq!(fs::read(temp_dir.path().join("b.class")).unwrap(), first);
    }

    #[test]
    fn test_unprefixed_string_does_not_match() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("a.class"), b"host=127.0.0.1").unwrap();

        let err = LoopbackPatch.apply(temp_dir.path()).unwrap_err();

        assert!(matches!(err, PatchError::PatternNotFound { .. }));
        assert_eq!(
            fs::read(temp_dir.path().join("a.class")).unwrap(),
            b"host=127.0.0.1"
        );
    }
}
