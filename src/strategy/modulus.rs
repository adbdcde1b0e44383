use super::{relative_to, PatchError, PatchResult};
use crate::bytes::{find_run, index_of, is_hex_digit, read_length_prefix, rewrite_length_prefixed};
use crate::edit::rewrite_file;
use crate::key::{modulus_hex, read_private_key};
use crate::safety::regular_files;
use std::path::{Path, PathBuf};

/// Public exponent in hex; marks the class holding the embedded modulus.
pub const MODULUS_MARKER: &[u8] = b"10001";
/// Width in hex digits of the embedded modulus.
pub const MODULUS_HEX_LEN: usize = 256;

/// Replaces the embedded RSA modulus with the staged key's modulus.
#[derive(Debug, Clone)]
pub struct ModulusPatch {
    key_file: PathBuf,
}

impl ModulusPatch {
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
        }
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    pub fn apply(&self, workdir: &Path) -> Result<PatchResult, PatchError> {
        let key = read_private_key(&self.key_file)?;
        let replacement = modulus_hex(&key);

        for file in regular_files(workdir).map_err(|e| PatchError::io(workdir, e))? {
            let rewritten = rewrite_file(&file, |bytes| {
                if index_of(&bytes, MODULUS_MARKER).is_none() {
                    return Ok(None);
                }
                rewrite_modulus(&bytes, &file, replacement.as_bytes()).map(Some)
            })?;

            // The first marker file decides: success or a hard error.
            if rewritten {
                let relative = relative_to(workdir, &file);
                tracing::info!(file = %relative.display(), "replaced RSA modulus");
                return Ok(PatchResult::Applied {
                    files: vec![relative],
                });
            }
        }

        Err(PatchError::PatternNotFound {
            pattern: "modulus marker 10001".to_string(),
        })
    }
}

/// Replace the length-prefixed 256-digit hex value in `bytes`.
///
/// The value is the start of the first hex run of at least
/// [`MODULUS_HEX_LEN`] digits. It must be bounded by non-hex bytes and
/// preceded by a prefix declaring its length. `replacement` may be shorter
/// than the original but never longer.
pub fn rewrite_modulus(bytes: &[u8], file: &Path, replacement: &[u8]) -> Result<Vec<u8>, PatchError> {
    let run = find_run(bytes, MODULUS_HEX_LEN, is_hex_digit).ok_or_else(|| PatchError::PatternNotFound {
        pattern: format!("{MODULUS_HEX_LEN}-digit hex run in {}", file.display()),
    })?;

    let start = run.start;
    if run.len() > MODULUS_HEX_LEN {
        return Err(PatchError::AmbiguousBoundary {
            file: file.to_path_buf(),
            offset: start + MODULUS_HEX_LEN,
        });
    }

    let malformed = |detail: String| PatchError::MalformedPrefix {
        file: file.to_path_buf(),
        offset: start,
        detail,
    };
    let declared = read_length_prefix(bytes, start).map_err(|e| malformed(e.to_string()))?;
    if declared != MODULUS_HEX_LEN {
        return Err(malformed(format!(
            "prefix declares {declared} bytes, value is {MODULUS_HEX_LEN}"
        )));
    }

    if replacement.len() > MODULUS_HEX_LEN {
        return Err(PatchError::CapacityViolation {
            file: file.to_path_buf(),
            capacity: MODULUS_HEX_LEN,
            replacement: replacement.len(),
        });
    }

    rewrite_length_prefixed(bytes, start, replacement).map_err(|source| PatchError::Framing {
        file: file.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_with(value: &[u8]) -> Vec<u8> {
        let mut bytes = b"\xca\xfe\x00\x0510001\x01".to_vec();
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(value);
        bytes.extend_from_slice(b"\x07tail");
        bytes
    }

    #[test]
    fn test_equal_and_shorter_replacements() {
        let original = class_with(&[b'a'; 256]);
        let path = Path::new("Main.class");

        let same = rewrite_modulus(&original, path, &[b'b'; 256]).unwrap();
        assert_eq!(same, class_with(&[b'b'; 256]));

        let shorter = rewrite_modulus(&original, path, &[b'c'; 255]).unwrap();
        assert_eq!(shorter, class_with(&[b'c'; 255]));
        assert_eq!(shorter.len(), original.len() - 1);
    }

    #[test]
    fn test_longer_replacement_is_capacity_violation() {
        let original = class_with(&[b'a'; 256]);
        let err = rewrite_modulus(&original, Path::new("Main.class"), &[b'b'; 257]).unwrap_err();
        assert!(matches!(
            err,
            PatchError::CapacityViolation {
                capacity: 256,
                replacement: 257,
                ..
            }
        ));
    }

    #[test]
    fn test_skips_short_hex_runs() {
        let mut bytes = vec![b'\x00', b'\x64'];
        bytes.extend_from_slice(&[b'd'; 100]);
        bytes.push(b'\x01');
        let expected_prefix_len = bytes.len();
        bytes.extend(class_with(&[b'e'; 256]));

        let out = rewrite_modulus(&bytes, Path::new("Main.class"), &[b'f'; 256]).unwrap();

        assert_eq!(&out[..expected_prefix_len], &bytes[..expected_prefix_len]);
        assert_eq!(out[expected_prefix_len..], class_with(&[b'f'; 256])[..]);
    }

    #[test]
    fn test_longer_run_is_ambiguous() {
        let bytes = class_with(&[b'a'; 300]);
        let err = rewrite_modulus(&bytes, Path::new("Main.class"), &[b'b'; 256]).unwrap_err();
        assert!(matches!(err, PatchError::AmbiguousBoundary { .. }));
    }

    #[test]
    fn test_prefix_must_match_value() {
        let mut bytes = class_with(&[b'a'; 256]);
        let start = bytes.len() - 256 - 5;
        bytes[start - 2..start].copy_from_slice(&300u16.to_be_bytes());
        let err = rewrite_modulus(&bytes, Path::new("Main.class"), &[b'b'; 256]).unwrap_err();
        assert!(matches!(err, PatchError::MalformedPrefix { .. }));
    }

    #[test]
    fn test_value_at_start_has_no_prefix() {
        let bytes = [&[b'a'; 256][..], &b"\x00"[..]].concat();
        let err = rewrite_modulus(&bytes, Path::new("Main.class"), &[b'b'; 256]).unwrap_err();
        assert!(matches!(err, PatchError::MalformedPrefix { offset: 0, .. }));
    }

    #[test]
    fn test_marker_without_run_is_not_found() {
        let err = rewrite_modulus(b"\x00\x0510001", Path::new("Main.class"), b"ab").unwrap_err();
        assert!(matches!(err, PatchError::PatternNotFound { .. }));
    }
}
