use super::{relative_to, PatchError, PatchResult};
use crate::bytes::overwrite_fixed;
use crate::edit::rewrite_file;
use crate::safety::regular_files;
use std::fs;
use std::path::{Path, PathBuf};

/// Port compiled into the client.
pub const DEFAULT_PORT: u16 = 43594;

/// Tag byte of the 5-byte integer constant form.
const INTEGER_TAG: u8 = 3;

/// Fixed-width constant-pool encoding of `port`.
pub fn encode_port(port: u16) -> [u8; 5] {
    let [hi, lo] = port.to_be_bytes();
    [INTEGER_TAG, 0, 0, hi, lo]
}

/// Replaces the compiled default port with the staged one.
#[derive(Debug, Clone)]
pub struct PortPatch {
    port_file: PathBuf,
    default_port: u16,
}

impl PortPatch {
    pub fn new(port_file: impl Into<PathBuf>, default_port: u16) -> Self {
        Self {
            port_file: port_file.into(),
            default_port,
        }
    }

    pub fn port_file(&self) -> &Path {
        &self.port_file
    }

    fn replacement_port(&self) -> Result<u16, PatchError> {
        let text = fs::read_to_string(&self.port_file).map_err(|e| PatchError::io(&self.port_file, e))?;
        let value = text.trim();
        match value.parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(PatchError::InvalidPort {
                path: self.port_file.clone(),
                value: value.to_string(),
            }),
        }
    }

    /// Overwrite every encoded default port in every file.
    pub fn apply(&self, workdir: &Path) -> Result<PatchResult, PatchError> {
        let port = self.replacement_port()?;
        if port == self.default_port {
            tracing::debug!(port, "replacement port equals the default");
            return Ok(PatchResult::AlreadyApplied { files: Vec::new() });
        }

        let search = encode_port(self.default_port);
        let replace = encode_port(port);
        debug_assert_eq!(search.len(), replace.len());

        let mut patched = Vec::new();
        for file in regular_files(workdir).map_err(|e| PatchError::io(workdir, e))? {
            let rewritten = rewrite_file(&file, |mut bytes| {
                let count = overwrite_fixed(&mut bytes, &search, &replace).map_err(|source| {
                    PatchError::Framing {
                        file: file.clone(),
                        source,
                    }
                })?;
                Ok::<_, PatchError>(if count > 0 { Some(bytes) } else { None })
            })?;

            if rewritten {
                let relative = relative_to(workdir, &file);
                tracing::info!(file = %relative.display(), from = self.default_port, to = port, "rewrote port");
                patched.push(relative);
            }
        }

        if patched.is_empty() {
            return Err(PatchError::PatternNotFound {
                pattern: format!("encoded port {}", self.default_port),
            });
        }
        Ok(PatchResult::Applied { files: patched })
    }
}
