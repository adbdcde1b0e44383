//! Archive codec boundary.
//!
//! The patch pipeline needs exactly two operations from an archive format:
//! explode an archive into a directory, and build an archive from a
//! directory's children. [`ZipCodec`] provides both for zip-family archives.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Reserved directory holding manifest and signature files.
pub const SIGNATURE_DIR: &str = "META-INF";
pub const MANIFEST_FILE: &str = "MANIFEST.MF";

/// Text encoding an archive declares for its entry names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// IBM code page 437, the zip default when the UTF-8 flag is unset
    Cp437,
}

/// Archive-level properties carried from the input to the repackaged output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub encoding: TextEncoding,
    pub comment: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed archive {path}: {source}")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("{path} contains symbolic link entry {entry}, which cannot be repackaged")]
    SymlinkEntry { path: PathBuf, entry: String },
}

/// Extract/create operations the orchestrator needs from an archive format.
pub trait ArchiveCodec {
    /// Fully extract `archive` into the existing directory `dest`.
    ///
    /// Archives holding symbolic link entries are refused.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<ArchiveMetadata, ArchiveError>;

    /// Write a new archive at `archive` from the children of `source_dir`.
    ///
    /// The comment is carried over as is. Entry names are always written as
    /// UTF-8: names of a [`TextEncoding::Cp437`] archive are stored in their
    /// decoded form with the UTF-8 flag set, which any zip reader resolves to
    /// the same paths.
    fn create(
        &self,
        source_dir: &Path,
        archive: &Path,
        metadata: &ArchiveMetadata,
    ) -> Result<(), ArchiveError>;
}

/// Zip/JAR codec backed by the `zip` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl ArchiveCodec for ZipCodec {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<ArchiveMetadata, ArchiveError> {
        let file = File::open(archive).map_err(io_error(archive))?;
        let mut zip = ZipArchive::new(BufReader::new(file)).map_err(zip_error(archive))?;

        let mut encoding = TextEncoding::Utf8;
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index).map_err(zip_error(archive))?;
            if entry.is_symlink() {
                return Err(ArchiveError::SymlinkEntry {
                    path: archive.to_path_buf(),
                    entry: entry.name().to_string(),
                });
            }
            let raw = entry.name_raw();
            if !raw.is_ascii() && std::str::from_utf8(raw).is_err() {
                encoding = TextEncoding::Cp437;
            }
        }

        let metadata = ArchiveMetadata {
            encoding,
            comment: zip.comment().to_vec(),
        };

        zip.extract(dest).map_err(zip_error(archive))?;
        Ok(metadata)
    }

    fn create(
        &self,
        source_dir: &Path,
        archive: &Path,
        metadata: &ArchiveMetadata,
    ) -> Result<(), ArchiveError> {
        let file = File::create(archive).map_err(io_error(archive))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        zip.set_comment(String::from_utf8_lossy(&metadata.comment).into_owned());

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let walker = WalkDir::new(source_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by(entry_order);

        for entry in walker {
            let entry = entry.map_err(|e| ArchiveError::Io {
                path: source_dir.to_path_buf(),
                source: e.into(),
            })?;
            let Some(name) = entry_name(source_dir, entry.path()) else {
                continue;
            };

            if metadata.encoding == TextEncoding::Cp437 && !name.is_ascii() {
                tracing::warn!(entry = %name, "non-ASCII entry name re-encoded as UTF-8");
            }

            if entry.file_type().is_dir() {
                zip.add_directory(format!("{name}/"), options)
                    .map_err(zip_error(archive))?;
            } else if entry.file_type().is_file() {
                zip.start_file(name, options).map_err(zip_error(archive))?;
                let mut input = File::open(entry.path()).map_err(io_error(entry.path()))?;
                io::copy(&mut input, &mut zip).map_err(io_error(entry.path()))?;
            } else {
                tracing::warn!(entry = %name, "dropping symbolic link while repackaging");
            }
        }

        let mut writer = zip.finish().map_err(zip_error(archive))?;
        writer.flush().map_err(io_error(archive))?;
        Ok(())
    }
}

/// Archive entry name for `path`, with `/` separators.
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// `META-INF/` and its manifest come first, everything else by name.
fn entry_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    fn rank(entry: &DirEntry) -> u8 {
        let name = entry.file_name();
        match entry.depth() {
            1 if name == SIGNATURE_DIR => 0,
            2 if name == MANIFEST_FILE => 0,
            _ => 1,
        }
    }

    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError {
    let path = path.to_path_buf();
    move |source| ArchiveError::Io { path, source }
}

fn zip_error(path: &Path) -> impl FnOnce(zip::result::ZipError) -> ArchiveError {
    let path = path.to_path_buf();
    move |source| ArchiveError::Zip { path, source }
}
