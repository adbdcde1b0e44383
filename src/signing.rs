//! Re-signing of repackaged archives.
//!
//! Patching invalidates any signature an archive carried. The pipeline strips
//! the stale signature metadata and, through an [`ArchiveSigner`], writes a
//! fresh JAR signature: a manifest of SHA-256 entry digests, a `.SF`
//! signature file over it, and a `.RSA` block holding a CMS SignedData with
//! the keystore's certificate. The bundled keystore is not a secret and the
//! certificate is self-signed.
//!
//! The manifest is always regenerated. Main attributes of a previous manifest
//! such as `Main-Class` are not carried over.

use crate::archive::{MANIFEST_FILE, SIGNATURE_DIR};
use crate::key::{read_keystore, KeyError, Keystore};
use base64::prelude::*;
use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
use rsa::pkcs1v15::{Signature, SigningKey};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use x509_cert::der::oid::db::{rfc5911::ID_DATA, rfc5912::ID_SHA_256};
use x509_cert::der::Encode;
use x509_cert::spki::AlgorithmIdentifierOwned;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// File extensions of signature blocks and signature lists.
const SIGNATURE_EXTENSIONS: &[&str] = &["SF", "RSA", "DSA", "EC"];
/// Longest manifest line in bytes, excluding the line break.
const MAX_LINE: usize = 72;
const CREATED_BY: &str = concat!("artifact-patcher ", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("keystore unusable: {0}")]
    Key(#[from] KeyError),

    #[error("signing I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed archive {path}: {source}")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("signature computation failed: {0}")]
    Signature(String),
}

/// What happened to an archive handed to a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "SignOutcome reports whether the archive is actually signed"]
pub enum SignOutcome {
    Signed { alias: String },
    /// Archive left unsigned; the reason has been logged
    Unsigned { reason: String },
}

/// Signs an archive in place.
pub trait ArchiveSigner {
    fn sign(&self, archive: &Path) -> Result<SignOutcome, SigningError>;
}

/// Signs with the single key entry of a passphrase-protected PEM keystore.
#[derive(Debug, Clone)]
pub struct KeystoreSigner {
    keystore: PathBuf,
    passphrase: String,
    alias: String,
}

impl KeystoreSigner {
    pub fn new(keystore: impl Into<PathBuf>, passphrase: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            keystore: keystore.into(),
            passphrase: passphrase.into(),
            alias: alias.into(),
        }
    }

    /// Base name of the `.SF` and `.RSA` entries.
    fn signature_name(&self) -> String {
        self.alias.to_ascii_uppercase()
    }
}

impl ArchiveSigner for KeystoreSigner {
    fn sign(&self, archive: &Path) -> Result<SignOutcome, SigningError> {
        if !self.keystore.is_file() {
            let reason = format!("keystore not found at {}", self.keystore.display());
            tracing::error!(archive = %archive.display(), %reason, "unable to sign archive, shipping it unsigned");
            return Ok(SignOutcome::Unsigned { reason });
        }

        let keystore = read_keystore(&self.keystore, &self.passphrase)?;

        let parent = archive.parent().unwrap_or_else(|| Path::new("."));
        let signed = tempfile::Builder::new()
            .prefix(".signing-")
            .suffix(".jar")
            .tempfile_in(parent)
            .map_err(io_error(parent))?;

        write_signed(archive, signed.path(), &keystore, &self.signature_name())?;

        signed
            .persist(archive)
            .map_err(|e| io_error(archive)(e.error))?;

        Ok(SignOutcome::Signed {
            alias: self.alias.clone(),
        })
    }
}

/// Whether an exploded archive carries signature metadata.
pub fn is_signed(dir: &Path) -> io::Result<bool> {
    let meta_inf = dir.join(SIGNATURE_DIR);
    if !meta_inf.is_dir() {
        return Ok(false);
    }

    for entry in fs::read_dir(&meta_inf)? {
        let entry = entry?;
        if entry.file_type()?.is_file() && is_signature_file(&entry.file_name().to_string_lossy()) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_signature_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| SIGNATURE_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Entries regenerated by signing rather than copied.
fn is_signing_entry(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(SIGNATURE_DIR).and_then(|r| r.strip_prefix('/')) else {
        return false;
    };
    rest.is_empty() || rest.eq_ignore_ascii_case(MANIFEST_FILE) || (!rest.contains('/') && is_signature_file(rest))
}

/// Write a signed copy of `input` to `output`.
fn write_signed(input: &Path, output: &Path, keystore: &Keystore, signature_name: &str) -> Result<(), SigningError> {
    let file = File::open(input).map_err(io_error(input))?;
    let mut zip_in = ZipArchive::new(BufReader::new(file)).map_err(zip_error(input))?;

    let mut digests = Vec::new();
    for index in 0..zip_in.len() {
        let mut entry = zip_in.by_index(index).map_err(zip_error(input))?;
        let name = entry.name().to_string();
        if entry.is_dir() || is_signing_entry(&name) {
            continue;
        }

        let mut hasher = Sha256::new();
        io::copy(&mut entry, &mut hasher).map_err(io_error(input))?;
        digests.push((name, BASE64_STANDARD.encode(hasher.finalize())));
    }

    let (manifest, sections) = build_manifest(&digests);
    let signature_file = build_signature_file(&manifest, &sections);
    let signature_block = build_signature_block(keystore, &signature_file)?;

    let out = File::create(output).map_err(io_error(output))?;
    let mut zip_out = ZipWriter::new(BufWriter::new(out));
    zip_out.set_comment(String::from_utf8_lossy(zip_in.comment()).into_owned());

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let generated: [(String, &[u8]); 3] = [
        (format!("{SIGNATURE_DIR}/{MANIFEST_FILE}"), &manifest),
        (format!("{SIGNATURE_DIR}/{signature_name}.SF"), &signature_file),
        (format!("{SIGNATURE_DIR}/{signature_name}.RSA"), &signature_block),
    ];

    zip_out
        .add_directory(format!("{SIGNATURE_DIR}/"), options)
        .map_err(zip_error(output))?;
    for (name, content) in generated {
        zip_out.start_file(name, options).map_err(zip_error(output))?;
        zip_out.write_all(content).map_err(io_error(output))?;
    }

    for index in 0..zip_in.len() {
        let entry = zip_in.by_index_raw(index).map_err(zip_error(input))?;
        if is_signing_entry(entry.name()) {
            continue;
        }
        zip_out.raw_copy_file(entry).map_err(zip_error(output))?;
    }

    let mut writer = zip_out.finish().map_err(zip_error(output))?;
    writer.flush().map_err(io_error(output))?;
    Ok(())
}

/// DER `ContentInfo` of a detached SignedData over `signature_file`, signed
/// with SHA-256 and RSA and carrying the keystore certificate.
fn build_signature_block(keystore: &Keystore, signature_file: &[u8]) -> Result<Vec<u8>, SigningError> {
    let signer = SigningKey::<Sha256>::new(keystore.key.clone());
    let content_digest = Sha256::digest(signature_file);
    let content = EncapsulatedContentInfo {
        econtent_type: ID_DATA,
        econtent: None,
    };
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: ID_SHA_256,
        parameters: None,
    };

    let tbs = &keystore.certificate.tbs_certificate;
    let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: tbs.issuer.clone(),
        serial_number: tbs.serial_number.clone(),
    });

    let signer_info = SignerInfoBuilder::new(
        &signer,
        sid,
        digest_algorithm.clone(),
        &content,
        Some(content_digest.as_slice()),
    )
    .map_err(cms_error)?;

    let mut builder = SignedDataBuilder::new(&content);
    builder
        .add_digest_algorithm(digest_algorithm)
        .map_err(cms_error)?
        .add_certificate(CertificateChoices::Certificate(keystore.certificate.clone()))
        .map_err(cms_error)?
        .add_signer_info::<SigningKey<Sha256>, Signature>(signer_info)
        .map_err(cms_error)?;

    builder
        .build()
        .map_err(cms_error)?
        .to_der()
        .map_err(|e| SigningError::Signature(e.to_string()))
}

fn cms_error(e: cms::builder::Error) -> SigningError {
    SigningError::Signature(e.to_string())
}

fn main_section() -> Vec<u8> {
    let mut section = Vec::new();
    push_header(&mut section, "Manifest-Version", "1.0");
    push_header(&mut section, "Created-By", CREATED_BY);
    section
}

/// Manifest bytes plus each per-entry section as it appears in the manifest.
fn build_manifest(digests: &[(String, String)]) -> (Vec<u8>, Vec<(String, Vec<u8>)>) {
    let mut manifest = main_section();
    manifest.extend_from_slice(b"\r\n");

    let mut sections = Vec::with_capacity(digests.len());
    for (name, digest) in digests {
        let mut section = Vec::new();
        push_header(&mut section, "Name", name);
        push_header(&mut section, "SHA-256-Digest", digest);
        section.extend_from_slice(b"\r\n");

        manifest.extend_from_slice(&section);
        sections.push((name.clone(), section));
    }
    (manifest, sections)
}

fn build_signature_file(manifest: &[u8], sections: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    push_header(&mut out, "Signature-Version", "1.0");
    push_header(&mut out, "SHA-256-Digest-Manifest", &BASE64_STANDARD.encode(Sha256::digest(manifest)));
    push_header(&mut out, "Created-By", CREATED_BY);
    out.extend_from_slice(b"\r\n");

    for (name, section) in sections {
        push_header(&mut out, "Name", name);
        push_header(&mut out, "SHA-256-Digest", &BASE64_STANDARD.encode(Sha256::digest(section)));
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Append `key: value`, wrapped into 72-byte lines with space continuations.
fn push_header(out: &mut Vec<u8>, key: &str, value: &str) {
    let line = format!("{key}: {value}");
    let (first, mut rest) = line.as_bytes().split_at(line.len().min(MAX_LINE));
    out.extend_from_slice(first);
    out.extend_from_slice(b"\r\n");

    while !rest.is_empty() {
        let (chunk, tail) = rest.split_at(rest.len().min(MAX_LINE - 1));
        out.push(b' ');
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
        rest = tail;
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SigningError {
    let path = path.to_path_buf();
    move |source| SigningError::Io { path, source }
}

fn zip_error(path: &Path) -> impl FnOnce(zip::result::ZipError) -> SigningError {
    let path = path.to_path_buf();
    move |source| SigningError::Zip { path, source }
}
