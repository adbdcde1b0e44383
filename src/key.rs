//! RSA key material: the staged replacement key and the signing keystore.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use x509_cert::der::DecodePem;
use x509_cert::Certificate;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} does not hold an RSA private key in PKCS#8 or PKCS#1 PEM form")]
    NotRsaKey { path: PathBuf },

    #[error("failed to decrypt keystore {path}: {message}")]
    Keystore { path: PathBuf, message: String },

    #[error("keystore {path} has no usable certificate: {message}")]
    Certificate { path: PathBuf, message: String },
}

/// The signing identity held by a keystore: one key and its certificate.
#[derive(Debug, Clone)]
pub struct Keystore {
    pub key: RsaPrivateKey,
    pub certificate: Certificate,
}

/// Load an unencrypted RSA private key (`PRIVATE KEY` or `RSA PRIVATE KEY`).
pub fn read_private_key(path: &Path) -> Result<RsaPrivateKey, KeyError> {
    let pem = read_pem(path)?;

    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|_| KeyError::NotRsaKey {
            path: path.to_path_buf(),
        })
}

/// Load a PEM keystore: an `ENCRYPTED PRIVATE KEY` block protected by
/// `passphrase` followed by the `CERTIFICATE` block for that key.
pub fn read_keystore(path: &Path, passphrase: &str) -> Result<Keystore, KeyError> {
    let pem = read_pem(path)?;

    let key_block = pem_block(&pem, "ENCRYPTED PRIVATE KEY").ok_or_else(|| KeyError::Keystore {
        path: path.to_path_buf(),
        message: "no ENCRYPTED PRIVATE KEY block".to_string(),
    })?;
    let key = RsaPrivateKey::from_pkcs8_encrypted_pem(key_block, passphrase.as_bytes()).map_err(|e| {
        KeyError::Keystore {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    let certificate_error = |message: String| KeyError::Certificate {
        path: path.to_path_buf(),
        message,
    };
    let cert_block =
        pem_block(&pem, "CERTIFICATE").ok_or_else(|| certificate_error("no CERTIFICATE block".to_string()))?;
    let certificate = Certificate::from_pem(cert_block).map_err(|e| certificate_error(e.to_string()))?;

    Ok(Keystore { key, certificate })
}

/// The first PEM block labelled `label`, boundaries included.
fn pem_block<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = text.find(&begin)?;
    let stop = text[start..].find(&end)? + start + end.len();
    Some(&text[start..stop])
}

/// Modulus of `key` as lowercase hex without leading zeros.
pub fn modulus_hex(key: &RsaPrivateKey) -> String {
    key.n().to_str_radix(16)
}

fn read_pem(path: &Path) -> Result<String, KeyError> {
    fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
