//! Shared helpers for integration tests: archive builders and fixtures.

#![allow(dead_code)]

use artifact_patcher::strategy::{encode_port, LOOPBACK_PATTERN};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Modulus of the fixture key as lowercase hex.
pub const FIXTURE_MODULUS: &str = "a26e1d2900e3764a80fe99f69883de178b6943598b21b12df39083ceec4faeef48bc2c24770d5be0c44b0b901522d98db4f03f0b1afda321aab785a289b421a577250edae3d303ecf75596c201dd8ecb9c4ca105ab7d9e6cf2f497ac0dde11cad446047f9e090b9cc63eb0d08dc2cd9259b0418c7fc9b1dc6d9db4f7b3bb3891";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Write a zip archive. Names ending in `/` become directory entries.
pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// File entries of a zip archive by name.
pub fn read_jar(path: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entries = BTreeMap::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).unwrap();
        if entry.is_dir() {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.insert(entry.name().to_string(), content);
    }
    entries
}

/// Entry names of a zip archive in archive order, directories included.
pub fn jar_names(path: &Path) -> Vec<String> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

/// A class body holding the length-prefixed loopback string.
pub fn loopback_class() -> Vec<u8> {
    [&b"\xca\xfe\xba\xbe\x01"[..], LOOPBACK_PATTERN, &b"\x07host"[..]].concat()
}

/// A class body holding the exponent marker and a 256-digit modulus.
pub fn modulus_class(modulus: &[u8]) -> Vec<u8> {
    let mut bytes = b"\xca\xfe\xba\xbe\x01\x00\x0510001\x01".to_vec();
    bytes.extend_from_slice(&(modulus.len() as u16).to_be_bytes());
    bytes.extend_from_slice(modulus);
    bytes.extend_from_slice(b"\x07");
    bytes
}

/// A class body holding the encoded port.
pub fn port_class(port: u16) -> Vec<u8> {
    [&b"\xca\xfe\xba\xbe"[..], &encode_port(port)[..], &b"\x01"[..]].concat()
}

/// Write `content` at `root/relative`, creating parents.
pub fn put(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
