//! Byte search and framing primitives.
//!
//! The patched binaries are opaque: there is no parser for their format.
//! Every strategy locates its target with [`index_of`] and rewrites it with
//! one of the framing helpers below, which understand exactly two shapes:
//! a 2-byte big-endian length-prefixed string and a fixed-width value that is
//! overwritten in place.

use std::ops::Range;
use thiserror::Error;

/// Largest value a 2-byte length prefix can describe.
pub const MAX_PREFIXED_LEN: usize = u16::MAX as usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("no room for a 2-byte length prefix before offset {offset}")]
    MissingPrefix { offset: usize },

    #[error("length prefix before offset {offset} declares {declared} bytes but only {available} remain")]
    TruncatedValue {
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("replacement of {len} bytes does not fit a 2-byte length prefix")]
    TooLong { len: usize },

    #[error("fixed-width values differ in width: {search} vs {replace} bytes")]
    WidthMismatch { search: usize, replace: usize },
}

/// First offset at which `needle` occurs in `haystack`.
///
/// Returns `None` when the needle is absent, including when it is longer than
/// the haystack. An empty needle matches at offset 0.
pub fn index_of(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    index_of_from(haystack, needle, 0)
}

/// Like [`index_of`], but only considers matches starting at or after `from`.
pub fn index_of_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    if needle.is_empty() {
        return Some(from);
    }

    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Read the big-endian length prefix stored in the two bytes before `start`.
pub fn read_length_prefix(bytes: &[u8], start: usize) -> Result<usize, FramingError> {
    if start < 2 || start > bytes.len() {
        return Err(FramingError::MissingPrefix { offset: start });
    }
    Ok(u16::from_be_bytes([bytes[start - 2], bytes[start - 1]]) as usize)
}

/// Replace the length-prefixed string whose data begins at `start`.
///
/// The prefix at `start - 2` is rewritten to `replacement.len()` and every
/// byte after the old value is shifted by the size delta. Bytes before the
/// prefix and after the old value are carried over unchanged.
pub fn rewrite_length_prefixed(
    source: &[u8],
    start: usize,
    replacement: &[u8],
) -> Result<Vec<u8>, FramingError> {
    if replacement.len() > MAX_PREFIXED_LEN {
        return Err(FramingError::TooLong {
            len: replacement.len(),
        });
    }

    let old_len = read_length_prefix(source, start)?;
    let end = start + old_len;
    if end > source.len() {
        return Err(FramingError::TruncatedValue {
            offset: start,
            declared: old_len,
            available: source.len() - start,
        });
    }

    let mut out = Vec::with_capacity(source.len() - old_len + replacement.len());
    out.extend_from_slice(&source[..start - 2]);
    out.extend_from_slice(&(replacement.len() as u16).to_be_bytes());
    out.extend_from_slice(replacement);
    out.extend_from_slice(&source[end..]);
    Ok(out)
}

/// Overwrite every non-overlapping occurrence of `search` with `replace`.
///
/// Both values must have the same width so the buffer length never changes.
/// Returns the number of occurrences rewritten.
pub fn overwrite_fixed(
    bytes: &mut [u8],
    search: &[u8],
    replace: &[u8],
) -> Result<usize, FramingError> {
    if search.len() != replace.len() {
        return Err(FramingError::WidthMismatch {
            search: search.len(),
            replace: replace.len(),
        });
    }
    if search.is_empty() {
        return Ok(0);
    }

    let mut count = 0;
    let mut from = 0;
    while let Some(index) = index_of_from(bytes, search, from) {
        bytes[index..index + replace.len()].copy_from_slice(replace);
        count += 1;
        from = index + search.len();
    }
    Ok(count)
}

/// ASCII hex digit, either case.
pub fn is_hex_digit(byte: u8) -> bool {
    byte.is_ascii_hexdigit()
}

/// First maximal run of accepted bytes that is at least `min_len` long.
///
/// Shorter runs are skipped. The returned range covers the whole run, so a
/// caller that needs an exact width can detect an over-long run by comparing
/// its length.
pub fn find_run(bytes: &[u8], min_len: usize, accept: impl Fn(u8) -> bool) -> Option<Range<usize>> {
    let mut start = 0;
    while start < bytes.len() {
        if !accept(bytes[start]) {
            start += 1;
            continue;
        }

        let end = bytes[start..]
            .iter()
            .position(|&b| !accept(b))
            .map_or(bytes.len(), |pos| start + pos);

        if end - start >= min_len.max(1) {
            return Some(start..end);
        }
        start = end;
    }
    None
}
