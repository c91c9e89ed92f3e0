//! Snapshot file naming.
//!
//! The durable catalog snapshot for generation N is named
//! `catalog_<N in base 36>`; generation 0 is the bare prefix. A commit in
//! flight writes `pending_catalog_<N>` and is renamed to the canonical name
//! only at the atomic visibility point, so readers scanning a listing can
//! never pick up a half-written snapshot.

use crate::error::{Result, XystonError};

/// Prefix of a published catalog snapshot.
pub const CATALOG_PREFIX: &str = "catalog";

/// Prefix of an in-flight (not yet visible) catalog snapshot.
pub const PENDING_PREFIX: &str = "pending_catalog";

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Format a generation in base 36 (lowercase).
pub fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 digits are ASCII")
}

/// Parse a base 36 generation suffix.
pub fn parse_base36(text: &str) -> Result<u64> {
    if text.is_empty() {
        return Err(XystonError::corrupt("Empty generation suffix"));
    }

    let mut value: u64 = 0;
    for c in text.bytes() {
        let digit = match c {
            b'0'..=b'9' => (c - b'0') as u64,
            b'a'..=b'z' => (c - b'a') as u64 + 10,
            _ => {
                return Err(XystonError::corrupt(format!(
                    "Invalid base36 digit {:?} in generation suffix '{text}'",
                    c as char
                )));
            }
        };
        value = value
            .checked_mul(36)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| {
                XystonError::corrupt(format!("Generation suffix '{text}' overflows"))
            })?;
    }

    Ok(value)
}

/// File name of the published snapshot for a generation.
pub fn catalog_file_name(generation: u64) -> String {
    file_name_from_generation(CATALOG_PREFIX, generation)
}

/// File name of the in-flight snapshot for a generation.
pub fn pending_file_name(generation: u64) -> String {
    file_name_from_generation(PENDING_PREFIX, generation)
}

fn file_name_from_generation(prefix: &str, generation: u64) -> String {
    if generation == 0 {
        prefix.to_string()
    } else {
        format!("{prefix}_{}", base36(generation))
    }
}

/// Parse the generation out of a published snapshot file name.
///
/// Fails on anything that is not a canonical snapshot name, including
/// pending files.
pub fn generation_from_file_name(file_name: &str) -> Result<u64> {
    if file_name == CATALOG_PREFIX {
        return Ok(0);
    }

    let Some(suffix) = file_name.strip_prefix(CATALOG_PREFIX) else {
        return Err(XystonError::corrupt(format!(
            "'{file_name}' is not a catalog snapshot file"
        )));
    };
    let Some(digits) = suffix.strip_prefix('_') else {
        return Err(XystonError::corrupt(format!(
            "'{file_name}' is not a catalog snapshot file"
        )));
    };

    parse_base36(digits)
}

/// Whether a file name is a published snapshot.
pub fn is_catalog_file(file_name: &str) -> bool {
    file_name == CATALOG_PREFIX
        || (file_name.starts_with(CATALOG_PREFIX)
            && file_name.as_bytes().get(CATALOG_PREFIX.len()) == Some(&b'_'))
}

/// Highest generation among the published snapshots in a listing, or None
/// if the listing holds no snapshot at all.
pub fn latest_generation(files: &[String]) -> Option<u64> {
    let mut max: Option<u64> = None;
    for file in files {
        if is_catalog_file(file)
            && let Ok(generation) = generation_from_file_name(file)
        {
            max = Some(max.map_or(generation, |m| m.max(generation)));
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36_roundtrip() {
        for value in [0u64, 1, 9, 10, 35, 36, 1295, 1296, 46655, u64::MAX] {
            assert_eq!(parse_base36(&base36(value)).unwrap(), value);
        }
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }

    #[test]
    fn test_file_names() {
        assert_eq!(catalog_file_name(0), "catalog");
        assert_eq!(catalog_file_name(1), "catalog_1");
        assert_eq!(catalog_file_name(36), "catalog_10");
        assert_eq!(pending_file_name(0), "pending_catalog");
        assert_eq!(pending_file_name(37), "pending_catalog_11");
    }

    #[test]
    fn test_generation_from_file_name() {
        assert_eq!(generation_from_file_name("catalog").unwrap(), 0);
        assert_eq!(generation_from_file_name("catalog_1").unwrap(), 1);
        assert_eq!(generation_from_file_name("catalog_z").unwrap(), 35);

        assert!(generation_from_file_name("pending_catalog_1").is_err());
        assert!(generation_from_file_name("catalog_!").is_err());
        assert!(generation_from_file_name("segment_1.pst").is_err());
        assert!(generation_from_file_name("catalogue").is_err());
    }

    #[test]
    fn test_is_catalog_file() {
        assert!(is_catalog_file("catalog"));
        assert!(is_catalog_file("catalog_2f"));
        assert!(!is_catalog_file("pending_catalog_2f"));
        assert!(!is_catalog_file("catalogue"));
        assert!(!is_catalog_file("_0.pst"));
    }

    #[test]
    fn test_latest_generation() {
        let files: Vec<String> = [
            "catalog_1",
            "catalog_a",
            "pending_catalog_b",
            "_0.pst",
            "write.lock",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        // "a" is 10; the pending file does not count.
        assert_eq!(latest_generation(&files), Some(10));

        let empty: Vec<String> = vec!["_0.pst".to_string()];
        assert_eq!(latest_generation(&empty), None);
    }
}
