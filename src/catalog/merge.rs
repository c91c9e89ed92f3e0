//! Atomic in-memory splice of merge results into a catalog.

use std::collections::HashSet;

use crate::catalog::catalog::SegmentCatalog;
use crate::catalog::record::SegmentRecord;
use crate::error::{Result, XystonError};

/// The outcome of one merge, ready to be spliced into a catalog.
#[derive(Debug, Clone)]
pub struct MergeChanges {
    /// Names of the segments consumed by the merge.
    pub merged_away: HashSet<String>,

    /// The segment the merge produced.
    pub replacement: SegmentRecord,

    /// True when the merge yielded no live documents, so nothing is
    /// inserted in place of the merged segments.
    pub drop_segment: bool,
}

/// Replace the merged-away segments with the merge result in one pass.
///
/// The replacement lands at the position of the first merged-away record;
/// all other records keep their relative order. If none of the merged-away
/// segments remain — a concurrent operation already removed them — the
/// replacement is inserted at the head rather than silently dropped, since
/// its documents exist nowhere else.
///
/// The catalog is untouched when validation fails.
pub fn apply_merge_changes(catalog: &mut SegmentCatalog, merge: MergeChanges) -> Result<()> {
    catalog.validate_record(&merge.replacement)?;
    let total =
        merge.replacement.del_count() as u64 + merge.replacement.soft_del_count() as u64;
    if total > merge.replacement.max_doc() as u64 {
        return Err(XystonError::invalid_record(format!(
            "Merged segment '{}': {total} deletions exceed maxDoc {}",
            merge.replacement.name,
            merge.replacement.max_doc()
        )));
    }

    let MergeChanges {
        merged_away,
        replacement,
        drop_segment,
    } = merge;

    let segments = catalog.segments_mut();
    let mut inserted = false;
    let mut write = 0;

    for read in 0..segments.len() {
        if merged_away.contains(&segments[read].name) {
            if !inserted && !drop_segment {
                // First merged-away slot; everything before it was kept,
                // so read == write and this overwrites a merged record.
                segments[write] = replacement.snapshot();
                inserted = true;
                write += 1;
            }
        } else {
            if read != write {
                segments.swap(read, write);
            }
            write += 1;
        }
    }

    segments.truncate(write);

    if !inserted && !drop_segment {
        segments.insert(0, replacement);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::record::random_id;
    use crate::catalog::version::Version;
    use crate::codec::DEFAULT_CODEC_NAME;

    fn test_record(name: &str, max_doc: u32) -> SegmentRecord {
        SegmentRecord::new(
            name,
            random_id(),
            DEFAULT_CODEC_NAME,
            max_doc,
            Some(Version::new(8, 0, 0)),
        )
    }

    fn names(catalog: &SegmentCatalog) -> Vec<&str> {
        catalog.iter().map(|r| r.name.as_str()).collect()
    }

    fn merged(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_replacement_takes_first_merged_position() {
        let mut catalog = SegmentCatalog::new(8).unwrap();
        let mut a = test_record("_a", 10);
        a.set_del_count(0).unwrap();
        let mut b = test_record("_b", 5);
        b.set_del_generation(1).unwrap();
        b.set_del_count(1).unwrap();
        catalog.add(a).unwrap();
        catalog.add(b).unwrap();

        apply_merge_changes(
            &mut catalog,
            MergeChanges {
                merged_away: merged(&["_a", "_b"]),
                replacement: test_record("_m", 14),
                drop_segment: false,
            },
        )
        .unwrap();

        assert_eq!(names(&catalog), vec!["_m"]);
    }

    #[test]
    fn test_drop_segment_removes_without_insert() {
        let mut catalog = SegmentCatalog::new(8).unwrap();
        catalog.add(test_record("_a", 10)).unwrap();
        catalog.add(test_record("_b", 5)).unwrap();

        apply_merge_changes(
            &mut catalog,
            MergeChanges {
                merged_away: merged(&["_a", "_b"]),
                replacement: test_record("_m", 0),
                drop_segment: true,
            },
        )
        .unwrap();

        assert!(catalog.is_empty());
    }

    #[test]
    fn test_unmerged_records_keep_relative_order() {
        let mut catalog = SegmentCatalog::new(8).unwrap();
        for name in ["_0", "_1", "_2", "_3", "_4"] {
            catalog.add(test_record(name, 10)).unwrap();
        }

        apply_merge_changes(
            &mut catalog,
            MergeChanges {
                merged_away: merged(&["_1", "_3"]),
                replacement: test_record("_m", 20),
                drop_segment: false,
            },
        )
        .unwrap();

        assert_eq!(names(&catalog), vec!["_0", "_m", "_2", "_4"]);
    }

    #[test]
    fn test_already_removed_inserts_at_head() {
        let mut catalog = SegmentCatalog::new(8).unwrap();
        catalog.add(test_record("_x", 10)).unwrap();

        // The merged-away segments were concurrently dropped already.
        apply_merge_changes(
            &mut catalog,
            MergeChanges {
                merged_away: merged(&["_a", "_b"]),
                replacement: test_record("_m", 20),
                drop_segment: false,
            },
        )
        .unwrap();

        assert_eq!(names(&catalog), vec!["_m", "_x"]);
    }

    #[test]
    fn test_already_removed_with_drop_is_noop() {
        let mut catalog = SegmentCatalog::new(8).unwrap();
        catalog.add(test_record("_x", 10)).unwrap();

        apply_merge_changes(
            &mut catalog,
            MergeChanges {
                merged_away: merged(&["_a"]),
                replacement: test_record("_m", 0),
                drop_segment: true,
            },
        )
        .unwrap();

        assert_eq!(names(&catalog), vec!["_x"]);
    }

    #[test]
    fn test_replacement_must_record_min_version() {
        let mut catalog = SegmentCatalog::new(8).unwrap();
        catalog.add(test_record("_a", 10)).unwrap();

        let replacement = SegmentRecord::new("_m", random_id(), DEFAULT_CODEC_NAME, 10, None);
        let result = apply_merge_changes(
            &mut catalog,
            MergeChanges {
                merged_away: merged(&["_a"]),
                replacement,
                drop_segment: false,
            },
        );

        assert!(matches!(result, Err(XystonError::InvalidRecord(_))));
        // Validation failure leaves the catalog untouched.
        assert_eq!(names(&catalog), vec!["_a"]);
    }

    #[test]
    fn test_merge_of_middle_run() {
        let mut catalog = SegmentCatalog::new(8).unwrap();
        for name in ["_0", "_1", "_2", "_3"] {
            catalog.add(test_record(name, 10)).unwrap();
        }

        apply_merge_changes(
            &mut catalog,
            MergeChanges {
                merged_away: merged(&["_0", "_2"]),
                replacement: test_record("_m", 20),
                drop_segment: false,
            },
        )
        .unwrap();

        assert_eq!(names(&catalog), vec!["_m", "_1", "_3"]);
    }
}
