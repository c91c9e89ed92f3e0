//! Per-segment identity and commit metadata.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::catalog::filenames::base36;
use crate::catalog::version::Version;
use crate::error::{Result, XystonError};

/// Length of segment and commit identifiers, in bytes.
pub const ID_LENGTH: usize = 16;

/// A fixed-length opaque identifier.
pub type Id = [u8; ID_LENGTH];

/// Generate a fresh random identifier.
pub fn random_id() -> Id {
    Uuid::new_v4().into_bytes()
}

/// Render an identifier for messages and CLI output.
pub fn id_to_string(id: &Id) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}

/// Value a generation counter holds before any update of its kind exists.
pub const NO_GENERATION: i64 = -1;

/// One segment's identity and mutable commit metadata.
///
/// A record is created when a segment is flushed or produced by a merge,
/// mutated as deletes and field updates are applied, and becomes garbage
/// only once no catalog generation references it — deletion policy is the
/// caller's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    /// Unique name within a catalog; also the file-name prefix of the
    /// segment's files.
    pub name: String,

    /// Opaque identifier, unique per record.
    pub id: Id,

    /// Name of the body format, resolved through the codec registry.
    pub codec_name: String,

    /// Document count fixed at segment creation.
    max_doc: u32,

    /// Minimum engine version across the files this segment references.
    /// Required for catalogs created at or after the tracking threshold.
    pub min_index_version: Option<Version>,

    del_generation: i64,
    field_infos_generation: i64,
    doc_values_generation: i64,

    del_count: u32,
    soft_del_count: u32,

    /// Identifier stamped when the record was last serialized into a
    /// snapshot; None for records read from legacy snapshots.
    pub commit_id: Option<Id>,

    /// Files holding field-infos updates.
    field_infos_files: HashSet<String>,

    /// Files holding doc-values updates, keyed by field number.
    doc_values_update_files: HashMap<u32, HashSet<String>>,
}

impl SegmentRecord {
    /// Create a record for a freshly flushed or merged segment.
    pub fn new(
        name: impl Into<String>,
        id: Id,
        codec_name: impl Into<String>,
        max_doc: u32,
        min_index_version: Option<Version>,
    ) -> Self {
        SegmentRecord {
            name: name.into(),
            id,
            codec_name: codec_name.into(),
            max_doc,
            min_index_version,
            del_generation: NO_GENERATION,
            field_infos_generation: NO_GENERATION,
            doc_values_generation: NO_GENERATION,
            del_count: 0,
            soft_del_count: 0,
            commit_id: None,
            field_infos_files: HashSet::new(),
            doc_values_update_files: HashMap::new(),
        }
    }

    /// Document count of this segment, deletions included.
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Number of hard-deleted documents.
    pub fn del_count(&self) -> u32 {
        self.del_count
    }

    /// Number of soft-deleted documents.
    pub fn soft_del_count(&self) -> u32 {
        self.soft_del_count
    }

    /// Documents neither hard- nor soft-deleted.
    pub fn live_doc_count(&self) -> u32 {
        self.max_doc - self.del_count - self.soft_del_count
    }

    /// Whether any hard deletes exist.
    pub fn has_deletions(&self) -> bool {
        self.del_generation != NO_GENERATION
    }

    /// Generation of the live-docs file, or [`NO_GENERATION`].
    pub fn del_generation(&self) -> i64 {
        self.del_generation
    }

    /// Generation of the field-infos updates, or [`NO_GENERATION`].
    pub fn field_infos_generation(&self) -> i64 {
        self.field_infos_generation
    }

    /// Generation of the doc-values updates, or [`NO_GENERATION`].
    pub fn doc_values_generation(&self) -> i64 {
        self.doc_values_generation
    }

    /// Set the hard-delete count.
    pub fn set_del_count(&mut self, del_count: u32) -> Result<()> {
        self.validate_counts(del_count, self.soft_del_count)?;
        self.del_count = del_count;
        Ok(())
    }

    /// Set the soft-delete count.
    pub fn set_soft_del_count(&mut self, soft_del_count: u32) -> Result<()> {
        self.validate_counts(self.del_count, soft_del_count)?;
        self.soft_del_count = soft_del_count;
        Ok(())
    }

    fn validate_counts(&self, del_count: u32, soft_del_count: u32) -> Result<()> {
        let total = del_count as u64 + soft_del_count as u64;
        if total > self.max_doc as u64 {
            return Err(XystonError::invalid_record(format!(
                "Segment '{}': delCount {del_count} + softDelCount {soft_del_count} \
                 exceeds maxDoc {}",
                self.name, self.max_doc
            )));
        }
        Ok(())
    }

    /// Advance the live-docs generation. Generations only move forward.
    pub fn set_del_generation(&mut self, generation: i64) -> Result<()> {
        Self::check_monotonic("delGeneration", self.del_generation, generation)?;
        self.del_generation = generation;
        Ok(())
    }

    /// Advance the field-infos generation.
    pub fn set_field_infos_generation(&mut self, generation: i64) -> Result<()> {
        Self::check_monotonic(
            "fieldInfosGeneration",
            self.field_infos_generation,
            generation,
        )?;
        self.field_infos_generation = generation;
        Ok(())
    }

    /// Advance the doc-values generation.
    pub fn set_doc_values_generation(&mut self, generation: i64) -> Result<()> {
        Self::check_monotonic(
            "docValuesGeneration",
            self.doc_values_generation,
            generation,
        )?;
        self.doc_values_generation = generation;
        Ok(())
    }

    fn check_monotonic(what: &str, current: i64, next: i64) -> Result<()> {
        if next < current {
            return Err(XystonError::illegal_state(format!(
                "Cannot decrease {what} from {current} to {next}"
            )));
        }
        Ok(())
    }

    /// Files holding field-infos updates.
    pub fn field_infos_files(&self) -> &HashSet<String> {
        &self.field_infos_files
    }

    /// Replace the field-infos update file set.
    pub fn set_field_infos_files(&mut self, files: HashSet<String>) {
        self.field_infos_files = files;
    }

    /// Files holding doc-values updates, keyed by field number.
    pub fn doc_values_update_files(&self) -> &HashMap<u32, HashSet<String>> {
        &self.doc_values_update_files
    }

    /// Replace the doc-values update file map.
    pub fn set_doc_values_update_files(&mut self, files: HashMap<u32, HashSet<String>>) {
        self.doc_values_update_files = files;
    }

    /// Name of the live-docs file for the current delete generation.
    pub fn live_docs_file_name(&self) -> Option<String> {
        if self.del_generation == NO_GENERATION {
            None
        } else {
            Some(format!(
                "{}_{}.liv",
                self.name,
                base36(self.del_generation as u64)
            ))
        }
    }

    /// All file names this record references. Recomputed on every call.
    pub fn files(&self) -> HashSet<String> {
        let mut files = HashSet::new();
        if let Some(live_docs) = self.live_docs_file_name() {
            files.insert(live_docs);
        }
        files.extend(self.field_infos_files.iter().cloned());
        for set in self.doc_values_update_files.values() {
            files.extend(set.iter().cloned());
        }
        files
    }

    /// Deep copy sharing no mutable state with this record.
    pub fn snapshot(&self) -> SegmentRecord {
        self.clone()
    }

    // Stamped by the snapshot writer so every record written by a current
    // format carries the id of the commit that persisted it.
    pub(crate) fn stamp_commit_id(&mut self, id: Id) {
        self.commit_id = Some(id);
    }
}
