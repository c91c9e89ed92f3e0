//! The segment catalog: ordered segment records plus engine-wide
//! version and generation state.

use std::collections::HashMap;

use ahash::AHashSet;

use crate::catalog::filenames::{base36, catalog_file_name};
use crate::catalog::record::{Id, SegmentRecord};
use crate::catalog::version::{self, Version};
use crate::error::{Result, XystonError};

/// Externally configured limits a catalog enforces.
#[derive(Debug, Clone, Copy)]
pub struct CatalogLimits {
    /// Ceiling on the total `max_doc` across all segments.
    pub max_docs: u64,
}

impl Default for CatalogLimits {
    fn default() -> Self {
        CatalogLimits {
            max_docs: i32::MAX as u64 - 128,
        }
    }
}

/// Ordered collection of [`SegmentRecord`]s with the versioning state the
/// commit protocol persists.
///
/// The active segments of an index are exactly the records of the newest
/// durable catalog snapshot. One logical writer mutates a catalog and
/// commits it; readers load their own instances through discovery and
/// never share mutable state with the writer.
#[derive(Debug, Clone)]
pub struct SegmentCatalog {
    segments: Vec<SegmentRecord>,

    /// Counts how often the catalog has been changed.
    version: u64,

    /// Seed for naming newly created segments.
    counter: u64,

    /// Generation of the snapshot the next commit will write.
    generation: u64,

    /// Generation of the last snapshot durably written or loaded.
    /// Diverges from `generation` only while a commit is in flight or
    /// after a failed one.
    last_generation: u64,

    /// Identifier of the last durable snapshot.
    commit_id: Option<Id>,

    /// Identifier written into a prepared-but-unfinished snapshot.
    pending_commit_id: Option<Id>,

    /// Engine major version recorded when the index was created. Fixed
    /// for the life of the index.
    creation_major: u32,

    /// Opaque user-supplied data carried with every commit.
    user_data: HashMap<String, String>,

    /// True strictly between a prepared and a finished/rolled-back commit.
    pending_commit: bool,

    limits: CatalogLimits,
}

impl SegmentCatalog {
    /// Create an empty catalog for a new index.
    ///
    /// `creation_major` must lie between the oldest interpretable major
    /// and the current engine major.
    pub fn new(creation_major: u32) -> Result<Self> {
        Self::with_limits(creation_major, CatalogLimits::default())
    }

    /// Create an empty catalog with explicit limits.
    pub fn with_limits(creation_major: u32, limits: CatalogLimits) -> Result<Self> {
        if creation_major > version::LATEST.major {
            return Err(XystonError::illegal_state(format!(
                "creation major {creation_major} is in the future (engine is {})",
                version::LATEST
            )));
        }
        if creation_major < version::MIN_CREATION_MAJOR {
            return Err(XystonError::illegal_state(format!(
                "creation major must be >= {}, got {creation_major}",
                version::MIN_CREATION_MAJOR
            )));
        }

        Ok(SegmentCatalog {
            segments: Vec::new(),
            version: 0,
            counter: 0,
            generation: 0,
            last_generation: 0,
            commit_id: None,
            pending_commit_id: None,
            creation_major,
            user_data: HashMap::new(),
            pending_commit: false,
            limits,
        })
    }

    // Used by the snapshot loader, which restores every field itself.
    pub(crate) fn raw_for_load(creation_major: u32, limits: CatalogLimits) -> Self {
        SegmentCatalog {
            segments: Vec::new(),
            version: 0,
            counter: 0,
            generation: 0,
            last_generation: 0,
            commit_id: None,
            pending_commit_id: None,
            creation_major,
            user_data: HashMap::new(),
            pending_commit: false,
            limits,
        }
    }

    /// Engine major version the index was created with.
    pub fn creation_major(&self) -> u32 {
        self.creation_major
    }

    /// Configured limits.
    pub fn limits(&self) -> CatalogLimits {
        self.limits
    }

    /// Change counter of this catalog.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Segment-naming seed.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Generation the next commit will publish.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the last durable snapshot, 0 if none.
    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }

    /// Identifier of the last durable snapshot.
    pub fn commit_id(&self) -> Option<Id> {
        self.commit_id
    }

    /// Whether a commit is currently prepared but not finished.
    pub fn pending_commit(&self) -> bool {
        self.pending_commit
    }

    /// Number of contained segment records.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the catalog holds no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The record at `index`.
    pub fn get(&self, index: usize) -> Option<&SegmentRecord> {
        self.segments.get(index)
    }

    /// Mutable access to the record at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut SegmentRecord> {
        self.segments.get_mut(index)
    }

    /// Iterate the records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, SegmentRecord> {
        self.segments.iter()
    }

    /// Records as an ordered slice.
    pub fn as_slice(&self) -> &[SegmentRecord] {
        &self.segments
    }

    /// Whether a record with the given name is contained.
    pub fn contains_name(&self, name: &str) -> bool {
        self.index_of_name(name).is_some()
    }

    /// Position of the record with the given name.
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.segments.iter().position(|record| record.name == name)
    }

    /// Append a record.
    ///
    /// Rejects duplicates of a contained name, and records missing their
    /// minimum index version when the catalog tracks it.
    pub fn add(&mut self, record: SegmentRecord) -> Result<()> {
        self.validate_record(&record)?;
        if self.contains_name(&record.name) {
            return Err(XystonError::invalid_record(format!(
                "Segment name '{}' is already in the catalog",
                record.name
            )));
        }
        self.segments.push(record);
        Ok(())
    }

    pub(crate) fn validate_record(&self, record: &SegmentRecord) -> Result<()> {
        if self.creation_major >= version::TRACK_MIN_VERSION_MAJOR
            && record.min_index_version.is_none()
        {
            return Err(XystonError::invalid_record(format!(
                "Segment '{}' must record its minimum index version in an index \
                 created by engine {} or later",
                record.name,
                version::TRACK_MIN_VERSION_MAJOR
            )));
        }
        Ok(())
    }

    // Restores records wholesale, e.g. on rollback; validation already
    // happened when the source catalog accepted them.
    pub(crate) fn set_segments(&mut self, segments: Vec<SegmentRecord>) {
        self.segments = segments;
    }

    pub(crate) fn push_unchecked(&mut self, record: SegmentRecord) {
        self.segments.push(record);
    }

    pub(crate) fn segments_mut(&mut self) -> &mut Vec<SegmentRecord> {
        &mut self.segments
    }

    /// Remove a record, matched by name. O(n). Returns whether anything
    /// was removed.
    pub fn remove(&mut self, record: &SegmentRecord) -> bool {
        match self.index_of_name(&record.name) {
            Some(index) => {
                self.segments.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the record at `index`. O(n).
    pub fn remove_at(&mut self, index: usize) -> SegmentRecord {
        self.segments.remove(index)
    }

    /// Drop all records.
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// File name of the last durable snapshot, None before the first
    /// successful commit. Generation 0 is never written by this engine.
    pub fn snapshot_file_name(&self) -> Option<String> {
        if self.last_generation == 0 {
            None
        } else {
            Some(catalog_file_name(self.last_generation))
        }
    }

    /// All file names referenced by the contained records, recomputed on
    /// every call, plus the snapshot file itself if requested.
    pub fn files(&self, include_snapshot_file: bool) -> AHashSet<String> {
        let mut files = AHashSet::new();
        if include_snapshot_file
            && let Some(name) = self.snapshot_file_name()
        {
            files.insert(name);
        }
        for record in &self.segments {
            files.extend(record.files());
        }
        files
    }

    /// Sum of `max_doc` over all records.
    ///
    /// Fails once the configured ceiling is exceeded; the same check runs
    /// when a snapshot is loaded.
    pub fn total_max_doc(&self) -> Result<u64> {
        let total: u64 = self.segments.iter().map(|r| r.max_doc() as u64).sum();
        if total > self.limits.max_docs {
            return Err(XystonError::capacity(format!(
                "Index holds {total} documents, more than the configured ceiling of {}",
                self.limits.max_docs
            )));
        }
        Ok(total)
    }

    /// Minimum index version across contained segments; None iff empty.
    ///
    /// Records from indexes old enough to predate version tracking count
    /// as the oldest interpretable version.
    pub fn min_segment_version(&self) -> Option<Version> {
        self.segments
            .iter()
            .map(|record| {
                record
                    .min_index_version
                    .unwrap_or(Version::new(version::MIN_CREATION_MAJOR, 0, 0))
            })
            .min()
    }

    /// Record one logical mutation. Call before committing whenever the
    /// catalog content changed.
    pub fn changed(&mut self) {
        self.version += 1;
    }

    /// Force the change counter forward, e.g. when adopting state from a
    /// replica that is further ahead.
    pub fn set_version(&mut self, new_version: u64) -> Result<()> {
        if new_version < self.version {
            return Err(XystonError::illegal_state(format!(
                "Cannot decrease version from {} to {new_version}",
                self.version
            )));
        }
        self.version = new_version;
        Ok(())
    }

    /// Opaque user data carried with every commit.
    pub fn user_data(&self) -> &HashMap<String, String> {
        &self.user_data
    }

    /// Replace the user data, optionally counting it as a mutation.
    pub fn set_user_data(&mut self, data: HashMap<String, String>, bump_version: bool) {
        self.user_data = data;
        if bump_version {
            self.changed();
        }
    }

    /// Name for the next newly created segment, consuming one counter
    /// value.
    pub fn next_segment_name(&mut self) -> String {
        let name = format!("_{}", base36(self.counter));
        self.counter += 1;
        name
    }

    /// Deep copy sharing no mutable state with this catalog. Taken before
    /// risky mutation so a failure cannot corrupt the live instance.
    pub fn snapshot(&self) -> SegmentCatalog {
        // No field of a catalog is reference-counted or shared, so a
        // structural clone is already a fully independent copy.
        self.clone()
    }

    /// Carry generation bookkeeping over from another catalog, typically
    /// after committing a snapshot copy of this one.
    pub fn update_generation(&mut self, other: &SegmentCatalog) {
        self.generation = other.generation;
        self.last_generation = other.last_generation;
    }

    /// Carry generation, version and counter over from another catalog.
    pub fn update_generation_version_and_counter(&mut self, other: &SegmentCatalog) {
        self.update_generation(other);
        self.version = other.version;
        self.counter = other.counter;
    }

    /// Set the generation the next commit will use. Generations only move
    /// forward.
    pub fn set_next_write_generation(&mut self, generation: u64) -> Result<()> {
        if generation < self.generation {
            return Err(XystonError::illegal_state(format!(
                "Cannot decrease generation from {} to {generation}",
                self.generation
            )));
        }
        self.generation = generation;
        Ok(())
    }

    /// Adopt another catalog's records and user data, keeping this
    /// instance's version/counter so future commits stay write-once.
    pub fn replace_with(&mut self, other: &SegmentCatalog) {
        self.segments = other.segments.iter().map(|r| r.snapshot()).collect();
        self.last_generation = other.last_generation;
        self.user_data = other.user_data.clone();
    }

    pub(crate) fn set_counter(&mut self, counter: u64) {
        self.counter = counter;
    }

    pub(crate) fn set_loaded_version(&mut self, version: u64) {
        self.version = version;
    }

    pub(crate) fn set_generations(&mut self, generation: u64, last_generation: u64) {
        self.generation = generation;
        self.last_generation = last_generation;
    }

    pub(crate) fn set_commit_id(&mut self, id: Option<Id>) {
        self.commit_id = id;
    }

    pub(crate) fn pending_commit_id(&self) -> Option<Id> {
        self.pending_commit_id
    }

    pub(crate) fn set_pending_commit_id(&mut self, id: Option<Id>) {
        self.pending_commit_id = id;
    }

    pub(crate) fn set_pending_commit(&mut self, pending: bool) {
        self.pending_commit = pending;
    }

    pub(crate) fn set_user_data_raw(&mut self, data: HashMap<String, String>) {
        self.user_data = data;
    }
}
