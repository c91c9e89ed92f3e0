//! Segment catalog and its crash-consistent commit protocol.
//!
//! The catalog is the record of which segments make up an index. A writer
//! mutates a [`SegmentCatalog`] in memory (adding flushed segments,
//! splicing merges with [`apply_merge_changes`]) and publishes it with a
//! [`Committer`]; readers find the newest published snapshot with
//! [`Discovery`] and never coordinate with the writer.

pub mod catalog;
pub mod commit;
pub mod discover;
pub mod filenames;
pub mod format;
pub mod merge;
pub mod record;
pub mod version;

// Re-export commonly used types
pub use catalog::{CatalogLimits, SegmentCatalog};
pub use commit::Committer;
pub use discover::{Discovery, DiscoveryConfig};
pub use filenames::{
    CATALOG_PREFIX, PENDING_PREFIX, catalog_file_name, generation_from_file_name,
    is_catalog_file, latest_generation, pending_file_name,
};
pub use format::{FORMAT_CURRENT, FORMAT_START, LoadOptions, read_catalog, write_catalog};
pub use merge::{MergeChanges, apply_merge_changes};
pub use record::{ID_LENGTH, Id, NO_GENERATION, SegmentRecord, id_to_string, random_id};
pub use version::Version;
