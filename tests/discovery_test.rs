//! Integration tests for race-tolerant snapshot discovery.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use xyston::catalog::{
    Committer, Discovery, DiscoveryConfig, SegmentCatalog, SegmentRecord, Version, random_id,
};
use xyston::codec::{CodecRegistry, DEFAULT_CODEC_NAME};
use xyston::error::{Result, XystonError};
use xyston::observer::noop_sink;
use xyston::storage::{
    FileMetadata, MemoryStorage, Storage, StorageInput, StorageOutput,
};

fn test_record(name: &str, max_doc: u32) -> SegmentRecord {
    SegmentRecord::new(
        name,
        random_id(),
        DEFAULT_CODEC_NAME,
        max_doc,
        Some(Version::new(8, 0, 0)),
    )
}

/// Commit `generations` snapshots into a fresh memory storage.
fn committed_storage(generations: u32) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new_default());
    let committer = Committer::new(storage.clone());
    let mut catalog = SegmentCatalog::new(8).unwrap();

    for g in 0..generations {
        catalog.add(test_record(&format!("_{g}"), 10)).unwrap();
        catalog.changed();
        committer.commit(&mut catalog).unwrap();
    }
    storage
}

fn registry() -> Arc<CodecRegistry> {
    Arc::new(CodecRegistry::default())
}

fn corrupt_in_place(storage: &MemoryStorage, name: &str) {
    use std::io::{Read, Write};
    let mut bytes = {
        let mut input = storage.open_input(name).unwrap();
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        buf
    };
    let index = bytes.len() - 10;
    bytes[index] ^= 0xFF;
    let mut output = storage.create_output(name).unwrap();
    output.write_all(&bytes).unwrap();
    output.close().unwrap();
}

/// Delegating storage whose listings misbehave in controlled ways.
#[derive(Debug)]
struct FlakyListingStorage {
    inner: Arc<MemoryStorage>,
    /// Listing calls that report a transient extra file.
    flaky_listings: usize,
    /// Pairs of listings that never agree when `usize::MAX`.
    calls: AtomicUsize,
}

impl FlakyListingStorage {
    fn new(inner: Arc<MemoryStorage>, flaky_listings: usize) -> Self {
        FlakyListingStorage {
            inner,
            flaky_listings,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Storage for FlakyListingStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(name)
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output(name)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut files = self.inner.list_files()?;
        // Every other call within the flaky window sees a file that a
        // concurrent writer is just creating or deleting.
        if call < self.flaky_listings && call % 2 == 0 {
            files.push("_in_flight.tmp".to_string());
        }
        Ok(files)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.inner.file_size(name)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        self.inner.metadata(name)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.inner.rename_file(old_name, new_name)
    }

    fn sync_files(&self, names: &[&str]) -> Result<()> {
        self.inner.sync_files(names)
    }

    fn sync_metadata(&self) -> Result<()> {
        self.inner.sync_metadata()
    }
}

/// Simulates a writer superseding the snapshot a reader just picked:
/// the first listing round advertises a generation whose file open then
/// fails, after which the real (newer) state becomes visible.
#[derive(Debug)]
struct SupersedingStorage {
    inner: Arc<MemoryStorage>,
    vanished: String,
    stale_listing: Vec<String>,
    phase: AtomicUsize,
}

impl Storage for SupersedingStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        if self.phase.load(Ordering::SeqCst) == 0 && name == self.vanished {
            self.phase.store(1, Ordering::SeqCst);
            return Err(XystonError::storage(format!("File not found: {name}")));
        }
        self.inner.open_input(name)
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output(name)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        if self.phase.load(Ordering::SeqCst) == 0 {
            return Ok(self.stale_listing.clone());
        }
        self.inner.list_files()
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.inner.file_size(name)
    }

    fn metadata(&self, name: &str) -> Result<FileMetadata> {
        self.inner.metadata(name)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.inner.rename_file(old_name, new_name)
    }

    fn sync_files(&self, names: &[&str]) -> Result<()> {
        self.inner.sync_files(names)
    }

    fn sync_metadata(&self) -> Result<()> {
        self.inner.sync_metadata()
    }
}

#[test]
fn transient_listing_instability_converges() {
    let inner = committed_storage(3);
    let storage = Arc::new(FlakyListingStorage::new(inner, 5));

    let discovery = Discovery::new(storage, registry());
    let catalog = discovery.run().unwrap();
    assert_eq!(catalog.last_generation(), 3);
}

#[test]
fn unstable_listing_exhausts_bounded_retries() {
    let inner = committed_storage(1);
    // Flaky forever: every double-listing round disagrees.
    let storage = Arc::new(FlakyListingStorage::new(inner, usize::MAX));

    let config = DiscoveryConfig {
        max_listing_retries: 4,
        ..Default::default()
    };
    let discovery = Discovery::with_config(storage, registry(), config, noop_sink());

    let result = discovery.run();
    match result {
        Err(XystonError::ListingUnstable { attempts }) => assert_eq!(attempts, 4),
        other => panic!("expected ListingUnstable, got {other:?}"),
    }
}

#[test]
fn empty_directory_reports_not_found() {
    let storage = Arc::new(MemoryStorage::new_default());
    let discovery = Discovery::new(storage, registry());

    let result = discovery.run();
    assert!(matches!(result, Err(XystonError::CatalogNotFound(_))));
}

#[test]
fn vanished_snapshot_retries_when_generation_advances() {
    let inner = committed_storage(3);
    let storage = Arc::new(SupersedingStorage {
        inner,
        vanished: "catalog_2".to_string(),
        stale_listing: vec!["catalog_2".to_string()],
        phase: AtomicUsize::new(0),
    });

    let discovery = Discovery::new(storage.clone(), registry());
    let catalog = discovery.run().unwrap();

    // The reader recovered by following the writer forward.
    assert_eq!(catalog.last_generation(), 3);
    assert_eq!(storage.phase.load(Ordering::SeqCst), 1);
}

#[test]
fn corrupt_newest_snapshot_is_surfaced_not_masked() {
    let storage = committed_storage(2);
    corrupt_in_place(&storage, "catalog_2");

    let discovery = Discovery::new(storage, registry());
    let result = discovery.run();

    // An older intact generation exists, but falling back to it would
    // silently unwind a published commit; the corruption is reported.
    match result {
        Err(error) => assert!(error.is_load_transient(), "got: {error}"),
        Ok(catalog) => panic!(
            "discovery returned generation {} despite corruption",
            catalog.last_generation()
        ),
    }
}

#[test]
fn discovery_never_returns_checksum_invalid_snapshot() {
    let storage = committed_storage(2);
    corrupt_in_place(&storage, "catalog_2");

    let discovery = Discovery::new(storage.clone(), registry());
    if let Ok(catalog) = discovery.run() {
        // If anything is returned at all it must be a fully valid
        // snapshot, never the damaged one.
        let reloaded = discovery.load_generation(catalog.last_generation());
        assert!(reloaded.is_ok());
        assert_ne!(catalog.last_generation(), 2);
    }
}

#[test]
fn truncated_snapshot_is_never_loaded() {
    let storage = committed_storage(1);
    {
        use std::io::{Read, Write};
        let mut bytes = {
            let mut input = storage.open_input("catalog_1").unwrap();
            let mut buf = Vec::new();
            input.read_to_end(&mut buf).unwrap();
            buf
        };
        bytes.truncate(20);
        let mut output = storage.create_output("catalog_1").unwrap();
        output.write_all(&bytes).unwrap();
        output.close().unwrap();
    }

    let discovery = Discovery::new(storage, registry());
    assert!(discovery.run().is_err());
}

#[test]
fn reader_needs_no_coordination_with_sequential_commits() {
    let storage = Arc::new(MemoryStorage::new_default());
    let committer = Committer::new(storage.clone());
    let discovery = Discovery::new(storage.clone(), registry());
    let mut catalog = SegmentCatalog::new(8).unwrap();

    for g in 1..=5u64 {
        catalog
            .add(test_record(&format!("_{g}"), 10))
            .unwrap();
        catalog.changed();
        committer.commit(&mut catalog).unwrap();

        let seen = discovery.run().unwrap();
        assert_eq!(seen.last_generation(), g);
        assert_eq!(seen.len(), g as usize);
    }
}
