//! Race-tolerant discovery of the newest durable snapshot.
//!
//! Readers share a directory with one live writer and coordinate with it
//! through nothing but file names. Between listing the directory and
//! opening the newest snapshot, the writer may publish a newer generation
//! and delete the one we picked; that shows up as a vanished or truncated
//! file and is retried, but only while the observable generation keeps
//! advancing — a failure at a generation that never moves is genuine
//! corruption and is surfaced, not masked.

use std::sync::Arc;

use crate::catalog::catalog::SegmentCatalog;
use crate::catalog::filenames::{catalog_file_name, latest_generation};
use crate::catalog::format::{LoadOptions, read_catalog};
use crate::codec::CodecRegistry;
use crate::error::{Result, XystonError};
use crate::observer::{InfoSink, noop_sink};
use crate::storage::Storage;

const COMPONENT: &str = "discovery";

/// Tuning for [`Discovery`].
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryConfig {
    /// How many double-listing rounds may disagree before discovery gives
    /// up with [`XystonError::ListingUnstable`]. Listing is only weakly
    /// consistent under a concurrent writer, so single mismatches are
    /// normal; a budget keeps pathological storage from livelocking us.
    pub max_listing_retries: usize,

    /// Options handed to the snapshot loader.
    pub load_options: LoadOptions,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            max_listing_retries: 10,
            load_options: LoadOptions::default(),
        }
    }
}

/// One load attempt, separated from genuinely fatal outcomes so the retry
/// loop works off explicit state instead of error identity.
enum LoadAttempt {
    Loaded(Box<SegmentCatalog>),
    Retryable(XystonError),
}

/// Locates and loads the newest durable catalog snapshot.
///
/// Requires no coordination with the writer.
#[derive(Debug)]
pub struct Discovery {
    storage: Arc<dyn Storage>,
    registry: Arc<CodecRegistry>,
    sink: Arc<dyn InfoSink>,
    config: DiscoveryConfig,
}

impl Discovery {
    /// Create a resolver with default configuration.
    pub fn new(storage: Arc<dyn Storage>, registry: Arc<CodecRegistry>) -> Self {
        Self::with_config(storage, registry, DiscoveryConfig::default(), noop_sink())
    }

    /// Create a resolver with explicit configuration and sink.
    pub fn with_config(
        storage: Arc<dyn Storage>,
        registry: Arc<CodecRegistry>,
        config: DiscoveryConfig,
        sink: Arc<dyn InfoSink>,
    ) -> Self {
        Discovery {
            storage,
            registry,
            sink,
            config,
        }
    }

    /// Find the newest published snapshot and load it.
    pub fn run(&self) -> Result<SegmentCatalog> {
        // Low-water mark: the generation of the previous load attempt.
        // A retry is only justified while this advances.
        let mut attempted_generation: Option<u64> = None;
        let mut first_error: Option<XystonError> = None;

        loop {
            let files = self.stable_listing()?;

            let Some(generation) = latest_generation(&files) else {
                return Err(XystonError::not_found(format!(
                    "no catalog snapshot in storage; files: {files:?}"
                )));
            };
            self.sink
                .message(COMPONENT, &format!("directory listing gen={generation}"));

            if let Some(attempted) = attempted_generation
                && generation <= attempted
            {
                // No forward progress since the failed attempt: nobody
                // superseded that snapshot, so its failure was real.
                return Err(first_error
                    .take()
                    .expect("a failed attempt recorded its error"));
            }
            attempted_generation = Some(generation);

            match self.attempt_load(generation)? {
                LoadAttempt::Loaded(catalog) => {
                    self.sink.message(
                        COMPONENT,
                        &format!("success on {}", catalog_file_name(generation)),
                    );
                    return Ok(*catalog);
                }
                LoadAttempt::Retryable(error) => {
                    self.sink.message(
                        COMPONENT,
                        &format!(
                            "load of generation {generation} failed ({error}); \
                             will retry if a newer generation appears"
                        ),
                    );
                    first_error.get_or_insert(error);
                }
            }
        }
    }

    /// Highest published generation, if any snapshot exists.
    pub fn latest_generation(&self) -> Result<Option<u64>> {
        let files = self.stable_listing()?;
        Ok(latest_generation(&files))
    }

    /// Load the snapshot at an explicit generation, no retries.
    pub fn load_generation(&self, generation: u64) -> Result<SegmentCatalog> {
        self.load_file(&catalog_file_name(generation))
    }

    /// Load an explicitly named snapshot file, no retries.
    pub fn load_file(&self, file_name: &str) -> Result<SegmentCatalog> {
        read_catalog(
            self.storage.as_ref(),
            file_name,
            &self.registry,
            &self.config.load_options,
        )
    }

    fn attempt_load(&self, generation: u64) -> Result<LoadAttempt> {
        match self.load_generation(generation) {
            Ok(catalog) => Ok(LoadAttempt::Loaded(Box::new(catalog))),
            Err(error) if error.is_load_transient() => Ok(LoadAttempt::Retryable(error)),
            Err(error) => Err(error),
        }
    }

    // Lists until two consecutive listings agree. Listings come back
    // sorted, but sort again rather than lean on backend behavior.
    fn stable_listing(&self) -> Result<Vec<String>> {
        let budget = self.config.max_listing_retries.max(1);

        for _ in 0..budget {
            let mut first = self.storage.list_files()?;
            let mut second = self.storage.list_files()?;
            first.sort();
            second.sort();

            if first == second {
                return Ok(first);
            }
            self.sink
                .message(COMPONENT, "directory listing changed between reads; relisting");
        }

        Err(XystonError::ListingUnstable { attempts: budget })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::commit::Committer;
    use crate::catalog::record::{SegmentRecord, random_id};
    use crate::catalog::version::Version;
    use crate::codec::DEFAULT_CODEC_NAME;
    use crate::storage::{MemoryStorage, StorageOutput};

    fn committed_storage(generations: u32) -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new_default());
        let committer = Committer::new(storage.clone());
        let mut catalog = SegmentCatalog::new(8).unwrap();

        for g in 0..generations {
            let record = SegmentRecord::new(
                format!("_{g}"),
                random_id(),
                DEFAULT_CODEC_NAME,
                10,
                Some(Version::new(8, 0, 0)),
            );
            catalog.add(record).unwrap();
            catalog.changed();
            committer.commit(&mut catalog).unwrap();
        }
        storage
    }

    fn discovery(storage: Arc<MemoryStorage>) -> Discovery {
        Discovery::new(storage, Arc::new(CodecRegistry::default()))
    }

    #[test]
    fn test_run_loads_newest_generation() {
        let storage = committed_storage(3);
        let catalog = discovery(storage).run().unwrap();

        assert_eq!(catalog.last_generation(), 3);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_empty_directory_is_not_found() {
        let storage = Arc::new(MemoryStorage::new_default());
        let result = discovery(storage).run();
        assert!(matches!(result, Err(XystonError::CatalogNotFound(_))));
    }

    #[test]
    fn test_pending_files_are_ignored() {
        let storage = committed_storage(2);
        // A crashed writer left a pending snapshot behind; discovery must
        // not look at it.
        {
            use std::io::Write;
            let mut output = storage.create_output("pending_catalog_3").unwrap();
            output.write_all(b"half a snapshot").unwrap();
            output.close().unwrap();
        }

        let catalog = discovery(storage).run().unwrap();
        assert_eq!(catalog.last_generation(), 2);
    }

    #[test]
    fn test_latest_generation_helper() {
        let storage = committed_storage(2);
        let discovery = discovery(storage);
        assert_eq!(discovery.latest_generation().unwrap(), Some(2));

        let empty = Discovery::new(
            Arc::new(MemoryStorage::new_default()),
            Arc::new(CodecRegistry::default()),
        );
        assert_eq!(empty.latest_generation().unwrap(), None);
    }

    #[test]
    fn test_corrupt_snapshot_is_fatal_without_forward_progress() {
        let storage = committed_storage(2);

        // Damage the newest snapshot in place.
        let mut bytes = {
            use std::io::Read;
            let mut input = storage.open_input("catalog_2").unwrap();
            let mut buf = Vec::new();
            input.read_to_end(&mut buf).unwrap();
            buf
        };
        let index = bytes.len() - 10;
        bytes[index] ^= 0xFF;
        {
            use std::io::Write;
            let mut output = storage.create_output("catalog_2").unwrap();
            output.write_all(&bytes).unwrap();
            output.close().unwrap();
        }

        let result = discovery(storage).run();
        assert!(result.is_err());
    }

    #[test]
    fn test_load_generation_explicitly() {
        let storage = committed_storage(3);
        let discovery = discovery(storage);

        let older = discovery.load_generation(2).unwrap();
        assert_eq!(older.last_generation(), 2);
        assert_eq!(older.len(), 2);

        assert!(discovery.load_generation(9).is_err());
    }
}
