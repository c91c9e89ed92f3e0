//! Two-phase durable publication of catalog snapshots.
//!
//! A commit happens in two phases. `prepare` writes the full snapshot under
//! the pending prefix and makes its bytes durable; nothing is visible to
//! readers yet. `finish` renames the pending file to its canonical name —
//! the single atomic visibility point — and makes the rename durable.
//! `rollback` discards a prepared snapshot and leaves the last published
//! generation untouched. A failure in any phase never corrupts previously
//! durable state: partial output is deleted best-effort and the original
//! failure is the one propagated.

use std::sync::Arc;

use crate::catalog::catalog::SegmentCatalog;
use crate::catalog::filenames::{catalog_file_name, pending_file_name};
use crate::catalog::format::write_catalog;
use crate::catalog::record::{Id, id_to_string};
use crate::error::{Result, XystonError};
use crate::observer::{InfoSink, noop_sink};
use crate::storage::Storage;

const COMPONENT: &str = "commit";

/// Publishes [`SegmentCatalog`] snapshots durably.
///
/// All calls for one catalog must come from its single logical writer;
/// nothing here locks. `prepare` is not reentrant: a second call without
/// an intervening `finish` or `rollback` fails fast.
#[derive(Debug)]
pub struct Committer {
    storage: Arc<dyn Storage>,
    sink: Arc<dyn InfoSink>,
}

impl Committer {
    /// Create a committer over the given storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_sink(storage, noop_sink())
    }

    /// Create a committer that reports phase transitions to `sink`.
    pub fn with_sink(storage: Arc<dyn Storage>, sink: Arc<dyn InfoSink>) -> Self {
        Committer { storage, sink }
    }

    /// Start a commit: serialize the catalog to a pending snapshot and
    /// make its bytes durable.
    ///
    /// Advances the catalog's generation even if the write fails, so a
    /// retried commit can never reuse a file name a crashed attempt may
    /// have left behind. Call [`SegmentCatalog::changed`] beforehand if
    /// catalog content was mutated; that contract is documented, not
    /// enforced.
    pub fn prepare(&self, catalog: &mut SegmentCatalog) -> Result<()> {
        if catalog.pending_commit() {
            return Err(XystonError::illegal_state(
                "prepare was already called; finish or roll back first",
            ));
        }

        // Make any previous finish durable before building on top of it.
        self.storage.sync_metadata()?;

        let next_generation = catalog.generation() + 1;
        catalog.set_next_write_generation(next_generation)?;
        let file_name = pending_file_name(next_generation);

        match self.write_pending(catalog, &file_name) {
            Ok(snapshot_id) => {
                catalog.set_pending_commit(true);
                catalog.set_pending_commit_id(Some(snapshot_id));
                self.sink.message(
                    COMPONENT,
                    &format!(
                        "prepared generation {next_generation} as {file_name} (id {})",
                        id_to_string(&snapshot_id)
                    ),
                );
                Ok(())
            }
            Err(error) => {
                // Do not leave a truncated pending snapshot behind; the
                // write failure is the error worth reporting.
                let _ = self.storage.delete_file(&file_name);
                self.sink.message(
                    COMPONENT,
                    &format!("prepare of {file_name} failed: {error}"),
                );
                Err(error)
            }
        }
    }

    fn write_pending(&self, catalog: &mut SegmentCatalog, file_name: &str) -> Result<Id> {
        let output = self.storage.create_output(file_name)?;
        let snapshot_id = write_catalog(output, catalog)?;
        self.storage.sync_files(&[file_name])?;
        Ok(snapshot_id)
    }

    /// Complete a prepared commit by renaming the pending snapshot to its
    /// canonical name and making the rename durable.
    ///
    /// Returns the canonical file name. Readers can only ever discover
    /// canonically named files, so no reader observes a half-written
    /// commit.
    pub fn finish(&self, catalog: &mut SegmentCatalog) -> Result<String> {
        if !catalog.pending_commit() {
            return Err(XystonError::illegal_state("prepare was not called"));
        }

        let generation = catalog.generation();
        let source = pending_file_name(generation);
        let dest = catalog_file_name(generation);

        if let Err(error) = self.storage.rename_file(&source, &dest) {
            self.rollback(catalog);
            self.sink.message(
                COMPONENT,
                &format!("finish of generation {generation} failed to rename: {error}"),
            );
            return Err(error);
        }

        if let Err(error) = self.storage.sync_metadata() {
            // The rename happened but is not durable; withdraw the
            // canonical file rather than publish a commit that can
            // vanish on power loss.
            let _ = self.storage.delete_file(&dest);
            catalog.set_pending_commit(false);
            catalog.set_pending_commit_id(None);
            self.sink.message(
                COMPONENT,
                &format!("finish of generation {generation} failed to sync metadata: {error}"),
            );
            return Err(error);
        }

        catalog.set_pending_commit(false);
        let snapshot_id = catalog.pending_commit_id();
        catalog.set_pending_commit_id(None);
        catalog.set_commit_id(snapshot_id);
        catalog.set_generations(generation, generation);
        self.sink
            .message(COMPONENT, &format!("finished commit as {dest}"));
        Ok(dest)
    }

    /// Abandon a prepared commit. No-op when nothing is pending.
    ///
    /// Deletion of the pending file is best-effort: the last published
    /// snapshot is already intact, and a cleanup failure must not mask
    /// whatever error led the caller here.
    pub fn rollback(&self, catalog: &mut SegmentCatalog) {
        if !catalog.pending_commit() {
            return;
        }
        catalog.set_pending_commit(false);
        catalog.set_pending_commit_id(None);

        let pending = pending_file_name(catalog.generation());
        let _ = self.storage.delete_file(&pending);
        self.sink
            .message(COMPONENT, &format!("rolled back {pending}"));
    }

    /// Prepare and finish in one step.
    pub fn commit(&self, catalog: &mut SegmentCatalog) -> Result<String> {
        self.prepare(catalog)?;
        self.finish(catalog)
    }
}
