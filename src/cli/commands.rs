//! Command implementations for the Xyston CLI.

use std::path::Path;
use std::sync::Arc;

use crate::catalog::{
    Discovery, DiscoveryConfig, LoadOptions, generation_from_file_name, is_catalog_file,
};
use crate::cli::args::{Command, ListArgs, ShowArgs, VerifyArgs, XystonArgs};
use crate::cli::output::*;
use crate::codec::CodecRegistry;
use crate::error::{Result, XystonError};
use crate::observer::{InfoSink, NoopSink, StderrSink};
use crate::storage::{FileStorage, Storage, StorageConfig};

/// Execute a CLI command.
pub fn execute_command(args: XystonArgs) -> Result<()> {
    match &args.command {
        Command::List(list_args) => list_snapshots(list_args.clone(), &args),
        Command::Show(show_args) => show_catalog(show_args.clone(), &args),
        Command::Verify(verify_args) => verify_snapshots(verify_args.clone(), &args),
    }
}

fn open_storage(path: &Path) -> Result<Arc<dyn Storage>> {
    if !path.is_dir() {
        return Err(XystonError::not_found(format!(
            "'{}' is not a directory",
            path.display()
        )));
    }
    Ok(Arc::new(FileStorage::new(path, StorageConfig::default())?))
}

fn sink_for(cli_args: &XystonArgs) -> Arc<dyn InfoSink> {
    if cli_args.verbosity() > 1 {
        Arc::new(StderrSink)
    } else {
        Arc::new(NoopSink)
    }
}

fn discovery_for(
    storage: Arc<dyn Storage>,
    cli_args: &XystonArgs,
    min_supported_major: Option<u32>,
) -> Discovery {
    let mut config = DiscoveryConfig::default();
    if let Some(major) = min_supported_major {
        config.load_options = LoadOptions {
            min_supported_major: major,
            ..config.load_options
        };
    }
    Discovery::with_config(
        storage,
        Arc::new(CodecRegistry::default()),
        config,
        sink_for(cli_args),
    )
}

/// List the catalog snapshots in a directory.
fn list_snapshots(args: ListArgs, cli_args: &XystonArgs) -> Result<()> {
    let storage = open_storage(&args.index_path)?;

    let mut snapshots = Vec::new();
    for file_name in storage.list_files()? {
        if !is_catalog_file(&file_name) {
            continue;
        }
        let Ok(generation) = generation_from_file_name(&file_name) else {
            continue;
        };
        let metadata = storage.metadata(&file_name)?;
        snapshots.push(SnapshotEntry {
            file_name,
            generation,
            size_bytes: metadata.size,
            modified: format_timestamp(metadata.modified),
        });
    }
    snapshots.sort_by_key(|entry| entry.generation);

    let report = ListingReport {
        newest_generation: snapshots.last().map(|entry| entry.generation),
        snapshots,
    };

    emit(
        &report,
        || {
            if report.snapshots.is_empty() {
                println!("No catalog snapshots in {}", args.index_path.display());
                return;
            }
            println!("{:<20} {:>12} {:>12}  {}", "FILE", "GENERATION", "SIZE", "MODIFIED");
            for entry in &report.snapshots {
                println!(
                    "{:<20} {:>12} {:>12}  {}",
                    entry.file_name, entry.generation, entry.size_bytes, entry.modified
                );
            }
        },
        cli_args,
    )
}

/// Show the newest (or an explicit) catalog snapshot.
fn show_catalog(args: ShowArgs, cli_args: &XystonArgs) -> Result<()> {
    let storage = open_storage(&args.index_path)?;
    let discovery = discovery_for(storage, cli_args, args.min_supported_major);

    let catalog = match args.generation {
        Some(generation) => discovery.load_generation(generation)?,
        None => discovery.run()?,
    };

    let summary = CatalogSummary::from_catalog(&catalog)?;

    emit(
        &summary,
        || {
            println!("generation:   {}", summary.generation);
            println!("version:      {}", summary.version);
            println!("counter:      {}", summary.counter);
            println!("created by:   major {}", summary.creation_major);
            if let Some(commit_id) = &summary.commit_id {
                println!("commit id:    {commit_id}");
            }
            if let Some(min_version) = &summary.min_segment_version {
                println!("min version:  {min_version}");
            }
            println!("total docs:   {}", summary.total_max_doc);
            if !summary.user_data.is_empty() {
                println!("user data:");
                let mut keys: Vec<_> = summary.user_data.keys().collect();
                keys.sort();
                for key in keys {
                    println!("  {key} = {}", summary.user_data[key]);
                }
            }
            println!("segments ({}):", summary.segments.len());
            for segment in &summary.segments {
                println!(
                    "  {:<8} docs={:<8} del={:<6} soft={:<6} codec={} files={}",
                    segment.name,
                    segment.max_doc,
                    segment.del_count,
                    segment.soft_del_count,
                    segment.codec,
                    segment.files.len()
                );
            }
        },
        cli_args,
    )
}

/// Verify every catalog snapshot in a directory.
fn verify_snapshots(args: VerifyArgs, cli_args: &XystonArgs) -> Result<()> {
    let storage = open_storage(&args.index_path)?;
    let discovery = discovery_for(storage.clone(), cli_args, args.min_supported_major);

    let mut entries = Vec::new();
    for file_name in storage.list_files()? {
        if !is_catalog_file(&file_name) {
            continue;
        }
        let Ok(generation) = generation_from_file_name(&file_name) else {
            continue;
        };
        let error = discovery.load_file(&file_name).err().map(|e| e.to_string());
        entries.push(VerifyEntry {
            file_name,
            generation,
            ok: error.is_none(),
            error,
        });
    }
    entries.sort_by_key(|entry| entry.generation);

    if entries.is_empty() {
        return Err(XystonError::not_found(format!(
            "no catalog snapshot in {}",
            args.index_path.display()
        )));
    }

    let report = VerifyReport {
        failures: entries.iter().filter(|entry| !entry.ok).count(),
        entries,
    };

    emit(
        &report,
        || {
            for entry in &report.entries {
                match &entry.error {
                    None => println!("{:<20} OK", entry.file_name),
                    Some(error) => println!("{:<20} FAILED: {error}", entry.file_name),
                }
            }
        },
        cli_args,
    )?;

    if report.failures > 0 {
        return Err(XystonError::corrupt(format!(
            "{} of {} snapshots failed verification",
            report.failures,
            report.entries.len()
        )));
    }
    Ok(())
}
