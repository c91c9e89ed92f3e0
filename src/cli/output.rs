//! Output formatting for CLI commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{SegmentCatalog, id_to_string};
use crate::cli::args::{OutputFormat, XystonArgs};
use crate::error::Result;

/// One snapshot file in a listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub file_name: String,
    pub generation: u64,
    pub size_bytes: u64,
    pub modified: String,
}

/// Result structure for the list command.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingReport {
    pub snapshots: Vec<SnapshotEntry>,
    pub newest_generation: Option<u64>,
}

/// One segment in a catalog summary.
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub name: String,
    pub id: String,
    pub codec: String,
    pub max_doc: u32,
    pub del_count: u32,
    pub soft_del_count: u32,
    pub del_generation: i64,
    pub min_index_version: Option<String>,
    pub files: Vec<String>,
}

/// Result structure for the show command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub generation: u64,
    pub version: u64,
    pub counter: u64,
    pub creation_major: u32,
    pub commit_id: Option<String>,
    pub total_max_doc: u64,
    pub min_segment_version: Option<String>,
    pub user_data: std::collections::HashMap<String, String>,
    pub segments: Vec<SegmentSummary>,
}

impl CatalogSummary {
    /// Build a summary from a loaded catalog.
    pub fn from_catalog(catalog: &SegmentCatalog) -> Result<Self> {
        let segments = catalog
            .iter()
            .map(|record| {
                let mut files: Vec<String> = record.files().into_iter().collect();
                files.sort();
                SegmentSummary {
                    name: record.name.clone(),
                    id: id_to_string(&record.id),
                    codec: record.codec_name.clone(),
                    max_doc: record.max_doc(),
                    del_count: record.del_count(),
                    soft_del_count: record.soft_del_count(),
                    del_generation: record.del_generation(),
                    min_index_version: record.min_index_version.map(|v| v.to_string()),
                    files,
                }
            })
            .collect();

        Ok(CatalogSummary {
            generation: catalog.last_generation(),
            version: catalog.version(),
            counter: catalog.counter(),
            creation_major: catalog.creation_major(),
            commit_id: catalog.commit_id().map(|id| id_to_string(&id)),
            total_max_doc: catalog.total_max_doc()?,
            min_segment_version: catalog.min_segment_version().map(|v| v.to_string()),
            user_data: catalog.user_data().clone(),
            segments,
        })
    }
}

/// Outcome of verifying one snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyEntry {
    pub file_name: String,
    pub generation: u64,
    pub ok: bool,
    pub error: Option<String>,
}

/// Result structure for the verify command.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyReport {
    pub entries: Vec<VerifyEntry>,
    pub failures: usize,
}

/// Render seconds-since-epoch the way listings do.
pub fn format_timestamp(seconds: u64) -> String {
    DateTime::<Utc>::from_timestamp(seconds as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

/// Serialize a report as JSON, honoring `--pretty`.
pub fn to_json<T: Serialize>(value: &T, args: &XystonArgs) -> Result<String> {
    let text = if args.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

/// Print a report in the requested output format.
pub fn emit<T: Serialize>(value: &T, human: impl FnOnce(), args: &XystonArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => println!("{}", to_json(value, args)?),
        OutputFormat::Human => human(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1754000000), "2025-07-31 22:13:20 UTC");
    }
}
