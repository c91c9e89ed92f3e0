//! Command line argument parsing for the Xyston CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Xyston - inspect crash-consistent segment catalogs
#[derive(Parser, Debug, Clone)]
#[command(name = "xyston")]
#[command(about = "Inspect the segment catalog of a search index directory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct XystonArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl XystonArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the catalog snapshots in an index directory
    List(ListArgs),

    /// Show the newest catalog snapshot
    Show(ShowArgs),

    /// Verify every catalog snapshot in an index directory
    Verify(VerifyArgs),
}

/// Arguments for listing snapshots
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Arguments for showing the newest snapshot
#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Show an explicit generation instead of the newest
    #[arg(short, long, value_name = "GENERATION")]
    pub generation: Option<u64>,

    /// Accept indexes down to this creation major
    #[arg(long, value_name = "MAJOR")]
    pub min_supported_major: Option<u32>,
}

/// Arguments for verifying snapshots
#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Accept indexes down to this creation major
    #[arg(long, value_name = "MAJOR")]
    pub min_supported_major: Option<u32>,
}

/// Output format for command results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables
    Human,
    /// JSON
    Json,
}
