//! CLI command definitions.
//!
//! This module defines the arguments of every `pitwall` subcommand.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::config::SourceKind;

/// Fetch command arguments.
#[derive(Debug, Args)]
pub struct FetchCommand {
    /// Where to fetch the raw dataset from
    #[arg(short, long, value_enum)]
    pub source: Option<SourceArg>,

    /// Source directory (implies `--source directory`)
    #[arg(long, value_name = "DIR")]
    pub from: Option<PathBuf>,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// List processed files instead of raw files
    #[arg(short, long)]
    pub processed: bool,
}

/// Preview command arguments.
#[derive(Debug, Args)]
pub struct PreviewCommand {
    /// File name, e.g. `races.csv`
    pub file: String,

    /// Read from the processed directory
    #[arg(short, long)]
    pub processed: bool,

    /// Number of rows to show
    #[arg(short = 'n', long, default_value = "5")]
    pub rows: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Season window overrides shared by `clean` and `run`.
#[derive(Debug, Default, Args)]
pub struct SeasonArgs {
    /// First season to keep
    #[arg(long, value_name = "YEAR")]
    pub start_year: Option<i32>,

    /// Last season to keep
    #[arg(long, value_name = "YEAR")]
    pub end_year: Option<i32>,
}

/// Clean command arguments.
#[derive(Debug, Args)]
pub struct CleanCommand {
    /// Season window overrides
    #[command(flatten)]
    pub seasons: SeasonArgs,
}

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Skip fetching and use the raw files already on disk
    #[arg(long)]
    pub skip_fetch: bool,

    /// Season window overrides
    #[command(flatten)]
    pub seasons: SeasonArgs,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Maximum number of runs to show
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Dataset source argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// The local Kaggle download cache
    KaggleCache,
    /// A plain directory of CSV files
    Directory,
    /// An HTTP mirror serving the CSV files
    Http,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::KaggleCache => Self::KaggleCache,
            SourceArg::Directory => Self::Directory,
            SourceArg::Http => Self::Http,
        }
    }
}
