//! Command-line interface for pitwall.
//!
//! This module provides the CLI structure for the `pitwall` binary. The
//! handlers live in the binary itself.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CleanCommand, ConfigCommand, FetchCommand, HistoryCommand, ListCommand, PreviewCommand,
    RunCommand, SeasonArgs, SourceArg,
};

/// pitwall - Formula 1 race-data preparation
///
/// Fetches the Formula 1 race dataset, narrows it to a season window, adds
/// circuit and retirement information, and writes per-driver feature tables.
#[derive(Debug, Parser)]
#[command(name = "pitwall")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Data root directory (overrides `data.root`)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download or copy the raw dataset
    Fetch(FetchCommand),

    /// List the CSV files on disk
    List(ListCommand),

    /// Show the first rows of a CSV file
    Preview(PreviewCommand),

    /// Filter the raw tables to the season window
    Clean(CleanCommand),

    /// Add circuit and retirement columns to the cleaned tables
    Enrich,

    /// Build the feature tables
    Features,

    /// Run the whole pipeline
    Run(RunCommand),

    /// Show past pipeline runs
    History(HistoryCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
