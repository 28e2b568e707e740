//! Error types for pitwall.
//!
//! This module defines all error types used throughout the pitwall crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for pitwall operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Table Errors ===
    /// A required input file does not exist.
    #[error("missing input file {path}")]
    MissingInput {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// A table lacks a column the operation depends on.
    #[error("table '{table}' has no '{column}' column")]
    MissingColumn {
        /// Name of the table.
        table: String,
        /// Name of the missing column.
        column: String,
    },

    /// A table is structurally invalid (ragged rows, duplicate headers).
    #[error("malformed table '{table}': {message}")]
    MalformedTable {
        /// Name of the table.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// Reading or writing CSV data failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// File being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: csv::Error,
    },

    /// A written output failed its post-write check.
    #[error("verification of {table} failed: {message}")]
    Verification {
        /// Name of the table that failed verification.
        table: String,
        /// Description of what was wrong.
        message: String,
    },

    // === Dataset Errors ===
    /// The dataset source produced no CSV files.
    #[error("no dataset files found via {source_name}: {message}")]
    DatasetNotFound {
        /// Name of the dataset source.
        source_name: &'static str,
        /// Description of where we looked.
        message: String,
    },

    /// Downloading a dataset file failed.
    #[error("failed to download {url}: {source}")]
    Download {
        /// The URL that was requested.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    // === Storage Errors ===
    /// Failed to open or create the history database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Pipeline Errors ===
    /// A pipeline stage failed.
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// Stage name.
        stage: &'static str,
        /// What went wrong inside the stage.
        #[source]
        source: Box<Error>,
    },

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for pitwall operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a missing column error.
    #[must_use]
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create a verification error.
    #[must_use]
    pub fn verification(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Verification {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a malformed table error.
    #[must_use]
    pub fn malformed(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedTable {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a CSV error bound to the file being processed.
    #[must_use]
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wrap an error with the pipeline stage it happened in.
    #[must_use]
    pub fn in_stage(stage: &'static str, source: Self) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// The error beneath any stage context.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error means an input file was absent.
    #[must_use]
    pub fn is_missing_input(&self) -> bool {
        matches!(self.root(), Self::MissingInput { .. })
    }

    /// Check if this error is a data-shape problem rather than an
    /// environment failure.
    #[must_use]
    pub fn is_data_error(&self) -> bool {
        matches!(
            self.root(),
            Self::MissingColumn { .. } | Self::MalformedTable { .. } | Self::Verification { .. }
        )
    }

    /// A suggestion for the user, for errors they can fix themselves.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        if matches!(self.root(), Self::DatasetNotFound { .. }) {
            Some("fetch the raw dataset first with `pitwall fetch`")
        } else if self.is_missing_input() {
            Some("run the earlier stages first, e.g. `pitwall run --skip-fetch`")
        } else if self.is_data_error() {
            Some("the CSV files do not match the expected dataset; fetch a fresh copy")
        } else {
            None
        }
    }
}
