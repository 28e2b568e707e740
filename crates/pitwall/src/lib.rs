//! `pitwall` - Formula 1 race-data preparation
//!
//! This library fetches the public Formula 1 race dataset, narrows it to a
//! window of seasons, enriches circuits, races and finishing statuses, and
//! derives per-driver and per-constructor feature tables. Every run can be
//! recorded in a small `SQLite` history.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod clean;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod enrich;
pub mod error;
pub mod features;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod records;
pub mod storage;
pub mod table;

pub use clean::{Cleaner, FilterReport};
pub use config::Config;
pub use dataset::DataLayout;
pub use enrich::{DnfCategory, Enricher};
pub use error::{Error, Result};
pub use features::{FeatureBuilder, FeatureReport};
pub use fetch::{DatasetSource, DirectorySource, FetchReport};
pub use logging::{init_logging, Verbosity};
pub use pipeline::{Pipeline, PipelineReport, Stage};
pub use storage::{Storage, StorageStats};
pub use table::Table;
