//! Enrichment of cleaned tables.
//!
//! Adds information the raw dataset lacks and later feature tables need:
//!
//! - **Circuits**: lap length, night-race flag and track type from the
//!   built-in [`circuits::CATALOG`].
//! - **Races**: total race distance, lap length times the laps run by
//!   classified finishers.
//! - **Status**: a [`DnfCategory`] per status plus one boolean column per
//!   category.
//!
//! Column insertion and filling are separate steps, and both rewrite the
//! cleaned file in place. Re-running either is harmless.

pub mod circuits;
pub mod status;

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::dataset::DataLayout;
use crate::error::{Error, Result};
use crate::records::{read_records, ResultRecord, FINISHED_STATUS_ID};
use crate::table::Table;

pub use circuits::{CircuitInfo, TrackType};
pub use status::{DnfCategory, ReliabilityCause};

/// Columns added to `circuits_cleaned.csv`.
pub const CIRCUIT_COLUMNS: [&str; 3] = ["length_km", "is_night_race", "track_type"];

/// Column added to `races_cleaned.csv`.
pub const RACE_DISTANCE_COLUMN: &str = "race_distance_km";

/// Columns added to `status_cleaned.csv`.
pub const STATUS_COLUMNS: [&str; 5] = [
    "dnf_category",
    "is_mechanical",
    "is_crash",
    "is_other_dnf",
    "is_no_dnf",
];

/// Enriches the cleaned tables of one data layout.
#[derive(Debug, Clone)]
pub struct Enricher {
    layout: DataLayout,
}

impl Enricher {
    /// Create an enricher for `layout`.
    #[must_use]
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Insert empty circuit metadata columns after `alt`.
    ///
    /// # Errors
    ///
    /// Returns an error if `circuits_cleaned.csv` is missing or has no
    /// `alt` column.
    pub fn add_extra_info_on_circuits(&self) -> Result<PathBuf> {
        let path = self.layout.cleaned("circuits");
        let mut table = Table::read(&path)?;
        table.insert_columns_after("alt", &CIRCUIT_COLUMNS)?;
        table.write(&path)?;
        Table::read_expecting(&path, &CIRCUIT_COLUMNS)?;
        info!(table = "circuits_cleaned", columns = ?CIRCUIT_COLUMNS, "columns added");
        Ok(path)
    }

    /// Fill circuit metadata from the catalog.
    ///
    /// Circuits missing from the catalog keep empty cells and are logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or the columns were not added.
    pub fn fill_circuit_extra_info(&self) -> Result<PathBuf> {
        let path = self.layout.cleaned("circuits");
        let mut table = Table::read(&path)?;
        for column in CIRCUIT_COLUMNS {
            table.column(column)?;
        }

        let mut filled = 0usize;
        for idx in 0..table.len() {
            let circuit_id = table.row(idx).and_then(|row| row.i64("circuitId"));
            match circuit_id.and_then(circuits::lookup) {
                Some(found) => {
                    table.set(idx, "length_km", found.length_km.to_string())?;
                    table.set(idx, "is_night_race", found.is_night_race.to_string())?;
                    table.set(idx, "track_type", found.track_type.as_str())?;
                    filled += 1;
                }
                None => {
                    warn!(circuit_id = ?circuit_id, "circuit not in catalog, values left empty");
                    for column in CIRCUIT_COLUMNS {
                        table.set(idx, column, "")?;
                    }
                }
            }
        }

        table.write(&path)?;
        Table::read_expecting(&path, &CIRCUIT_COLUMNS)?;
        info!(filled, total = table.len(), "circuit metadata filled");
        Ok(path)
    }

    /// Insert an empty `race_distance_km` column after `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if `races_cleaned.csv` is missing or has no `name`
    /// column.
    pub fn add_extra_info_on_races(&self) -> Result<PathBuf> {
        let path = self.layout.cleaned("races");
        let mut table = Table::read(&path)?;
        table.insert_columns_after("name", &[RACE_DISTANCE_COLUMN])?;
        table.write(&path)?;
        Table::read_expecting(&path, &[RACE_DISTANCE_COLUMN])?;
        info!(table = "races_cleaned", column = RACE_DISTANCE_COLUMN, "column added");
        Ok(path)
    }

    /// Compute `race_distance_km = length_km * laps` for each race.
    ///
    /// `laps` is the most laps completed by a driver with status
    /// "Finished". The result is rounded to 3 decimals and left empty when
    /// either input is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is missing, or a verification error if
    /// no race ends up with a distance.
    pub fn fill_races_distance_km(&self) -> Result<PathBuf> {
        let races_path = self.layout.cleaned("races");
        let mut races = Table::read(&races_path)?;
        races.column(RACE_DISTANCE_COLUMN)?;

        let circuits = Table::read(self.layout.cleaned("circuits"))?;
        let lengths: HashMap<i64, f64> = circuits
            .iter()
            .filter_map(|row| Some((row.i64("circuitId")?, row.f64("length_km")?)))
            .collect();

        let results: Vec<ResultRecord> = read_records(&self.layout.cleaned("results"))?;
        let laps = finished_laps_by_race(&results);

        let mut filled = 0usize;
        for idx in 0..races.len() {
            let distance = races.row(idx).and_then(|row| {
                let length = lengths.get(&row.i64("circuitId")?)?;
                let completed = laps.get(&row.i64("raceId")?)?;
                #[allow(clippy::cast_precision_loss)]
                let km = length * (*completed as f64);
                Some(round3(km))
            });
            let cell = distance.map(|d| d.to_string()).unwrap_or_default();
            if !cell.is_empty() {
                filled += 1;
            }
            races.set(idx, RACE_DISTANCE_COLUMN, cell)?;
        }

        races.write(&races_path)?;

        let check = Table::read(&races_path)?;
        let any_filled = check.iter().any(|row| row.get(RACE_DISTANCE_COLUMN).is_some());
        if !check.is_empty() && !any_filled {
            return Err(Error::verification(
                "races_cleaned",
                format!("column '{RACE_DISTANCE_COLUMN}' is empty"),
            ));
        }

        info!(filled, total = races.len(), "race distances filled");
        Ok(races_path)
    }

    /// Classify each status and write the category columns.
    ///
    /// # Errors
    ///
    /// Returns an error if `status_cleaned.csv` is missing or has no
    /// `status` column.
    pub fn add_status_dnf_categories(&self) -> Result<PathBuf> {
        let path = self.layout.cleaned("status");
        let mut table = Table::read(&path)?;
        table.insert_columns_after("status", &STATUS_COLUMNS)?;

        let mut counts: HashMap<DnfCategory, usize> = HashMap::new();
        for idx in 0..table.len() {
            let text = table
                .row(idx)
                .and_then(|row| row.raw("status"))
                .unwrap_or_default();
            let category = DnfCategory::classify(text);
            *counts.entry(category).or_default() += 1;

            table.set(idx, "dnf_category", category.as_str())?;
            table.set(idx, "is_mechanical", (category == DnfCategory::Mechanical).to_string())?;
            table.set(idx, "is_crash", (category == DnfCategory::Crash).to_string())?;
            table.set(idx, "is_other_dnf", (category == DnfCategory::OtherDnf).to_string())?;
            table.set(idx, "is_no_dnf", (!category.is_dnf()).to_string())?;
        }

        table.write(&path)?;
        Table::read_expecting(&path, &STATUS_COLUMNS)?;
        info!(?counts, "status categories added");
        Ok(path)
    }

    /// Run every enrichment step in order.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn enrich_all(&self) -> Result<Vec<PathBuf>> {
        let mut outputs = vec![
            self.add_extra_info_on_circuits()?,
            self.fill_circuit_extra_info()?,
            self.add_extra_info_on_races()?,
            self.fill_races_distance_km()?,
            self.add_status_dnf_categories()?,
        ];
        outputs.dedup();
        Ok(outputs)
    }
}

/// Most laps completed by a classified finisher in each race.
fn finished_laps_by_race(results: &[ResultRecord]) -> HashMap<i64, i64> {
    let mut laps: HashMap<i64, i64> = HashMap::new();
    for result in results
        .iter()
        .filter(|r| r.status_id == FINISHED_STATUS_ID)
    {
        if let Some(completed) = result.laps {
            laps.entry(result.race_id)
                .and_modify(|max| *max = (*max).max(completed))
                .or_insert(completed);
        }
    }
    laps
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
