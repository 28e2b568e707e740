//! Recent-season filtering.
//!
//! Restricts the raw dataset to the configured season window. Races are
//! filtered by year first; every other table is then cut down to the rows
//! the kept races (or their results) reference, so changing the window only
//! requires touching [`filter_races_by_year`].
//!
//! Filters never modify `raw/`. Each writes `{table}_cleaned.csv` to
//! `processed/`, re-reads it, and checks the output before reporting.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::dataset::{raw, DataLayout, RACE_TABLES};
use crate::error::{Error, Result};
use crate::table::Table;

/// Outcome of one filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    /// Logical table name.
    pub table: String,
    /// Cleaned file written.
    pub output: PathBuf,
    /// Rows kept.
    pub kept: usize,
    /// Rows in the input.
    pub total: usize,
}

impl FilterReport {
    /// Rows dropped by the filter.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.total - self.kept
    }
}

/// Filters tables of one data layout.
#[derive(Debug, Clone)]
pub struct Cleaner {
    layout: DataLayout,
}

impl Cleaner {
    /// Create a cleaner for `layout`.
    #[must_use]
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// The layout this cleaner reads and writes.
    #[must_use]
    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Keep races with `start_year <= year <= end_year`.
    ///
    /// # Errors
    ///
    /// Returns an error if `races.csv` is missing, lacks a `year` column, or
    /// the output cannot be written.
    pub fn filter_races_by_year(&self, start_year: i32, end_year: i32) -> Result<FilterReport> {
        let races = Table::read(self.layout.raw(raw::RACES))?;
        let year = races.column("year")?;
        let window = i64::from(start_year)..=i64::from(end_year);

        let kept = races.filter(|row| {
            crate::table::parse_i64(row.at(year)).is_some_and(|y| window.contains(&y))
        });
        let report = self.save("races", &kept, races.len())?;

        let check = Table::read(&report.output)?;
        let outside: Vec<i64> = check
            .distinct_i64("year")?
            .into_iter()
            .filter(|y| !window.contains(y))
            .collect();
        if outside.is_empty() {
            info!(table = "races", "verified season window {start_year}-{end_year}");
        } else {
            warn!(table = "races", ?outside, "years fall outside {start_year}-{end_year}");
        }
        Ok(report)
    }

    /// Race ids kept in `races_cleaned.csv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleaned races file is missing.
    pub fn race_ids(&self) -> Result<BTreeSet<i64>> {
        Table::read(self.layout.cleaned("races"))?.distinct_i64("raceId")
    }

    /// Keep rows of a race-keyed table whose `raceId` is in `race_ids`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] if the table has no `raceId` column.
    pub fn filter_table_by_race_ids(
        &self,
        table_name: &str,
        race_ids: &BTreeSet<i64>,
        raw_filename: &str,
    ) -> Result<FilterReport> {
        let mut table = Table::read(self.layout.raw(raw_filename))?;
        table.set_name(table_name);
        if !table.has_column("raceId") {
            return Err(Error::missing_column(table_name, "raceId"));
        }

        let kept = keep_ids(&table, "raceId", race_ids)?;
        let report = self.save(table_name, &kept, table.len())?;
        self.verify_subset(&report, "raceId", race_ids)?;
        Ok(report)
    }

    /// Filter every table in [`RACE_TABLES`].
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn filter_race_tables(&self, race_ids: &BTreeSet<i64>) -> Result<Vec<FilterReport>> {
        RACE_TABLES
            .iter()
            .map(|(name, file)| self.filter_table_by_race_ids(name, race_ids, file))
            .collect()
    }

    /// Keep circuits used by the kept races.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is missing or lacks `circuitId`.
    pub fn filter_circuits_by_races(&self) -> Result<FilterReport> {
        self.filter_referenced("circuits", raw::CIRCUITS, "races", "circuitId")
    }

    /// Keep constructors that appear in the kept results.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is missing or lacks `constructorId`.
    pub fn filter_constructors_by_results(&self) -> Result<FilterReport> {
        self.filter_referenced("constructors", raw::CONSTRUCTORS, "results", "constructorId")
    }

    /// Keep drivers that appear in the kept results.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is missing or lacks `driverId`.
    pub fn filter_drivers_by_results(&self) -> Result<FilterReport> {
        self.filter_referenced("drivers", raw::DRIVERS, "results", "driverId")
    }

    /// Keep seasons whose year appears in the kept races.
    ///
    /// Uses `races_cleaned.csv` rather than the year window so both stay in
    /// step.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is missing or lacks `year`.
    pub fn filter_seasons_by_year(&self) -> Result<FilterReport> {
        self.filter_referenced("seasons", raw::SEASONS, "races", "year")
    }

    /// Keep statuses that appear in the kept results.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is missing or lacks `statusId`.
    pub fn filter_status_by_results(&self) -> Result<FilterReport> {
        self.filter_referenced("status", raw::STATUS, "results", "statusId")
    }

    /// Run every dimension filter in dependency order.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn filter_dimensions(&self) -> Result<Vec<FilterReport>> {
        Ok(vec![
            self.filter_circuits_by_races()?,
            self.filter_constructors_by_results()?,
            self.filter_drivers_by_results()?,
            self.filter_seasons_by_year()?,
            self.filter_status_by_results()?,
        ])
    }

    /// Keep rows of raw `raw_file` whose `key` appears in cleaned `reference`.
    fn filter_referenced(
        &self,
        table_name: &str,
        raw_file: &str,
        reference: &str,
        key: &str,
    ) -> Result<FilterReport> {
        let referenced = Table::read(self.layout.cleaned(reference))?.distinct_i64(key)?;
        let mut table = Table::read(self.layout.raw(raw_file))?;
        table.set_name(table_name);

        let kept = keep_ids(&table, key, &referenced)?;
        let report = self.save(table_name, &kept, table.len())?;
        self.verify_subset(&report, key, &referenced)?;
        Ok(report)
    }

    fn save(&self, table_name: &str, kept: &Table, total: usize) -> Result<FilterReport> {
        let output = self.layout.cleaned(table_name);
        kept.write(&output)?;

        let report = FilterReport {
            table: table_name.to_string(),
            output,
            kept: kept.len(),
            total,
        };
        info!(
            table = table_name,
            kept = report.kept,
            total = report.total,
            dropped = report.dropped(),
            "filtered"
        );
        Ok(report)
    }

    fn verify_subset(&self, report: &FilterReport, key: &str, allowed: &BTreeSet<i64>) -> Result<()> {
        let check = Table::read(&report.output)?;
        if check.len() != report.kept {
            return Err(Error::verification(
                &report.table,
                format!("wrote {} rows but read back {}", report.kept, check.len()),
            ));
        }
        let stray = check.distinct_i64(key)?.difference(allowed).count();
        if stray > 0 {
            warn!(table = %report.table, key, stray, "entries outside the expected id set");
        }
        Ok(())
    }
}

fn keep_ids(table: &Table, key: &str, ids: &BTreeSet<i64>) -> Result<Table> {
    let idx = table.column(key)?;
    Ok(table.filter(|row| crate::table::parse_i64(row.at(idx)).is_some_and(|id| ids.contains(&id))))
}
