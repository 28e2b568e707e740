//! Performance feature tables.
//!
//! Every builder reads cleaned (and enriched) tables from `processed/`,
//! aggregates per id, and writes one CSV back to `processed/`. Aggregates
//! are sorted by id. After writing, each output is re-read and checked for
//! its expected columns and row count.
//!
//! [`FeatureBuilder::build_races_drivers_features`] joins earlier outputs,
//! so it must run after the driver-race base and both performance tables.

pub mod rows;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::DataLayout;
use crate::enrich::{DnfCategory, ReliabilityCause};
use crate::error::{Error, Result};
use crate::records::{
    read_records, write_rows, CircuitRecord, ConstructorRecord, DriverRecord, OutputRow,
    PitStopRecord, QualifyingRecord, RaceRecord, ResultRecord, StatusRecord, FINISHED_STATUS_ID,
};
use crate::table::Table;

pub use rows::{
    ConstructorPerformanceRow, DriverCircuitPerformanceRow, DriverPerformanceRow,
    DriverRaceBaseRow, PitStopPerformanceRow, QualifyingPerformanceRow, SprintPerformanceRow,
};

/// Output file names.
pub mod output {
    /// One row per result.
    pub const DRIVER_RACE_BASE: &str = "driver_race_base.csv";
    /// Per-driver aggregates.
    pub const DRIVERS_PERFORMANCE: &str = "drivers_performance.csv";
    /// Per-constructor aggregates with reliability.
    pub const CONSTRUCTORS_PERFORMANCE: &str = "constructors_performance.csv";
    /// Per-driver sprint aggregates.
    pub const SPRINT_PERFORMANCE: &str = "drivers_sprint_performance.csv";
    /// Per-driver qualifying aggregates.
    pub const QUALIFYING_PERFORMANCE: &str = "drivers_qualifying_performance.csv";
    /// Per-driver pit-stop aggregates.
    pub const PIT_STOPS_PERFORMANCE: &str = "pit_stops_performance.csv";
    /// Per driver and circuit aggregates.
    pub const DRIVER_CIRCUITS_PERFORMANCE: &str = "drivers_circuit_performance.csv";
    /// Model-ready join of the base and performance tables.
    pub const RACES_DRIVERS_FEATURES: &str = "races_drivers_features.csv";
}

/// Outcome of one feature build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureReport {
    /// Table name, the output file stem.
    pub table: String,
    /// File written.
    pub output: PathBuf,
    /// Data rows written.
    pub rows: usize,
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: i64) -> f64 {
    value as f64
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

fn min_opt(current: Option<i64>, value: i64) -> Option<i64> {
    Some(current.map_or(value, |c| c.min(value)))
}

fn max_opt(current: Option<i64>, value: i64) -> Option<i64> {
    Some(current.map_or(value, |c| c.max(value)))
}

/// Running arithmetic mean.
#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn value(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Race-result aggregates shared by the driver, constructor and circuit tables.
#[derive(Debug, Default)]
struct ResultTally {
    races: BTreeSet<i64>,
    finished: usize,
    wins: usize,
    podiums: usize,
    top10: usize,
    finish_positions: Mean,
    best_finish: Option<i64>,
    points: f64,
    dnf: usize,
    mechanical_dnf: usize,
    crash_dnf: usize,
}

impl ResultTally {
    fn add(&mut self, result: &ResultRecord, cause: Option<ReliabilityCause>) {
        self.races.insert(result.race_id);
        if result.order_within(1) {
            self.wins += 1;
        }
        if result.order_within(3) {
            self.podiums += 1;
        }
        if result.order_within(10) {
            self.top10 += 1;
        }
        self.points += result.points.unwrap_or(0.0);

        match result.position_order.filter(|_| result.is_finished()) {
            Some(position) => {
                self.finished += 1;
                self.finish_positions.add(as_f64(position));
                self.best_finish = min_opt(self.best_finish, position);
            }
            None => {
                self.dnf += 1;
                let cause = cause.unwrap_or_default();
                self.mechanical_dnf += usize::from(cause.mechanical);
                self.crash_dnf += usize::from(cause.crash);
            }
        }
    }

    fn races_count(&self) -> usize {
        self.races.len()
    }

    fn finish_rate(&self) -> f64 {
        ratio(self.finished, self.races_count()).unwrap_or(0.0)
    }
}

/// Builds feature tables for one data layout.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    layout: DataLayout,
}

impl FeatureBuilder {
    /// Create a builder for `layout`.
    #[must_use]
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    fn cleaned<T: serde::de::DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        read_records(&self.layout.cleaned(table))
    }

    fn driver_surnames(&self) -> Result<HashMap<i64, String>> {
        Ok(self
            .cleaned::<DriverRecord>("drivers")?
            .into_iter()
            .map(|d| (d.driver_id, d.surname))
            .collect())
    }

    fn constructor_names(&self) -> Result<HashMap<i64, String>> {
        Ok(self
            .cleaned::<ConstructorRecord>("constructors")?
            .into_iter()
            .map(|c| (c.constructor_id, c.name))
            .collect())
    }

    /// Category per status id, from the enrichment column when present.
    fn status_categories(&self) -> Result<HashMap<i64, DnfCategory>> {
        Ok(self
            .cleaned::<StatusRecord>("status")?
            .into_iter()
            .map(|s| {
                let category = s
                    .dnf_category
                    .as_deref()
                    .and_then(DnfCategory::from_label)
                    .unwrap_or_else(|| DnfCategory::classify(&s.status));
                (s.status_id, category)
            })
            .collect())
    }

    /// Reliability flags per status id, from the status text.
    fn reliability_causes(&self) -> Result<HashMap<i64, ReliabilityCause>> {
        Ok(self
            .cleaned::<StatusRecord>("status")?
            .into_iter()
            .map(|s| (s.status_id, ReliabilityCause::from_status(&s.status)))
            .collect())
    }

    fn save<T: OutputRow>(&self, file: &str, rows: &[T]) -> Result<FeatureReport> {
        let path = self.layout.processed(file);
        write_rows(&path, rows)?;

        let check = Table::read_expecting(&path, T::COLUMNS)?;
        if check.len() != rows.len() {
            return Err(Error::verification(
                check.name(),
                format!("wrote {} rows but read back {}", rows.len(), check.len()),
            ));
        }

        let table = check.name().to_string();
        info!(table = %table, rows = rows.len(), path = %path.display(), "feature table written");
        Ok(FeatureReport {
            table,
            output: path,
            rows: rows.len(),
        })
    }

    /// One row per result, with race, circuit, status and target columns.
    ///
    /// Rows are ordered by race, then finishing order.
    ///
    /// # Errors
    ///
    /// Returns an error if a cleaned input is missing or unreadable.
    pub fn build_driver_race_base(&self) -> Result<FeatureReport> {
        let results: Vec<ResultRecord> = self.cleaned("results")?;
        let races: HashMap<i64, RaceRecord> = self
            .cleaned::<RaceRecord>("races")?
            .into_iter()
            .map(|r| (r.race_id, r))
            .collect();
        let circuits: HashMap<i64, CircuitRecord> = self
            .cleaned::<CircuitRecord>("circuits")?
            .into_iter()
            .map(|c| (c.circuit_id, c))
            .collect();
        let surnames = self.driver_surnames()?;
        let names = self.constructor_names()?;
        let categories = self.status_categories()?;

        let mut rows: Vec<DriverRaceBaseRow> = results
            .iter()
            .map(|result| {
                let race = races.get(&result.race_id);
                let circuit = race.and_then(|r| circuits.get(&r.circuit_id));
                let finished = result.is_finished();
                DriverRaceBaseRow {
                    race_id: result.race_id,
                    year: race.map(|r| r.year),
                    round: race.and_then(|r| r.round),
                    circuit_id: race.map(|r| r.circuit_id),
                    driver_id: result.driver_id,
                    surname: surnames.get(&result.driver_id).cloned(),
                    constructor_id: result.constructor_id,
                    constructor_name: names.get(&result.constructor_id).cloned(),
                    grid: result.grid,
                    position_order: result.position_order,
                    points: result.points,
                    laps: result.laps,
                    status_id: result.status_id,
                    dnf_category: categories.get(&result.status_id).map(|c| c.as_str()),
                    length_km: circuit.and_then(|c| c.length_km),
                    is_night_race: circuit.and_then(|c| c.is_night_race),
                    track_type: circuit.and_then(|c| c.track_type.clone()),
                    race_distance_km: race.and_then(|r| r.race_distance_km),
                    finished: u8::from(finished),
                    finish_position: result.position_order.filter(|_| finished),
                    is_top10: u8::from(result.order_within(10)),
                }
            })
            .collect();
        rows.sort_by_key(|r| {
            (
                r.race_id,
                r.position_order.unwrap_or(i64::MAX),
                r.driver_id,
            )
        });

        self.save(output::DRIVER_RACE_BASE, &rows)
    }

    /// Per-driver results aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if `results_cleaned.csv` or `drivers_cleaned.csv`
    /// is missing or unreadable.
    pub fn build_drivers_performance(&self) -> Result<FeatureReport> {
        let results: Vec<ResultRecord> = self.cleaned("results")?;
        let surnames = self.driver_surnames()?;

        let mut tallies: BTreeMap<i64, ResultTally> = BTreeMap::new();
        for result in &results {
            tallies.entry(result.driver_id).or_default().add(result, None);
        }

        let rows: Vec<DriverPerformanceRow> = tallies
            .into_iter()
            .map(|(driver_id, tally)| DriverPerformanceRow {
                driver_id,
                surname: surnames.get(&driver_id).cloned(),
                races_count: tally.races_count(),
                finished_races: tally.finished,
                finish_rate: tally.finish_rate(),
                win_count: tally.wins,
                podiums: tally.podiums,
                top10_finishes: tally.top10,
                avg_finish_position: tally.finish_positions.value(),
                total_points: tally.points,
            })
            .collect();

        self.save(output::DRIVERS_PERFORMANCE, &rows)
    }

    /// Per-constructor results aggregates with retirement counts.
    ///
    /// A retirement is any result that is not a classified finish. Its
    /// mechanical and crash counts come from [`ReliabilityCause`], so one
    /// retirement may count in both or in neither.
    ///
    /// # Errors
    ///
    /// Returns an error if a cleaned input is missing or unreadable.
    pub fn build_constructors_performance(&self) -> Result<FeatureReport> {
        let results: Vec<ResultRecord> = self.cleaned("results")?;
        let names = self.constructor_names()?;
        let causes = self.reliability_causes()?;

        let mut tallies: BTreeMap<i64, ResultTally> = BTreeMap::new();
        for result in &results {
            tallies
                .entry(result.constructor_id)
                .or_default()
                .add(result, causes.get(&result.status_id).copied());
        }

        let rows: Vec<ConstructorPerformanceRow> = tallies
            .into_iter()
            .map(|(constructor_id, tally)| ConstructorPerformanceRow {
                constructor_id,
                name: names.get(&constructor_id).cloned(),
                races_count: tally.races_count(),
                finished_races: tally.finished,
                finish_rate: tally.finish_rate(),
                win_count: tally.wins,
                podiums: tally.podiums,
                top10_finishes: tally.top10,
                avg_finish_position: tally.finish_positions.value(),
                total_points: tally.points,
                total_dnf: tally.dnf,
                mechanical_dnf: tally.mechanical_dnf,
                crash_dnf: tally.crash_dnf,
                reliability_rate: ratio(tally.finished, tally.finished + tally.dnf),
            })
            .collect();

        self.save(output::CONSTRUCTORS_PERFORMANCE, &rows)
    }

    /// Per-driver sprint aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if `sprint_results_cleaned.csv` or
    /// `drivers_cleaned.csv` is missing or unreadable.
    pub fn build_sprint_performance(&self) -> Result<FeatureReport> {
        #[derive(Default)]
        struct Tally {
            count: usize,
            finished: usize,
            best: Option<i64>,
            finished_positions: Mean,
            top3: usize,
            top8: usize,
            points: f64,
        }

        let sprints: Vec<ResultRecord> = self.cleaned("sprint_results")?;
        let surnames = self.driver_surnames()?;

        let mut tallies: BTreeMap<i64, Tally> = BTreeMap::new();
        for sprint in &sprints {
            let tally = tallies.entry(sprint.driver_id).or_default();
            tally.count += 1;
            if let Some(position) = sprint.position {
                tally.best = min_opt(tally.best, position);
            }
            if sprint.status_id == FINISHED_STATUS_ID {
                tally.finished += 1;
                if let Some(position) = sprint.position {
                    tally.finished_positions.add(as_f64(position));
                }
            }
            if sprint.position_within(3) {
                tally.top3 += 1;
            }
            if sprint.position_within(8) {
                tally.top8 += 1;
            }
            tally.points += sprint.points.unwrap_or(0.0);
        }

        let rows: Vec<SprintPerformanceRow> = tallies
            .into_iter()
            .map(|(driver_id, t)| SprintPerformanceRow {
                driver_id,
                surname: surnames.get(&driver_id).cloned(),
                sprint_count: t.count,
                sprint_finished: t.finished,
                best_sprint_position: t.best,
                avg_sprint_position: t.finished_positions.value(),
                top3_sprint_finishes: t.top3,
                top8_sprint_finishes: t.top8,
                sprint_points: t.points,
            })
            .collect();

        self.save(output::SPRINT_PERFORMANCE, &rows)
    }

    /// Per-driver qualifying aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if `qualifying_cleaned.csv` or `drivers_cleaned.csv`
    /// is missing or unreadable.
    pub fn build_qualifying_performance(&self) -> Result<FeatureReport> {
        #[derive(Default)]
        struct Tally {
            sessions: usize,
            poles: usize,
            positions: Mean,
            best: Option<i64>,
            q1: usize,
            q2: usize,
            q3: usize,
        }

        let entries: Vec<QualifyingRecord> = self.cleaned("qualifying")?;
        let surnames = self.driver_surnames()?;

        let mut tallies: BTreeMap<i64, Tally> = BTreeMap::new();
        for entry in &entries {
            let tally = tallies.entry(entry.driver_id).or_default();
            tally.sessions += 1;
            if let Some(position) = entry.position {
                if position == 1 {
                    tally.poles += 1;
                }
                tally.positions.add(as_f64(position));
                tally.best = min_opt(tally.best, position);
            }
            tally.q1 += usize::from(entry.q1.is_some());
            tally.q2 += usize::from(entry.q2.is_some());
            tally.q3 += usize::from(entry.q3.is_some());
        }

        let rows: Vec<QualifyingPerformanceRow> = tallies
            .into_iter()
            .map(|(driver_id, t)| QualifyingPerformanceRow {
                driver_id,
                surname: surnames.get(&driver_id).cloned(),
                quali_sessions_count: t.sessions,
                pole_count: t.poles,
                avg_quali_position: t.positions.value(),
                best_quali_position: t.best,
                q1_appearances: t.q1,
                q2_appearances: t.q2,
                q3_appearances: t.q3,
            })
            .collect();

        self.save(output::QUALIFYING_PERFORMANCE, &rows)
    }

    /// Per-driver pit-stop duration aggregates.
    ///
    /// # Errors
    ///
    /// Returns an error if `pit_stops_cleaned.csv` or `drivers_cleaned.csv`
    /// is missing or unreadable.
    pub fn build_pit_stops_performance(&self) -> Result<FeatureReport> {
        #[derive(Default)]
        struct Tally {
            stops: usize,
            durations: Mean,
            best: Option<i64>,
            worst: Option<i64>,
        }

        let stops: Vec<PitStopRecord> = self.cleaned("pit_stops")?;
        let surnames = self.driver_surnames()?;

        let mut tallies: BTreeMap<i64, Tally> = BTreeMap::new();
        for stop in &stops {
            let tally = tallies.entry(stop.driver_id).or_default();
            tally.stops += 1;
            if let Some(ms) = stop.milliseconds {
                tally.durations.add(as_f64(ms));
                tally.best = min_opt(tally.best, ms);
                tally.worst = max_opt(tally.worst, ms);
            }
        }

        let rows: Vec<PitStopPerformanceRow> = tallies
            .into_iter()
            .map(|(driver_id, t)| PitStopPerformanceRow {
                driver_id,
                surname: surnames.get(&driver_id).cloned(),
                pit_stops_count: t.stops,
                avg_pit_duration_ms: t.durations.value(),
                best_pit_duration_ms: t.best,
                worst_pit_duration_ms: t.worst,
            })
            .collect();

        self.save(output::PIT_STOPS_PERFORMANCE, &rows)
    }

    /// Results aggregates per driver and circuit.
    ///
    /// # Errors
    ///
    /// Returns an error if a cleaned input is missing or unreadable.
    pub fn build_driver_circuits_performance(&self) -> Result<FeatureReport> {
        let results: Vec<ResultRecord> = self.cleaned("results")?;
        let race_circuits: HashMap<i64, i64> = self
            .cleaned::<RaceRecord>("races")?
            .into_iter()
            .map(|r| (r.race_id, r.circuit_id))
            .collect();
        let circuit_names: HashMap<i64, String> = self
            .cleaned::<CircuitRecord>("circuits")?
            .into_iter()
            .map(|c| (c.circuit_id, c.name))
            .collect();
        let surnames = self.driver_surnames()?;

        let mut tallies: BTreeMap<(i64, i64), ResultTally> = BTreeMap::new();
        for result in &results {
            let Some(&circuit_id) = race_circuits.get(&result.race_id) else {
                debug!(race_id = result.race_id, "result for unknown race skipped");
                continue;
            };
            tallies
                .entry((result.driver_id, circuit_id))
                .or_default()
                .add(result, None);
        }

        let rows: Vec<DriverCircuitPerformanceRow> = tallies
            .into_iter()
            .map(|((driver_id, circuit_id), tally)| DriverCircuitPerformanceRow {
                driver_id,
                surname: surnames.get(&driver_id).cloned(),
                circuit_id,
                circuit_name: circuit_names.get(&circuit_id).cloned(),
                races_count: tally.races_count(),
                finished_races: tally.finished,
                avg_finish_position: tally.finish_positions.value(),
                best_finish_position: tally.best_finish,
                win_count: tally.wins,
                podiums: tally.podiums,
                total_points: tally.points,
            })
            .collect();

        self.save(output::DRIVER_CIRCUITS_PERFORMANCE, &rows)
    }

    /// Join the driver-race base with driver and constructor performance.
    ///
    /// Performance columns are prefixed `driver_` and `constructor_`. Their
    /// name columns are dropped since the base table already carries
    /// `surname` and `constructor_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if an earlier feature table is missing, or a
    /// verification error if the joined output lacks a column.
    pub fn build_races_drivers_features(&self) -> Result<FeatureReport> {
        let base = Table::read_expecting(
            self.layout.processed(output::DRIVER_RACE_BASE),
            DriverRaceBaseRow::COLUMNS,
        )?;
        let mut drivers = Table::read_expecting(
            self.layout.processed(output::DRIVERS_PERFORMANCE),
            DriverPerformanceRow::COLUMNS,
        )?;
        let mut constructors = Table::read_expecting(
            self.layout.processed(output::CONSTRUCTORS_PERFORMANCE),
            ConstructorPerformanceRow::COLUMNS,
        )?;
        drivers.drop_columns(&["surname"]);
        constructors.drop_columns(&["name"]);

        let mut expected: Vec<String> = base.headers().to_vec();
        expected.extend(prefixed(&drivers, "driverId", "driver_"));
        expected.extend(prefixed(&constructors, "constructorId", "constructor_"));

        let mut joined = base
            .left_join(&drivers, "driverId", Some("driver_"))?
            .left_join(&constructors, "constructorId", Some("constructor_"))?;
        joined.set_name("races_drivers_features");

        let path = self.layout.processed(output::RACES_DRIVERS_FEATURES);
        joined.write(&path)?;

        let expected: Vec<&str> = expected.iter().map(String::as_str).collect();
        let check = Table::read_expecting(&path, &expected)?;
        if check.len() != base.len() {
            return Err(Error::verification(
                "races_drivers_features",
                format!("expected {} rows, read back {}", base.len(), check.len()),
            ));
        }

        info!(
            rows = check.len(),
            columns = check.headers().len(),
            path = %path.display(),
            "model table written"
        );
        Ok(FeatureReport {
            table: "races_drivers_features".to_string(),
            output: path,
            rows: check.len(),
        })
    }

    /// Build every feature table in dependency order.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn build_all(&self) -> Result<Vec<FeatureReport>> {
        Ok(vec![
            self.build_driver_race_base()?,
            self.build_drivers_performance()?,
            self.build_constructors_performance()?,
            self.build_sprint_performance()?,
            self.build_qualifying_performance()?,
            self.build_pit_stops_performance()?,
            self.build_driver_circuits_performance()?,
            self.build_races_drivers_features()?,
        ])
    }
}

fn prefixed(table: &Table, key: &str, prefix: &str) -> Vec<String> {
    table
        .headers()
        .iter()
        .filter(|h| *h != key)
        .map(|h| format!("{prefix}{h}"))
        .collect()
}
