//! Output rows of the feature tables.
//!
//! Field order is column order; `COLUMNS` must list the serialized names in
//! the same order. Fields are named after their columns.

#![allow(missing_docs)]

use serde::Serialize;

use crate::records::OutputRow;

/// One result with race, circuit and target columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverRaceBaseRow {
    #[serde(rename = "raceId")]
    pub race_id: i64,
    pub year: Option<i64>,
    pub round: Option<i64>,
    #[serde(rename = "circuitId")]
    pub circuit_id: Option<i64>,
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    pub surname: Option<String>,
    #[serde(rename = "constructorId")]
    pub constructor_id: i64,
    pub constructor_name: Option<String>,
    pub grid: Option<i64>,
    #[serde(rename = "positionOrder")]
    pub position_order: Option<i64>,
    pub points: Option<f64>,
    pub laps: Option<i64>,
    #[serde(rename = "statusId")]
    pub status_id: i64,
    pub dnf_category: Option<&'static str>,
    pub length_km: Option<f64>,
    pub is_night_race: Option<bool>,
    pub track_type: Option<String>,
    pub race_distance_km: Option<f64>,
    /// 1 for a classified finisher.
    pub finished: u8,
    /// `positionOrder` of a finisher, empty otherwise.
    pub finish_position: Option<i64>,
    /// 1 for `positionOrder <= 10`.
    pub is_top10: u8,
}

impl OutputRow for DriverRaceBaseRow {
    const COLUMNS: &'static [&'static str] = &[
        "raceId",
        "year",
        "round",
        "circuitId",
        "driverId",
        "surname",
        "constructorId",
        "constructor_name",
        "grid",
        "positionOrder",
        "points",
        "laps",
        "statusId",
        "dnf_category",
        "length_km",
        "is_night_race",
        "track_type",
        "race_distance_km",
        "finished",
        "finish_position",
        "is_top10",
    ];
}

/// Season aggregates for one driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverPerformanceRow {
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    pub surname: Option<String>,
    pub races_count: usize,
    pub finished_races: usize,
    pub finish_rate: f64,
    pub win_count: usize,
    pub podiums: usize,
    pub top10_finishes: usize,
    pub avg_finish_position: Option<f64>,
    pub total_points: f64,
}

impl OutputRow for DriverPerformanceRow {
    const COLUMNS: &'static [&'static str] = &[
        "driverId",
        "surname",
        "races_count",
        "finished_races",
        "finish_rate",
        "win_count",
        "podiums",
        "top10_finishes",
        "avg_finish_position",
        "total_points",
    ];
}

/// Season aggregates and reliability for one constructor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructorPerformanceRow {
    #[serde(rename = "constructorId")]
    pub constructor_id: i64,
    pub name: Option<String>,
    pub races_count: usize,
    pub finished_races: usize,
    pub finish_rate: f64,
    pub win_count: usize,
    pub podiums: usize,
    pub top10_finishes: usize,
    pub avg_finish_position: Option<f64>,
    pub total_points: f64,
    pub total_dnf: usize,
    pub mechanical_dnf: usize,
    pub crash_dnf: usize,
    pub reliability_rate: Option<f64>,
}

impl OutputRow for ConstructorPerformanceRow {
    const COLUMNS: &'static [&'static str] = &[
        "constructorId",
        "name",
        "races_count",
        "finished_races",
        "finish_rate",
        "win_count",
        "podiums",
        "top10_finishes",
        "avg_finish_position",
        "total_points",
        "total_dnf",
        "mechanical_dnf",
        "crash_dnf",
        "reliability_rate",
    ];
}

/// Sprint aggregates for one driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintPerformanceRow {
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    pub surname: Option<String>,
    pub sprint_count: usize,
    pub sprint_finished: usize,
    pub best_sprint_position: Option<i64>,
    pub avg_sprint_position: Option<f64>,
    pub top3_sprint_finishes: usize,
    pub top8_sprint_finishes: usize,
    pub sprint_points: f64,
}

impl OutputRow for SprintPerformanceRow {
    const COLUMNS: &'static [&'static str] = &[
        "driverId",
        "surname",
        "sprint_count",
        "sprint_finished",
        "best_sprint_position",
        "avg_sprint_position",
        "top3_sprint_finishes",
        "top8_sprint_finishes",
        "sprint_points",
    ];
}

/// Qualifying aggregates for one driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualifyingPerformanceRow {
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    pub surname: Option<String>,
    pub quali_sessions_count: usize,
    pub pole_count: usize,
    pub avg_quali_position: Option<f64>,
    pub best_quali_position: Option<i64>,
    pub q1_appearances: usize,
    pub q2_appearances: usize,
    pub q3_appearances: usize,
}

impl OutputRow for QualifyingPerformanceRow {
    const COLUMNS: &'static [&'static str] = &[
        "driverId",
        "surname",
        "quali_sessions_count",
        "pole_count",
        "avg_quali_position",
        "best_quali_position",
        "q1_appearances",
        "q2_appearances",
        "q3_appearances",
    ];
}

/// Pit-stop aggregates for one driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitStopPerformanceRow {
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    pub surname: Option<String>,
    pub pit_stops_count: usize,
    pub avg_pit_duration_ms: Option<f64>,
    pub best_pit_duration_ms: Option<i64>,
    pub worst_pit_duration_ms: Option<i64>,
}

impl OutputRow for PitStopPerformanceRow {
    const COLUMNS: &'static [&'static str] = &[
        "driverId",
        "surname",
        "pit_stops_count",
        "avg_pit_duration_ms",
        "best_pit_duration_ms",
        "worst_pit_duration_ms",
    ];
}

/// Aggregates for one driver at one circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverCircuitPerformanceRow {
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    pub surname: Option<String>,
    #[serde(rename = "circuitId")]
    pub circuit_id: i64,
    pub circuit_name: Option<String>,
    pub races_count: usize,
    pub finished_races: usize,
    pub avg_finish_position: Option<f64>,
    pub best_finish_position: Option<i64>,
    pub win_count: usize,
    pub podiums: usize,
    pub total_points: f64,
}

impl OutputRow for DriverCircuitPerformanceRow {
    const COLUMNS: &'static [&'static str] = &[
        "driverId",
        "surname",
        "circuitId",
        "circuit_name",
        "races_count",
        "finished_races",
        "avg_finish_position",
        "best_finish_position",
        "win_count",
        "podiums",
        "total_points",
    ];
}
