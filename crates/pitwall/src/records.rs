//! Typed views of processed dataset files.
//!
//! Feature builders only need a handful of columns from each table, so they
//! deserialize rows into these records and ignore the rest. Output tables go
//! the other way through [`write_rows`].

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::table::{is_null, parse_bool, parse_f64, parse_i64};

/// Status id the dataset uses for a classified finisher.
pub const FINISHED_STATUS_ID: i64 = 1;

fn nullable_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !is_null(s)))
}

fn nullable_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_i64))
}

fn nullable_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_f64))
}

fn nullable_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_bool))
}

/// A race from `races_cleaned.csv`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RaceRecord {
    /// Race id.
    #[serde(rename = "raceId")]
    pub race_id: i64,
    /// Season.
    pub year: i64,
    /// Round within the season.
    #[serde(deserialize_with = "nullable_i64", default)]
    pub round: Option<i64>,
    /// Circuit id.
    #[serde(rename = "circuitId")]
    pub circuit_id: i64,
    /// Grand Prix name.
    #[serde(default)]
    pub name: String,
    /// Total race distance, filled by enrichment.
    #[serde(deserialize_with = "nullable_f64", default)]
    pub race_distance_km: Option<f64>,
}

/// A circuit from `circuits_cleaned.csv`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CircuitRecord {
    /// Circuit id.
    #[serde(rename = "circuitId")]
    pub circuit_id: i64,
    /// Circuit name.
    #[serde(default)]
    pub name: String,
    /// Altitude in metres.
    #[serde(deserialize_with = "nullable_f64", default)]
    pub alt: Option<f64>,
    /// Lap length, filled by enrichment.
    #[serde(deserialize_with = "nullable_f64", default)]
    pub length_km: Option<f64>,
    /// Night race flag, filled by enrichment.
    #[serde(deserialize_with = "nullable_bool", default)]
    pub is_night_race: Option<bool>,
    /// Track type label, filled by enrichment.
    #[serde(deserialize_with = "nullable_string", default)]
    pub track_type: Option<String>,
}

/// A driver from `drivers_cleaned.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriverRecord {
    /// Driver id.
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    /// Family name.
    #[serde(default)]
    pub surname: String,
}

/// A constructor from `constructors_cleaned.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConstructorRecord {
    /// Constructor id.
    #[serde(rename = "constructorId")]
    pub constructor_id: i64,
    /// Team name.
    #[serde(default)]
    pub name: String,
}

/// A status from `status_cleaned.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusRecord {
    /// Status id.
    #[serde(rename = "statusId")]
    pub status_id: i64,
    /// Status text, e.g. "Engine" or "+1 Lap".
    #[serde(default)]
    pub status: String,
    /// Category written by enrichment.
    #[serde(deserialize_with = "nullable_string", default)]
    pub dnf_category: Option<String>,
}

/// A race result from `results_cleaned.csv` or `sprint_results_cleaned.csv`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultRecord {
    /// Race id.
    #[serde(rename = "raceId")]
    pub race_id: i64,
    /// Driver id.
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    /// Constructor id.
    #[serde(rename = "constructorId")]
    pub constructor_id: i64,
    /// Starting grid slot.
    #[serde(deserialize_with = "nullable_i64", default)]
    pub grid: Option<i64>,
    /// Classified position; null for non-classified entries.
    #[serde(deserialize_with = "nullable_i64", default)]
    pub position: Option<i64>,
    /// Final order including non-classified entries.
    #[serde(rename = "positionOrder", deserialize_with = "nullable_i64", default)]
    pub position_order: Option<i64>,
    /// Points scored.
    #[serde(deserialize_with = "nullable_f64", default)]
    pub points: Option<f64>,
    /// Laps completed.
    #[serde(deserialize_with = "nullable_i64", default)]
    pub laps: Option<i64>,
    /// Status id.
    #[serde(rename = "statusId")]
    pub status_id: i64,
}

impl ResultRecord {
    /// Classified finisher: status 1 with a final position.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status_id == FINISHED_STATUS_ID && self.position_order.is_some()
    }

    /// `positionOrder` at or above `limit`.
    #[must_use]
    pub fn order_within(&self, limit: i64) -> bool {
        self.position_order.is_some_and(|p| p <= limit)
    }

    /// `position` at or above `limit`.
    #[must_use]
    pub fn position_within(&self, limit: i64) -> bool {
        self.position.is_some_and(|p| p <= limit)
    }
}

/// A qualifying entry from `qualifying_cleaned.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QualifyingRecord {
    /// Race id.
    #[serde(rename = "raceId")]
    pub race_id: i64,
    /// Driver id.
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    /// Qualifying position.
    #[serde(deserialize_with = "nullable_i64", default)]
    pub position: Option<i64>,
    /// Q1 lap time.
    #[serde(deserialize_with = "nullable_string", default)]
    pub q1: Option<String>,
    /// Q2 lap time.
    #[serde(deserialize_with = "nullable_string", default)]
    pub q2: Option<String>,
    /// Q3 lap time.
    #[serde(deserialize_with = "nullable_string", default)]
    pub q3: Option<String>,
}

/// A pit stop from `pit_stops_cleaned.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PitStopRecord {
    /// Race id.
    #[serde(rename = "raceId")]
    pub race_id: i64,
    /// Driver id.
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    /// Stationary time in milliseconds.
    #[serde(deserialize_with = "nullable_i64", default)]
    pub milliseconds: Option<i64>,
}

/// Deserialize every row of a CSV file.
///
/// # Errors
///
/// Returns [`Error::MissingInput`] if the file does not exist, or a CSV
/// error naming the file if a row does not fit `T`.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(Error::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| Error::csv(path, e))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| Error::csv(path, e))
}

/// An output row with a fixed column order.
pub trait OutputRow: Serialize {
    /// Column names in serialization order.
    const COLUMNS: &'static [&'static str];
}

/// Write `rows` to `path`, header first, even when there are no rows.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_rows<T: OutputRow>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        crate::dataset::ensure_dir(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;
    writer
        .write_record(T::COLUMNS)
        .map_err(|e| Error::csv(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| Error::csv(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_result_records_with_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "results.csv",
            "resultId,raceId,driverId,constructorId,number,grid,position,positionText,positionOrder,points,laps,time,statusId\n\
             1,1030,1,131,44,1,1,1,1,25,58,1:34:50.616,1\n\
             2,1030,2,9,33,2,\\N,R,20,0,12,\\N,5\n",
        );

        let rows: Vec<ResultRecord> = read_records(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].points, Some(25.0));
        assert!(rows[0].is_finished());
        assert!(rows[0].order_within(1));

        assert_eq!(rows[1].position, None);
        assert_eq!(rows[1].position_order, Some(20));
        assert!(!rows[1].is_finished());
        assert!(!rows[1].order_within(10));
    }

    #[test]
    fn test_race_record_without_enrichment() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "races.csv",
            "raceId,year,round,circuitId,name,date\n1030,2020,1,70,Austrian Grand Prix,2020-07-05\n",
        );
        let rows: Vec<RaceRecord> = read_records(&path).unwrap();
        assert_eq!(rows[0].race_distance_km, None);
        assert_eq!(rows[0].round, Some(1));
    }

    #[test]
    fn test_circuit_record_enriched() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "circuits.csv",
            "circuitId,name,alt,length_km,is_night_race,track_type,url\n\
             15,Marina Bay,18,4.927,True,technical,http://x\n\
             99,Unknown,\\N,,,,http://y\n",
        );
        let rows: Vec<CircuitRecord> = read_records(&path).unwrap();
        assert_eq!(rows[0].length_km, Some(4.927));
        assert_eq!(rows[0].is_night_race, Some(true));
        assert_eq!(rows[0].track_type.as_deref(), Some("technical"));
        assert_eq!(rows[1].alt, None);
        assert_eq!(rows[1].track_type, None);
    }

    #[test]
    fn test_qualifying_null_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "qualifying.csv",
            "qualifyId,raceId,driverId,constructorId,number,position,q1,q2,q3\n\
             1,1030,1,131,44,1,1:04.0,1:03.0,1:02.9\n\
             2,1030,2,9,33,16,1:05.0,\\N,\\N\n",
        );
        let rows: Vec<QualifyingRecord> = read_records(&path).unwrap();
        assert!(rows[0].q3.is_some());
        assert_eq!(rows[1].q2, None);
        assert_eq!(rows[1].q3, None);
    }

    #[test]
    fn test_read_records_missing_file() {
        let err = read_records::<DriverRecord>(Path::new("/nonexistent.csv")).unwrap_err();
        assert!(err.is_missing_input());
    }

    #[test]
    fn test_read_records_missing_required_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "drivers.csv", "surname\nHamilton\n");
        assert!(read_records::<DriverRecord>(&path).is_err());
    }

    #[derive(Serialize)]
    struct Sample {
        id: i64,
        value: Option<f64>,
    }

    impl OutputRow for Sample {
        const COLUMNS: &'static [&'static str] = &["id", "value"];
    }

    #[test]
    fn test_write_rows_writes_header_for_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_rows::<Sample>(&path, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id,value\n");
    }

    #[test]
    fn test_write_rows_nulls_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        write_rows(
            &path,
            &[
                Sample {
                    id: 1,
                    value: Some(0.5),
                },
                Sample { id: 2, value: None },
            ],
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "id,value\n1,0.5\n2,\n"
        );
    }
}
