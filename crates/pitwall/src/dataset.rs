//! Dataset layout and file catalog.
//!
//! Raw files from the Kaggle "Formula 1 Race Data" dataset live in
//! `raw/`; everything the pipeline produces is written to `processed/`.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

/// Raw file names of the dimension tables.
pub mod raw {
    /// Race calendar.
    pub const RACES: &str = "races.csv";
    /// Circuits.
    pub const CIRCUITS: &str = "circuits.csv";
    /// Constructors (teams).
    pub const CONSTRUCTORS: &str = "constructors.csv";
    /// Drivers.
    pub const DRIVERS: &str = "drivers.csv";
    /// Seasons.
    pub const SEASONS: &str = "seasons.csv";
    /// Result status descriptions.
    pub const STATUS: &str = "status.csv";
}

/// Tables keyed by `raceId`, as `(logical name, raw file name)`.
pub const RACE_TABLES: &[(&str, &str)] = &[
    ("constructor_results", "constructor_results.csv"),
    ("constructor_standings", "constructor_standings.csv"),
    ("driver_standings", "driver_standings.csv"),
    ("lap_times", "lap_times.csv"),
    ("pit_stops", "pit_stops.csv"),
    ("qualifying", "qualifying.csv"),
    ("results", "results.csv"),
    ("sprint_results", "sprint_results.csv"),
];

/// Every raw file the pipeline reads.
#[must_use]
pub fn known_files() -> Vec<&'static str> {
    let mut files = vec![
        raw::CIRCUITS,
        raw::CONSTRUCTORS,
        raw::DRIVERS,
        raw::RACES,
        raw::SEASONS,
        raw::STATUS,
    ];
    files.extend(RACE_TABLES.iter().map(|(_, file)| *file));
    files.sort_unstable();
    files
}

/// File name of the cleaned version of `table`.
#[must_use]
pub fn cleaned_file(table: &str) -> String {
    format!("{table}_cleaned.csv")
}

/// Raw and processed directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl DataLayout {
    /// Create a layout from explicit directories.
    #[must_use]
    pub fn new(raw_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    /// Create a layout from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.raw_dir(), config.processed_dir())
    }

    /// Create a layout with `raw/` and `processed/` under `root`.
    #[must_use]
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join("raw"), root.join("processed"))
    }

    /// Directory holding raw dataset files.
    #[must_use]
    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Directory holding pipeline outputs.
    #[must_use]
    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    /// Path of a raw file.
    #[must_use]
    pub fn raw(&self, file: &str) -> PathBuf {
        self.raw_dir.join(file)
    }

    /// Path of a processed file.
    #[must_use]
    pub fn processed(&self, file: &str) -> PathBuf {
        self.processed_dir.join(file)
    }

    /// Path of the cleaned version of `table`.
    #[must_use]
    pub fn cleaned(&self, table: &str) -> PathBuf {
        self.processed(&cleaned_file(table))
    }

    /// Create the processed directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_processed_dir(&self) -> Result<PathBuf> {
        ensure_dir(&self.processed_dir)?;
        info!(path = %self.processed_dir.display(), "processed directory ready");
        Ok(self.processed_dir.clone())
    }
}

/// Create `dir` and its parents if they do not exist.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        debug!(path = %dir.display(), "creating directory");
        std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// CSV files directly inside `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// BLAKE3 checksum of a file's contents, hex encoded.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn checksum(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_files_cover_race_tables() {
        let files = known_files();
        assert_eq!(files.len(), 14);
        assert!(files.contains(&"results.csv"));
        assert!(files.contains(&"status.csv"));
        assert!(files.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cleaned_file() {
        assert_eq!(cleaned_file("lap_times"), "lap_times_cleaned.csv");
    }

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::under("/srv/f1");
        assert_eq!(layout.raw("races.csv"), PathBuf::from("/srv/f1/raw/races.csv"));
        assert_eq!(
            layout.cleaned("races"),
            PathBuf::from("/srv/f1/processed/races_cleaned.csv")
        );
    }

    #[test]
    fn test_layout_from_config() {
        let mut config = Config::default();
        config.data.root = PathBuf::from("/tmp/pw");
        let layout = DataLayout::from_config(&config);
        assert_eq!(layout.raw_dir(), Path::new("/tmp/pw/raw"));
        assert_eq!(layout.processed_dir(), Path::new("/tmp/pw/processed"));
    }

    #[test]
    fn test_ensure_processed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::under(dir.path().join("data"));
        let out = layout.ensure_processed_dir().unwrap();
        assert!(out.is_dir());
        // second call is a no-op
        assert_eq!(layout.ensure_processed_dir().unwrap(), out);
    }

    #[test]
    fn test_list_csv_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("status.csv"), "a\n").unwrap();
        std::fs::write(dir.path().join("circuits.CSV"), "a\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "a\n").unwrap();
        std::fs::create_dir(dir.path().join("sub.csv")).unwrap();

        let names: Vec<String> = list_csv_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["circuits.CSV", "status.csv"]);
    }

    #[test]
    fn test_list_csv_files_missing_dir() {
        assert!(list_csv_files(Path::new("/nonexistent/raw")).unwrap().is_empty());
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "x\n1\n").unwrap();
        let first = checksum(&path).unwrap();
        assert_eq!(first.len(), 64);
        std::fs::write(&path, "x\n2\n").unwrap();
        assert_ne!(first, checksum(&path).unwrap());
    }
}
