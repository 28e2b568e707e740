//! Column-preserving CSV tables.
//!
//! The filters in [`crate::clean`] must pass through every column of a raw
//! file untouched, whatever the dataset version carries, so tables are kept
//! as ordered string grids. Typed views are layered on top by
//! [`crate::records`].

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::trace;

use crate::error::{Error, Result};

/// Null marker used by the Ergast-derived dataset.
pub const NULL_TOKEN: &str = "\\N";

/// Returns true when a raw cell holds no value.
#[must_use]
pub fn is_null(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell == NULL_TOKEN || cell.eq_ignore_ascii_case("NA")
}

/// Parse an integer cell, accepting float text with a zero fraction.
#[must_use]
pub fn parse_i64(cell: &str) -> Option<i64> {
    if is_null(cell) {
        return None;
    }
    let cell = cell.trim();
    if let Ok(value) = cell.parse::<i64>() {
        return Some(value);
    }
    let value = cell.parse::<f64>().ok()?;
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let whole = value as i64;
    Some(whole)
}

/// Parse a float cell.
#[must_use]
pub fn parse_f64(cell: &str) -> Option<f64> {
    if is_null(cell) {
        return None;
    }
    cell.trim().parse::<f64>().ok()
}

/// Parse a boolean cell.
#[must_use]
pub fn parse_bool(cell: &str) -> Option<bool> {
    match cell.trim() {
        "true" | "True" | "TRUE" | "1" => Some(true),
        "false" | "False" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

/// An in-memory CSV table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// A borrowed row of a [`Table`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    headers: &'a [String],
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// Raw cell text for `column`, or `None` if the column is unknown.
    #[must_use]
    pub fn raw(&self, column: &str) -> Option<&'a str> {
        let idx = self.headers.iter().position(|h| h == column)?;
        let cells: &'a [String] = self.cells;
        Some(cells[idx].as_str())
    }

    /// Raw cell text by position.
    #[must_use]
    pub fn at(&self, idx: usize) -> &'a str {
        let cells: &'a [String] = self.cells;
        &cells[idx]
    }

    /// Non-null cell text for `column`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.raw(column).filter(|cell| !is_null(cell))
    }

    /// Integer value of `column`.
    #[must_use]
    pub fn i64(&self, column: &str) -> Option<i64> {
        self.raw(column).and_then(parse_i64)
    }

    /// Float value of `column`.
    #[must_use]
    pub fn f64(&self, column: &str) -> Option<f64> {
        self.raw(column).and_then(parse_f64)
    }

    /// Boolean value of `column`.
    #[must_use]
    pub fn bool(&self, column: &str) -> Option<bool> {
        self.raw(column).and_then(parse_bool)
    }

    /// All cells in header order.
    #[must_use]
    pub fn cells(&self) -> &'a [String] {
        self.cells
    }
}

impl Table {
    /// Create an empty table with the given headers.
    ///
    /// # Errors
    ///
    /// Returns an error if a header name repeats.
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Result<Self> {
        let name = name.into();
        let mut seen = BTreeSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(Error::malformed(
                    name,
                    format!("duplicate column '{header}'"),
                ));
            }
        }
        Ok(Self {
            name,
            headers,
            rows: Vec::new(),
        })
    }

    /// Create a table from headers and rows.
    ///
    /// # Errors
    ///
    /// Returns an error if headers repeat or any row has the wrong width.
    pub fn from_rows(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self> {
        let mut table = Self::new(name, headers)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Read a CSV file with a header row. The table is named after the file stem.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingInput`] if the file does not exist, or a CSV
    /// error if it cannot be parsed.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingInput {
                path: path.to_path_buf(),
            });
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut reader = csv::Reader::from_path(path).map_err(|e| Error::csv(path, e))?;
        let headers = reader
            .headers()
            .map_err(|e| Error::csv(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut table = Self::new(name, headers)?;
        for record in reader.records() {
            let record = record.map_err(|e| Error::csv(path, e))?;
            table.push_row(record.iter().map(str::to_string).collect())?;
        }

        trace!(
            table = %table.name,
            rows = table.len(),
            columns = table.headers.len(),
            "read table"
        );
        Ok(table)
    }

    /// Read a CSV file and check that it carries every column in `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] naming the missing columns, or any
    /// error from [`Table::read`].
    pub fn read_expecting(path: impl AsRef<Path>, expected: &[&str]) -> Result<Self> {
        let table = Self::read(path)?;
        let missing: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|c| !table.has_column(c))
            .collect();
        if missing.is_empty() {
            Ok(table)
        } else {
            Err(Error::verification(
                &table.name,
                format!("missing columns {}", missing.join(", ")),
            ))
        }
    }

    /// Write the table to a CSV file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut writer = csv::Writer::from_path(path).map_err(|e| Error::csv(path, e))?;
        writer
            .write_record(&self.headers)
            .map_err(|e| Error::csv(path, e))?;
        for row in &self.rows {
            writer.write_record(row).map_err(|e| Error::csv(path, e))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the table.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Column names in order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the table has the given column.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Position of `column`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] if the column does not exist.
    pub fn column(&self, column: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| Error::missing_column(&self.name, column))
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row width does not match the header.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(Error::malformed(
                &self.name,
                format!(
                    "row {} has {} cells, expected {}",
                    self.rows.len() + 1,
                    row.len(),
                    self.headers.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row {
            headers: &self.headers,
            cells,
        })
    }

    /// Row at `idx`.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<Row<'_>> {
        self.rows.get(idx).map(|cells| Row {
            headers: &self.headers,
            cells,
        })
    }

    /// Return a copy holding only rows matching `keep`.
    #[must_use]
    pub fn filter<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(Row<'_>) -> bool,
    {
        let rows = self
            .iter()
            .filter(|row| keep(*row))
            .map(|row| row.cells.to_vec())
            .collect();
        Self {
            name: self.name.clone(),
            headers: self.headers.clone(),
            rows,
        }
    }

    /// Distinct integer values of `column`; null and non-numeric cells are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist.
    pub fn distinct_i64(&self, column: &str) -> Result<BTreeSet<i64>> {
        let idx = self.column(column)?;
        Ok(self.rows.iter().filter_map(|r| parse_i64(&r[idx])).collect())
    }

    /// Insert empty columns directly after `anchor`, in the given order.
    ///
    /// Columns that already exist are left where they are, so repeated calls
    /// do not duplicate them.
    ///
    /// # Errors
    ///
    /// Returns an error if `anchor` does not exist.
    pub fn insert_columns_after(&mut self, anchor: &str, columns: &[&str]) -> Result<()> {
        let mut at = self.column(anchor)? + 1;
        for column in columns {
            if let Some(existing) = self.headers.iter().position(|h| h == column) {
                at = at.max(existing + 1);
                continue;
            }
            self.headers.insert(at, (*column).to_string());
            for row in &mut self.rows {
                row.insert(at, String::new());
            }
            at += 1;
        }
        Ok(())
    }

    /// Remove the named columns. Unknown names are ignored.
    pub fn drop_columns(&mut self, columns: &[&str]) {
        let keep: Vec<bool> = self
            .headers
            .iter()
            .map(|h| !columns.contains(&h.as_str()))
            .collect();
        let retain = |cells: &mut Vec<String>| {
            let mut flags = keep.iter();
            cells.retain(|_| flags.next().copied().unwrap_or(true));
        };
        retain(&mut self.headers);
        for row in &mut self.rows {
            retain(row);
        }
    }

    /// Overwrite the cell at `row`, `column`.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or the row is out of range.
    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) -> Result<()> {
        let idx = self.column(column)?;
        let len = self.rows.len();
        let cells = self.rows.get_mut(row).ok_or_else(|| {
            Error::internal(format!("row {row} out of range for {len} rows"))
        })?;
        cells[idx] = value.into();
        Ok(())
    }

    /// Left-join `right` on the shared `key` column.
    ///
    /// Every right-hand column except the key is appended, renamed with
    /// `prefix` when given. Rows without a match get empty cells. When the
    /// right table repeats a key, the first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns an error if either side lacks `key` or the joined header
    /// would contain a duplicate column.
    pub fn left_join(&self, right: &Table, key: &str, prefix: Option<&str>) -> Result<Self> {
        let left_key = self.column(key)?;
        let right_key = right.column(key)?;

        let carried: Vec<usize> = (0..right.headers.len()).filter(|&i| i != right_key).collect();

        let mut headers = self.headers.clone();
        headers.extend(carried.iter().map(|&i| match prefix {
            Some(p) => format!("{p}{}", right.headers[i]),
            None => right.headers[i].clone(),
        }));

        let mut lookup: HashMap<&str, &[String]> = HashMap::with_capacity(right.len());
        for row in &right.rows {
            lookup.entry(row[right_key].as_str()).or_insert(row.as_slice());
        }

        let mut joined = Self::new(self.name.clone(), headers)?;
        for row in &self.rows {
            let mut cells = row.clone();
            match lookup.get(row[left_key].as_str()) {
                Some(matched) => cells.extend(carried.iter().map(|&i| matched[i].clone())),
                None => cells.extend(std::iter::repeat(String::new()).take(carried.len())),
            }
            joined.rows.push(cells);
        }
        Ok(joined)
    }

    /// First `n` rows as a new table.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        Self {
            name: self.name.clone(),
            headers: self.headers.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Render the table as aligned plain text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(String::len).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{c:<w$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = line(&self.headers);
        for row in &self.rows {
            out.push('\n');
            out.push_str(&line(row));
        }
        out
    }

    /// Rows as JSON objects keyed by header.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object = self
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(h, c)| {
                        let value = if is_null(c) {
                            serde_json::Value::Null
                        } else {
                            serde_json::Value::String(c.clone())
                        };
                        (h.clone(), value)
                    })
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn circuits() -> Table {
        Table::from_rows(
            "circuits",
            strings(&["circuitId", "name", "alt", "url"]),
            vec![
                strings(&["1", "Albert Park", "10", "http://a"]),
                strings(&["14", "Monza", "162", "http://m"]),
                strings(&["99", "Old Track", "\\N", "http://o"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_is_null() {
        assert!(is_null(""));
        assert!(is_null("  "));
        assert!(is_null("\\N"));
        assert!(is_null("NA"));
        assert!(!is_null("0"));
    }

    #[test]
    fn test_parse_i64() {
        assert_eq!(parse_i64("42"), Some(42));
        assert_eq!(parse_i64("3.0"), Some(3));
        assert_eq!(parse_i64("3.5"), None);
        assert_eq!(parse_i64("\\N"), None);
        assert_eq!(parse_i64("abc"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_duplicate_headers_rejected() {
        let err = Table::new("t", strings(&["a", "b", "a"])).unwrap_err();
        assert!(err.to_string().contains("duplicate column 'a'"));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let mut table = Table::new("t", strings(&["a", "b"])).unwrap();
        assert!(table.push_row(strings(&["1"])).is_err());
        assert!(table.push_row(strings(&["1", "2"])).is_ok());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_row_accessors() {
        let table = circuits();
        let row = table.row(0).unwrap();
        assert_eq!(row.i64("circuitId"), Some(1));
        assert_eq!(row.get("name"), Some("Albert Park"));
        assert_eq!(row.f64("alt"), Some(10.0));
        assert_eq!(row.raw("missing"), None);

        let old = table.row(2).unwrap();
        assert_eq!(old.raw("alt"), Some("\\N"));
        assert_eq!(old.get("alt"), None);
    }

    #[test]
    fn test_column_missing() {
        let err = circuits().column("raceId").unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }

    #[test]
    fn test_filter_keeps_all_columns() {
        let table = circuits();
        let kept = table.filter(|row| row.i64("circuitId") != Some(99));
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.headers(), table.headers());
    }

    #[test]
    fn test_distinct_i64() {
        let table = circuits();
        let ids: Vec<i64> = table.distinct_i64("circuitId").unwrap().into_iter().collect();
        assert_eq!(ids, vec![1, 14, 99]);
    }

    #[test]
    fn test_insert_columns_after() {
        let mut table = circuits();
        table
            .insert_columns_after("alt", &["length_km", "is_night_race", "track_type"])
            .unwrap();
        assert_eq!(
            table.headers(),
            strings(&[
                "circuitId",
                "name",
                "alt",
                "length_km",
                "is_night_race",
                "track_type",
                "url"
            ])
        );
        assert_eq!(table.row(1).unwrap().raw("url"), Some("http://m"));
        assert_eq!(table.row(1).unwrap().raw("length_km"), Some(""));
    }

    #[test]
    fn test_insert_columns_after_is_idempotent() {
        let mut table = circuits();
        table.insert_columns_after("alt", &["length_km"]).unwrap();
        table.set(0, "length_km", "5.278").unwrap();
        table
            .insert_columns_after("alt", &["length_km", "track_type"])
            .unwrap();

        assert_eq!(
            table.headers(),
            strings(&["circuitId", "name", "alt", "length_km", "track_type", "url"])
        );
        assert_eq!(table.row(0).unwrap().raw("length_km"), Some("5.278"));
    }

    #[test]
    fn test_insert_columns_missing_anchor() {
        let mut table = circuits();
        assert!(table.insert_columns_after("lng", &["x"]).is_err());
    }

    #[test]
    fn test_drop_columns() {
        let mut table = circuits();
        table.drop_columns(&["alt", "missing"]);
        assert_eq!(table.headers(), strings(&["circuitId", "name", "url"]));
        assert_eq!(table.row(2).unwrap().cells(), strings(&["99", "Old Track", "http://o"]));
    }

    #[test]
    fn test_left_join_with_prefix() {
        let left = Table::from_rows(
            "base",
            strings(&["driverId", "raceId"]),
            vec![strings(&["1", "100"]), strings(&["2", "100"])],
        )
        .unwrap();
        let right = Table::from_rows(
            "perf",
            strings(&["driverId", "win_count"]),
            vec![strings(&["1", "5"])],
        )
        .unwrap();

        let joined = left.left_join(&right, "driverId", Some("driver_")).unwrap();
        assert_eq!(
            joined.headers(),
            strings(&["driverId", "raceId", "driver_win_count"])
        );
        assert_eq!(joined.row(0).unwrap().i64("driver_win_count"), Some(5));
        assert_eq!(joined.row(1).unwrap().raw("driver_win_count"), Some(""));
    }

    #[test]
    fn test_left_join_collision_rejected() {
        let left = Table::from_rows("l", strings(&["id", "name"]), vec![]).unwrap();
        let right = Table::from_rows("r", strings(&["id", "name"]), vec![]).unwrap();
        assert!(left.left_join(&right, "id", None).is_err());
        assert!(left.left_join(&right, "id", Some("r_")).is_ok());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("circuits.csv");
        let table = circuits();
        table.write(&path).unwrap();

        let read = Table::read(&path).unwrap();
        assert_eq!(read, table);
        assert_eq!(read.name(), "circuits");
    }

    #[test]
    fn test_read_expecting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("circuits.csv");
        circuits().write(&path).unwrap();

        assert!(Table::read_expecting(&path, &["circuitId", "alt"]).is_ok());
        let err = Table::read_expecting(&path, &["circuitId", "length_km", "track_type"]).unwrap_err();
        assert!(matches!(err, Error::Verification { .. }));
        assert!(err.to_string().contains("length_km, track_type"));
    }

    #[test]
    fn test_read_missing_file() {
        let err = Table::read("/nonexistent/races.csv").unwrap_err();
        assert!(err.is_missing_input());
    }

    #[test]
    fn test_head_and_render() {
        let head = circuits().head(1);
        assert_eq!(head.len(), 1);
        let text = head.render();
        assert!(text.starts_with("circuitId"));
        assert!(text.contains("Albert Park"));
    }

    #[test]
    fn test_to_json_nulls() {
        let json = circuits().to_json();
        assert_eq!(json[2]["alt"], serde_json::Value::Null);
        assert_eq!(json[0]["name"], "Albert Park");
    }
}
