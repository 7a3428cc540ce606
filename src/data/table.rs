//! Raw observation table.
//!
//! This is the canonical input for the training pipeline: one row per
//! monitoring-point timestep, carrying the sequence identifier, the
//! observation date, the static site columns, the temporal driver columns,
//! and the observed water-level rise.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{N_STATIC_FEATURES, N_TEMPORAL_FEATURES};

/// A single dated observation row.
///
/// The static columns are site attributes and must be constant across all
/// rows of a sequence; the windower reads them from the first row of each
/// group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    /// Groups rows into sequences. Windows never cross this boundary.
    pub sequence_id: String,
    /// Observation date, used to order rows within a sequence.
    pub date: NaiveDate,

    // Static site columns.
    pub elevation: f32,
    pub impervious_pct: f32,
    pub drainage_capacity: f32,
    pub avg_slope: f32,

    // Temporal driver columns.
    pub rainfall: f32,
    pub temperature: f32,
    pub antecedent_precipitation: f32,
    pub river_level: f32,
    pub groundwater_depth: f32,

    /// Observed water-level rise at this timestep (the prediction target).
    pub rise: f32,
}

impl ObservationRow {
    /// Static feature values in canonical column order.
    pub fn static_features(&self) -> [f32; N_STATIC_FEATURES] {
        [
            self.elevation,
            self.impervious_pct,
            self.drainage_capacity,
            self.avg_slope,
        ]
    }

    /// Temporal driver values in canonical column order.
    pub fn temporal_features(&self) -> [f32; N_TEMPORAL_FEATURES] {
        [
            self.rainfall,
            self.temperature,
            self.antecedent_precipitation,
            self.river_level,
            self.groundwater_depth,
        ]
    }
}

/// Errors raised while loading an observation table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
}

/// An in-memory observation table.
///
/// Rows may arrive in any order; grouping and date sorting is the
/// windower's responsibility.
#[derive(Debug, Clone, Default)]
pub struct ObservationTable {
    rows: Vec<ObservationRow>,
}

impl ObservationTable {
    /// Create a table from pre-built rows.
    pub fn from_rows(rows: Vec<ObservationRow>) -> Self {
        Self { rows }
    }

    /// Load a table from a headered CSV file.
    ///
    /// Column names must match the [`ObservationRow`] field names; dates are
    /// ISO `YYYY-MM-DD`.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: ObservationRow = record?;
            rows.push(row);
        }

        Ok(Self { rows })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows, in input order.
    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_row(seq: &str, day: u32, rise: f32) -> ObservationRow {
        ObservationRow {
            sequence_id: seq.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            elevation: 10.0,
            impervious_pct: 40.0,
            drainage_capacity: 0.5,
            avg_slope: 2.0,
            rainfall: 1.0,
            temperature: 15.0,
            antecedent_precipitation: 0.3,
            river_level: 2.1,
            groundwater_depth: 4.0,
            rise,
        }
    }

    #[test]
    fn feature_column_order_is_canonical() {
        let row = sample_row("a", 1, 0.1);
        assert_eq!(row.static_features(), [10.0, 40.0, 0.5, 2.0]);
        assert_eq!(row.temporal_features(), [1.0, 15.0, 0.3, 2.1, 4.0]);
    }

    #[test]
    fn csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observations.csv");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "sequence_id,date,elevation,impervious_pct,drainage_capacity,avg_slope,\
             rainfall,temperature,antecedent_precipitation,river_level,groundwater_depth,rise"
        )
        .unwrap();
        writeln!(file, "s1,2024-01-01,10,40,0.5,2,1.2,15,0.3,2.1,4,0.05").unwrap();
        writeln!(file, "s1,2024-01-02,10,40,0.5,2,3.4,14,0.9,2.3,3.9,0.12").unwrap();
        drop(file);

        let table = ObservationTable::from_csv_path(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].sequence_id, "s1");
        assert_eq!(table.rows()[1].rainfall, 3.4);
        assert_eq!(
            table.rows()[1].date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn malformed_csv_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "sequence_id,date,elevation").unwrap();
        writeln!(file, "s1,not-a-date,10").unwrap();
        drop(file);

        assert!(ObservationTable::from_csv_path(&path).is_err());
    }
}
