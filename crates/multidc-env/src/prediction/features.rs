//! Historical turbine features from CSV traces
//!
//! Each turbine trace holds one row per simulation step. The simulator skips
//! the first `csv_start_offset` rows, so simulation step `t` maps to row
//! `t + csv_start_offset`.

use crate::error::{EnvError, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Number of input features per timestep
pub const NUM_FEATURES: usize = 13;

/// Feature columns in model input order
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "Wspd", "Wdir", "Etmp", "Itmp", "Ndir", "Pab1", "Prtv", "T2m", "Sp", "RelH", "Wspd_w",
    "Wdir_w", "Patv",
];

/// Active power column, the forecast target (kW)
pub const TARGET_FEATURE: &str = "Patv";

pub const TARGET_INDEX: usize = NUM_FEATURES - 1;

pub type FeatureRow = [f32; NUM_FEATURES];

/// In-memory turbine traces indexed by turbine id
#[derive(Debug, Clone, Default)]
pub struct CsvFeatureLoader {
    turbines: BTreeMap<u32, Vec<FeatureRow>>,
    csv_start_offset: usize,
}

impl CsvFeatureLoader {
    pub fn new(csv_start_offset: usize) -> Self {
        Self {
            turbines: BTreeMap::new(),
            csv_start_offset,
        }
    }

    /// Load every trace; unreadable files are logged and left out
    pub fn from_paths(paths: &BTreeMap<u32, PathBuf>, csv_start_offset: usize) -> Self {
        let mut loader = Self::new(csv_start_offset);
        for (&turbine_id, path) in paths {
            match read_trace_file(path) {
                Ok(rows) => {
                    info!(
                        turbine_id = turbine_id,
                        rows = rows.len(),
                        path = %path.display(),
                        "Loaded turbine trace"
                    );
                    loader.insert_turbine(turbine_id, rows);
                }
                Err(e) => {
                    error!(turbine_id = turbine_id, path = %path.display(), error = %e, "Failed to load turbine trace");
                }
            }
        }
        loader
    }

    pub fn insert_turbine(&mut self, turbine_id: u32, rows: Vec<FeatureRow>) {
        self.turbines.insert(turbine_id, rows);
    }

    pub fn has_turbine(&self, turbine_id: u32) -> bool {
        self.turbines.contains_key(&turbine_id)
    }

    pub fn row_count(&self, turbine_id: u32) -> Option<usize> {
        self.turbines.get(&turbine_id).map(Vec::len)
    }

    /// Trace row for a simulation time; `None` when it is not finite or
    /// does not fit in an index
    pub fn csv_index(&self, simulation_time: f64) -> Option<i64> {
        if !simulation_time.is_finite() || simulation_time.abs() >= i64::MAX as f64 {
            return None;
        }
        let offset = i64::try_from(self.csv_start_offset).ok()?;
        (simulation_time as i64).checked_add(offset)
    }

    /// The `lookback` rows ending at the row for `simulation_time`
    ///
    /// Returns `None` when the window starts before the trace or ends past it.
    pub fn historical_features(
        &self,
        turbine_id: u32,
        simulation_time: f64,
        lookback: usize,
    ) -> Option<&[FeatureRow]> {
        let Some(rows) = self.turbines.get(&turbine_id) else {
            warn!(turbine_id = turbine_id, "No trace loaded for turbine");
            return None;
        };

        let Some(end) = self.csv_index(simulation_time) else {
            warn!(
                turbine_id = turbine_id,
                simulation_time = simulation_time,
                "Simulation time outside any turbine trace"
            );
            return None;
        };
        let start = i64::try_from(lookback)
            .ok()
            .and_then(|lookback| end.checked_sub(lookback))
            .and_then(|before| before.checked_add(1))
            .unwrap_or(-1);
        if start < 0 {
            warn!(
                turbine_id = turbine_id,
                simulation_time = simulation_time,
                start_index = start,
                "Insufficient history for forecast"
            );
            return None;
        }
        if end >= rows.len() as i64 {
            warn!(
                turbine_id = turbine_id,
                simulation_time = simulation_time,
                index = end,
                trace_len = rows.len(),
                "Simulation time beyond turbine trace"
            );
            return None;
        }
        rows.get(start as usize..=end as usize)
    }
}

fn read_trace_file(path: &Path) -> Result<Vec<FeatureRow>> {
    let file = std::fs::File::open(path)?;
    read_trace(file)
}

/// Parse a trace; missing columns and unparsable or NaN cells read as 0.0
pub fn read_trace<R: Read>(reader: R) -> Result<Vec<FeatureRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| EnvError::Prediction(format!("invalid trace header: {}", e)))?
        .clone();
    let columns: Vec<Option<usize>> = FEATURE_COLUMNS
        .iter()
        .map(|name| headers.iter().position(|h| h == *name))
        .collect();

    let missing: Vec<&str> = FEATURE_COLUMNS
        .iter()
        .zip(&columns)
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Trace is missing feature columns, filling with 0");
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| EnvError::Prediction(format!("invalid trace row: {}", e)))?;
        let mut row = [0.0_f32; NUM_FEATURES];
        for (slot, column) in row.iter_mut().zip(&columns) {
            *slot = column
                .and_then(|idx| record.get(idx))
                .and_then(|cell| cell.parse::<f32>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn trace(rows: usize) -> Vec<FeatureRow> {
        (0..rows)
            .map(|i| {
                let mut row = [0.0; NUM_FEATURES];
                row[TARGET_INDEX] = i as f32;
                row
            })
            .collect()
    }

    #[test]
    fn test_read_trace_fills_missing_columns_and_nan() {
        let data = "Wspd,Patv,Extra\n3.5,120.0,x\nNaN,,y\n";
        let rows = read_trace(data.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], 3.5);
        assert_eq!(rows[0][TARGET_INDEX], 120.0);
        assert_eq!(rows[0][1], 0.0);
        assert_eq!(rows[1][0], 0.0);
        assert_eq!(rows[1][TARGET_INDEX], 0.0);
    }

    #[test]
    fn test_window_aligned_with_offset() {
        let mut loader = CsvFeatureLoader::new(12);
        loader.insert_turbine(1, trace(40));

        // step 0 -> row 12, window rows 1..=12
        let window = loader.historical_features(1, 0.0, 12).unwrap();
        assert_eq!(window.len(), 12);
        assert_eq!(window[0][TARGET_INDEX], 1.0);
        assert_eq!(window[11][TARGET_INDEX], 12.0);

        // fractional times truncate
        let window = loader.historical_features(1, 3.9, 12).unwrap();
        assert_eq!(window[11][TARGET_INDEX], 15.0);
    }

    #[test]
    fn test_window_out_of_range() {
        let mut loader = CsvFeatureLoader::new(0);
        loader.insert_turbine(1, trace(20));

        assert!(loader.historical_features(1, 5.0, 12).is_none());
        assert!(loader.historical_features(1, 11.0, 12).is_some());
        assert!(loader.historical_features(1, 19.0, 12).is_some());
        assert!(loader.historical_features(1, 20.0, 12).is_none());
        assert!(loader.historical_features(2, 15.0, 12).is_none());
    }

    #[test]
    fn test_huge_simulation_times_have_no_history() {
        let mut loader = CsvFeatureLoader::new(12);
        loader.insert_turbine(1, trace(40));

        assert_eq!(loader.csv_index(1e30), None);
        assert_eq!(loader.csv_index(f64::MAX), None);
        assert_eq!(loader.csv_index(f64::NAN), None);
        assert_eq!(loader.csv_index(f64::INFINITY), None);
        assert_eq!(loader.csv_index(3.0), Some(15));

        assert!(loader.historical_features(1, 1e30, 12).is_none());
        assert!(loader.historical_features(1, f64::MAX, 12).is_none());
        assert!(loader.historical_features(1, -1e30, 12).is_none());
        assert!(loader.historical_features(1, 0.0, usize::MAX).is_none());
    }

    #[test]
    fn test_from_paths_skips_unreadable_files() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Wspd,Patv").unwrap();
        writeln!(file, "1.0,10.0").unwrap();

        let paths = BTreeMap::from([
            (1, file.path().to_path_buf()),
            (57, PathBuf::from("/nonexistent/turbine_057.csv")),
        ]);
        let loader = CsvFeatureLoader::from_paths(&paths, 12);

        assert!(loader.has_turbine(1));
        assert!(!loader.has_turbine(57));
        assert_eq!(loader.row_count(1), Some(1));
    }
}
