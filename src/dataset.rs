use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::types::round_price;

pub const PRICE_COLUMN: &str = "Trip_Price";
pub const WEATHER_COLUMN: &str = "Weather";
pub const TIME_OF_DAY_COLUMN: &str = "Time_of_Day";

// Cells read as missing, the same spellings pandas treats as NaN by default.
const MISSING_MARKERS: [&str; 9] = ["", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("could not read dataset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("dataset is missing required column {0}")]
    MissingColumn(&'static str),
}

/// Aggregates served by `GET /summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    #[serde(rename = "antal resor")]
    pub trip_count: usize,
    #[serde(rename = "medelpris")]
    pub mean_price: Option<f64>,
    #[serde(rename = "unika_väder")]
    pub distinct_weather: usize,
    #[serde(rename = "unika_tidpunkter")]
    pub distinct_times_of_day: usize,
}

/// The reference trip dataset, read once and never modified.
#[derive(Debug, Clone)]
pub struct TaxiData {
    columns: Vec<String>,
    records: Vec<Map<String, Value>>,
}

impl TaxiData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let read_err = |source: csv::Error| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = std::fs::File::open(path).map_err(|e| read_err(csv::Error::from(e)))?;
        Self::from_reader(file).map_err(|e| match e {
            DatasetError::Read { source, .. } => read_err(source),
            other => other,
        })
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self, DatasetError> {
        let read_err = |source: csv::Error| DatasetError::Read {
            path: PathBuf::from("<reader>"),
            source,
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr
            .headers()
            .map_err(read_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        for required in [PRICE_COLUMN, WEATHER_COLUMN, TIME_OF_DAY_COLUMN] {
            if !columns.iter().any(|c| c == required) {
                return Err(DatasetError::MissingColumn(required));
            }
        }

        let mut records = Vec::new();
        for row in rdr.records() {
            let row = row.map_err(read_err)?;
            let record = columns
                .iter()
                .zip(row.iter())
                .map(|(name, raw)| (name.clone(), parse_cell(raw)))
                .collect();
            records.push(record);
        }
        for name in &columns {
            widen_numeric_column(&mut records, name);
        }

        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Map<String, Value>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> DatasetSummary {
        let prices: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.get(PRICE_COLUMN).and_then(Value::as_f64))
            .collect();
        let mean_price = if prices.is_empty() {
            None
        } else {
            let mean = prices.iter().sum::<f64>() / prices.len() as f64;
            Some(round_price(mean))
        };

        DatasetSummary {
            trip_count: self.records.len(),
            mean_price,
            distinct_weather: self.distinct(WEATHER_COLUMN),
            distinct_times_of_day: self.distinct(TIME_OF_DAY_COLUMN),
        }
    }

    fn distinct(&self, column: &str) -> usize {
        self.records
            .iter()
            .filter_map(|r| match r.get(column) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            })
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// A numeric column holding a gap or a fractional value is a float column:
/// its integer cells are widened so `3` reads back as `3.0`.
fn widen_numeric_column(records: &mut [Map<String, Value>], column: &str) {
    let mut has_float = false;
    let mut has_gap = false;
    for value in records.iter().filter_map(|r| r.get(column)) {
        match value {
            Value::Null => has_gap = true,
            Value::Number(n) if n.is_f64() => has_float = true,
            Value::Number(_) => {}
            _ => return,
        }
    }
    if !has_float && !has_gap {
        return;
    }
    for record in records.iter_mut() {
        if let Some(cell) = record.get_mut(column) {
            if let Some(i) = cell.as_i64() {
                *cell = Value::from(i as f64);
            }
        }
    }
}

fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if MISSING_MARKERS.contains(&trimmed) {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}
