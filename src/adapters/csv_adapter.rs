//! CSV file data adapter.
//!
//! One file per symbol, `<dir>/<SYMBOL>.csv`, with a header row naming
//! `timestamp,open,high,low,close` and an optional `volume` column.

use crate::domain::error::BarstepError;
use crate::domain::ohlcv::PriceBar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn data_error(reason: impl Into<String>) -> BarstepError {
    BarstepError::Data {
        reason: reason.into(),
    }
}

/// Parse a timestamp in any accepted layout; a bare date means midnight.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, BarstepError> {
    let value = value.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| data_error(format!("invalid timestamp: {}", value)))
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    name: &str,
    line: u64,
) -> Result<&'r str, BarstepError> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| data_error(format!("line {}: missing {} column", line, name)))
}

fn price(record: &csv::StringRecord, idx: usize, name: &str, line: u64) -> Result<f64, BarstepError> {
    let raw = field(record, idx, name, line)?;
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse()
        .map_err(|e| data_error(format!("line {}: invalid {} value {:?}: {}", line, name, raw, e)))
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, BarstepError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| data_error(format!("CSV header error in {}: {}", path.display(), e)))?
            .clone();
        let require = |name: &str| {
            column(&headers, name).ok_or_else(|| {
                data_error(format!("{} has no {} column", path.display(), name))
            })
        };
        let ts_col = require("timestamp")?;
        let open_col = require("open")?;
        let high_col = require("high")?;
        let low_col = require("low")?;
        let close_col = require("close")?;
        let volume_col = column(&headers, "volume");

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let timestamp = parse_timestamp(field(&record, ts_col, "timestamp", line)?)?;
            let date = timestamp.date();
            if start.is_some_and(|s| date < s) || end.is_some_and(|e| date > e) {
                continue;
            }

            let volume = match volume_col {
                Some(idx) => {
                    let raw = field(&record, idx, "volume", line)?;
                    if raw.is_empty() {
                        0
                    } else {
                        raw.parse().map_err(|e| {
                            data_error(format!("line {}: invalid volume value: {}", line, e))
                        })?
                    }
                }
                None => 0,
            };

            bars.push(PriceBar {
                symbol: symbol.to_string(),
                timestamp,
                open: price(&record, open_col, "open", line)?,
                high: price(&record, high_col, "high", line)?,
                low: price(&record, low_col, "low", line)?,
                close: price(&record, close_col, "close", line)?,
                volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(data_error(format!(
                "{} has two bars at {}",
                path.display(),
                pair[0].timestamp
            )));
        }
        tracing::debug!(symbol, bars = bars.len(), path = %path.display(), "loaded bars");
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, BarstepError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {}", e)))?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "timestamp,open,high,low,close,volume\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n";
        fs::write(path.join("BHP.csv"), csv_content).unwrap();
        fs::write(
            path.join("AAPL.csv"),
            "timestamp,open,high,low,close\n2018-01-05 08:00:00,10,11,9,10.5\n2018-01-05 08:01,10.5,,10,10.2\n",
        )
        .unwrap();
        fs::write(path.join("notes.txt"), "ignored").unwrap();

        (dir, path)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fetch_bars_sorted_by_timestamp() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("BHP", None, None).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp, date(2024, 1, 15).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(bars[0].open, 100.0);
        assert_eq!(bars[0].high, 110.0);
        assert_eq!(bars[0].low, 90.0);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[0].volume, 50000);
        assert_eq!(bars[0].symbol, "BHP");
    }

    #[test]
    fn fetch_bars_filters_date_range() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter
            .fetch_bars("BHP", Some(date(2024, 1, 16)), Some(date(2024, 1, 16)))
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 110.0);
    }

    #[test]
    fn intraday_without_volume_and_blank_price() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_bars("AAPL", None, None).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].timestamp.format("%H:%M").to_string(), "08:01");
        assert!(bars[1].high.is_nan());
        assert_eq!(bars[1].volume, 0);
    }

    #[test]
    fn missing_file_is_data_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let err = adapter.fetch_bars("NOPE", None, None).unwrap_err();
        assert!(matches!(err, BarstepError::Data { .. }));
    }

    #[test]
    fn missing_column_is_data_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("X.csv"), "timestamp,open,high,low\n2024-01-01,1,1,1\n").unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let err = adapter.fetch_bars("X", None, None).unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn duplicate_timestamp_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("X.csv"),
            "timestamp,open,high,low,close\n2024-01-01,1,1,1,1\n2024-01-01,2,2,2,2\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        assert!(adapter.fetch_bars("X", None, None).is_err());
    }

    #[test]
    fn list_symbols_finds_csv_files() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(adapter.list_symbols().unwrap(), vec!["AAPL", "BHP"]);
    }

    #[test]
    fn parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-02T09:30:00").is_ok());
        assert!(parse_timestamp("2024-01-02 09:30").is_ok());
        assert!(parse_timestamp("02/01/2024").is_err());
    }
}
