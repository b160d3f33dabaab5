//! CSV bar loader.
//!
//! Expects columns `timestamp, open, high, low, close, volume` with a
//! configurable timestamp column name. Timestamps may be Unix seconds,
//! Unix milliseconds, or RFC 3339 strings.

use std::path::Path;

use chrono::DateTime;

use crate::error::{BacktestError, Result};
use crate::models::{Bar, Timeframe};

use super::{BarSource, VecSource};

/// Options for [`load_csv`].
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Symbol stamped on every loaded bar
    pub symbol: String,
    /// Timeframe stamped on every loaded bar
    pub timeframe: Timeframe,
    /// Name of the timestamp column (default `"timestamp"`)
    pub timestamp_column: String,
    /// Drop bars strictly before this Unix timestamp
    pub start: Option<i64>,
    /// Drop bars strictly after this Unix timestamp
    pub end: Option<i64>,
}

impl CsvOptions {
    /// Options for a 1-minute stream of `symbol` with default column names.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: Timeframe::M1,
            timestamp_column: "timestamp".to_string(),
            start: None,
            end: None,
        }
    }

    /// Use a different timestamp column name
    pub fn timestamp_column(mut self, name: impl Into<String>) -> Self {
        self.timestamp_column = name.into();
        self
    }

    /// Keep only bars at or after `start`
    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Keep only bars at or before `end`
    pub fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }
}

/// Milliseconds-epoch values are far larger than any plausible seconds value.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

fn parse_timestamp(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(if n >= MILLIS_THRESHOLD { n / 1000 } else { n });
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp());
    }
    Err(BacktestError::invalid_param(
        "timestamp",
        format!("cannot parse '{raw}' as Unix seconds/millis or RFC 3339"),
    ))
}

fn parse_field(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64> {
    let raw = record.get(index).unwrap_or("");
    raw.trim()
        .parse::<f64>()
        .map_err(|_| BacktestError::invalid_param(name, format!("cannot parse '{raw}' as number")))
}

/// Load bars from a CSV file, applying the optional start/end filters.
pub fn load_csv(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                BacktestError::invalid_param("csv", format!("missing column '{name}'"))
            })
    };

    let ts_idx = column(&options.timestamp_column)?;
    let open_idx = column("open")?;
    let high_idx = column("high")?;
    let low_idx = column("low")?;
    let close_idx = column("close")?;
    let volume_idx = column("volume")?;

    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record?;
        let timestamp = parse_timestamp(record.get(ts_idx).unwrap_or(""))?;
        if let Some(start) = options.start
            && timestamp < start
        {
            continue;
        }
        if let Some(end) = options.end
            && timestamp > end
        {
            continue;
        }
        bars.push(Bar {
            timestamp,
            open: parse_field(&record, open_idx, "open")?,
            high: parse_field(&record, high_idx, "high")?,
            low: parse_field(&record, low_idx, "low")?,
            close: parse_field(&record, close_idx, "close")?,
            volume: parse_field(&record, volume_idx, "volume")?,
            symbol: options.symbol.clone(),
            timeframe: options.timeframe,
        });
    }
    Ok(bars)
}

/// A [`BarSource`] reading from a CSV file loaded eagerly at construction.
pub struct CsvSource {
    inner: VecSource,
}

impl CsvSource {
    /// Load `path` with `options` into a restartable source.
    pub fn open(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Self> {
        let bars = load_csv(path, options)?;
        Ok(Self {
            inner: VecSource::new(bars),
        })
    }
}

impl BarSource for CsvSource {
    fn next_bar(&mut self) -> Option<Bar> {
        self.inner.next_bar()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn symbol(&self) -> &str {
        self.inner.symbol()
    }

    fn timeframe(&self) -> Timeframe {
        self.inner.timeframe()
    }
}
