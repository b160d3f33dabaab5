//! OHLCV bar type and validity rules.

use serde::{Deserialize, Serialize};

use super::Timeframe;
use crate::error::{BacktestError, Result};

/// A single immutable OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Unix timestamp in seconds (bar open time)
    pub timestamp: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume in base units
    pub volume: f64,
    /// Ticker symbol
    pub symbol: String,
    /// Interval this bar covers
    pub timeframe: Timeframe,
}

impl Bar {
    /// Construct a 1-minute bar.
    pub fn new_1m(
        symbol: impl Into<String>,
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            symbol: symbol.into(),
            timeframe: Timeframe::M1,
        }
    }

    /// Typical price `(high + low + close) / 3`, used by VWAP.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Check the OHLCV consistency rules.
    ///
    /// A valid bar has finite, non-negative prices and volume, with
    /// `high >= max(open, close, low)` and `low <= min(open, close, high)`.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, v) in fields {
            if !v.is_finite() {
                return Err(BacktestError::invalid_bar(
                    self.timestamp,
                    format!("{name} is not finite"),
                ));
            }
            if v < 0.0 {
                return Err(BacktestError::invalid_bar(
                    self.timestamp,
                    format!("{name} is negative"),
                ));
            }
        }
        if self.high < self.open.max(self.close).max(self.low) {
            return Err(BacktestError::invalid_bar(
                self.timestamp,
                "high below open/close/low",
            ));
        }
        if self.low > self.open.min(self.close).min(self.high) {
            return Err(BacktestError::invalid_bar(
                self.timestamp,
                "low above open/close/high",
            ));
        }
        Ok(())
    }
}
