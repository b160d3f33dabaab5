//! Bar timeframes and epoch-aligned bucket arithmetic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BacktestError;

/// Bar interval supported by the resampler.
///
/// Bucket boundaries are computed from the Unix epoch (UTC), so a given
/// timestamp always falls into the same bucket regardless of where the
/// stream started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// 1 minute (the base stream)
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 2 hours
    H2,
    /// 4 hours
    H4,
    /// 1 day (midnight-UTC aligned)
    D1,
}

impl Timeframe {
    /// Duration of this timeframe in minutes
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// Duration in seconds
    pub fn seconds(&self) -> i64 {
        self.minutes() * 60
    }

    /// Start of the bucket containing `timestamp` (Unix seconds).
    ///
    /// Buckets are aligned to the epoch, which for `D1` coincides with
    /// midnight UTC.
    pub fn bucket_start(&self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.seconds())
    }

    /// All timeframes the resampler can produce, ascending
    pub fn all() -> [Timeframe; 8] {
        [
            Timeframe::M1,
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H2,
            Timeframe::H4,
            Timeframe::D1,
        ]
    }

    /// Short label, e.g. `"15m"` or `"1d"`
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::M1
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Timeframe {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::M1),
            "5m" | "5min" => Ok(Timeframe::M5),
            "15m" | "15min" => Ok(Timeframe::M15),
            "30m" | "30min" => Ok(Timeframe::M30),
            "1h" | "60m" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "1d" | "1day" => Ok(Timeframe::D1),
            _ => Err(BacktestError::invalid_param(
                "timeframe",
                format!("unknown timeframe '{s}', expected one of 1m/5m/15m/30m/1h/2h/4h/1d"),
            )),
        }
    }
}
