//! Bar stream providers and the validation layer.

mod csv;

pub use csv::{CsvOptions, CsvSource, load_csv};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BacktestError, Result};
use crate::models::{Bar, Timeframe};

/// A restartable, chronological source of bars.
///
/// Implementations must yield bars in strictly non-decreasing timestamp
/// order. `reset` rewinds to the beginning so a run can be replayed
/// byte-identically.
pub trait BarSource {
    /// The next bar, or `None` at end of stream
    fn next_bar(&mut self) -> Option<Bar>;

    /// Rewind to the beginning of the stream
    fn reset(&mut self);

    /// Ticker symbol this source produces
    fn symbol(&self) -> &str;

    /// Timeframe of the produced bars
    fn timeframe(&self) -> Timeframe;
}

/// In-memory bar source backed by a `Vec`.
#[derive(Debug, Clone)]
pub struct VecSource {
    bars: Vec<Bar>,
    cursor: usize,
    symbol: String,
    timeframe: Timeframe,
}

impl VecSource {
    /// Wrap a pre-sorted vector of bars.
    ///
    /// The symbol and timeframe descriptors are taken from the first bar;
    /// an empty vector yields an empty stream with placeholder descriptors.
    pub fn new(bars: Vec<Bar>) -> Self {
        let symbol = bars
            .first()
            .map(|b| b.symbol.clone())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let timeframe = bars.first().map(|b| b.timeframe).unwrap_or_default();
        Self {
            bars,
            cursor: 0,
            symbol,
            timeframe,
        }
    }

    /// Number of bars in the source.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Whether the source holds no bars.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl BarSource for VecSource {
    fn next_bar(&mut self) -> Option<Bar> {
        let bar = self.bars.get(self.cursor).cloned();
        if bar.is_some() {
            self.cursor += 1;
        }
        bar
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

/// How malformed bars are handled by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Abort the run on the first malformed or out-of-order bar
    #[default]
    Strict,
    /// Drop malformed bars with a warning and continue
    FilterAndWarn,
}

/// Stateful bar checker enforcing the validity rules and timestamp order.
#[derive(Debug, Clone)]
pub struct Validator {
    policy: ValidationPolicy,
    last_timestamp: Option<i64>,
}

impl Validator {
    /// New validator with the given policy.
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            policy,
            last_timestamp: None,
        }
    }

    /// Check one bar. Returns `Ok(true)` to accept it, `Ok(false)` to skip
    /// it (filter policy), or an error under the strict policy.
    pub fn check(&mut self, bar: &Bar) -> Result<bool> {
        let verdict = bar.validate().and_then(|()| match self.last_timestamp {
            Some(prev) if bar.timestamp < prev => Err(BacktestError::OutOfOrderBar {
                prev,
                got: bar.timestamp,
            }),
            _ => Ok(()),
        });

        match verdict {
            Ok(()) => {
                self.last_timestamp = Some(bar.timestamp);
                Ok(true)
            }
            Err(err) => match self.policy {
                ValidationPolicy::Strict => Err(err),
                ValidationPolicy::FilterAndWarn => {
                    warn!(symbol = %bar.symbol, timestamp = bar.timestamp, %err, "dropping bad bar");
                    Ok(false)
                }
            },
        }
    }

    /// Forget the last-seen timestamp (used on rewinds).
    pub fn reset(&mut self) {
        self.last_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new_1m("BTC/USD", ts, close, close, close, close, 1.0)
    }

    #[test]
    fn test_vec_source_yields_in_order_and_resets() {
        let mut source = VecSource::new(vec![bar(0, 1.0), bar(60, 2.0)]);
        assert_eq!(source.symbol(), "BTC/USD");
        assert_eq!(source.next_bar().unwrap().timestamp, 0);
        assert_eq!(source.next_bar().unwrap().timestamp, 60);
        assert!(source.next_bar().is_none());

        source.reset();
        assert_eq!(source.next_bar().unwrap().timestamp, 0);
    }

    #[test]
    fn test_validator_strict_rejects_out_of_order() {
        let mut v = Validator::new(ValidationPolicy::Strict);
        assert!(v.check(&bar(60, 1.0)).unwrap());
        assert!(v.check(&bar(0, 1.0)).is_err());
    }

    #[test]
    fn test_validator_accepts_equal_timestamps() {
        // Contract is non-decreasing, not strictly increasing
        let mut v = Validator::new(ValidationPolicy::Strict);
        assert!(v.check(&bar(60, 1.0)).unwrap());
        assert!(v.check(&bar(60, 1.0)).unwrap());
    }

    #[test]
    fn test_validator_filter_skips_bad_bars() {
        let mut v = Validator::new(ValidationPolicy::FilterAndWarn);
        assert!(v.check(&bar(0, 1.0)).unwrap());

        let mut bad = bar(60, 1.0);
        bad.high = 0.5; // high below close
        assert!(!v.check(&bad).unwrap());

        // Stream continues after the skip
        assert!(v.check(&bar(120, 1.0)).unwrap());
    }

    #[test]
    fn test_validator_strict_rejects_nan() {
        let mut v = Validator::new(ValidationPolicy::Strict);
        let mut bad = bar(0, 1.0);
        bad.close = f64::NAN;
        assert!(v.check(&bad).is_err());
    }
}
