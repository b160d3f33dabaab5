//! Volume Weighted Average Price (VWAP) indicator.

use crate::models::Bar;

use super::{Indicator, IndicatorValue};

const SECS_PER_DAY: i64 = 86_400;

/// Volume Weighted Average Price with a daily reset.
///
/// Running `Σ(typical price × volume) / Σ(volume)` where
/// `typical = (high + low + close) / 3`. The accumulators reset when a bar's
/// timestamp crosses into a new UTC day; the crossing bar's volume counts
/// toward the new day.
#[derive(Debug, Clone, Default)]
pub struct Vwap {
    day: Option<i64>,
    pv_sum: f64,
    volume_sum: f64,
}

impl Vwap {
    /// Create a new VWAP accumulator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for Vwap {
    fn update(&mut self, bar: &Bar) {
        let day = bar.timestamp.div_euclid(SECS_PER_DAY);
        if self.day != Some(day) {
            self.day = Some(day);
            self.pv_sum = 0.0;
            self.volume_sum = 0.0;
        }
        self.pv_sum += bar.typical_price() * bar.volume;
        self.volume_sum += bar.volume;
    }

    fn value(&self) -> Option<IndicatorValue> {
        if self.volume_sum > 0.0 {
            Some(IndicatorValue::Scalar(self.pv_sum / self.volume_sum))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar::new_1m("TEST", ts, close, high, low, close, volume)
    }

    #[test]
    fn test_vwap_basic() {
        let mut vwap = Vwap::new();
        vwap.update(&bar(0, 102.0, 100.0, 101.0, 1000.0));
        vwap.update(&bar(60, 104.0, 101.0, 103.0, 1200.0));

        let tp1 = (102.0 + 100.0 + 101.0) / 3.0;
        let tp2 = (104.0 + 101.0 + 103.0) / 3.0;
        let expected = (tp1 * 1000.0 + tp2 * 1200.0) / 2200.0;

        let value = vwap.value().unwrap().as_scalar().unwrap();
        assert!((value - expected).abs() < 1e-9);
    }

    #[test]
    fn test_vwap_zero_volume_is_none() {
        let mut vwap = Vwap::new();
        vwap.update(&bar(0, 102.0, 100.0, 101.0, 0.0));
        assert!(vwap.value().is_none());
    }

    #[test]
    fn test_vwap_resets_at_midnight_utc() {
        let mut vwap = Vwap::new();
        // 23:59 UTC on day 0
        vwap.update(&bar(SECS_PER_DAY - 60, 102.0, 100.0, 101.0, 5000.0));
        // 00:00 UTC on day 1: accumulators reset before this bar's volume
        vwap.update(&bar(SECS_PER_DAY, 202.0, 200.0, 201.0, 1000.0));

        let value = vwap.value().unwrap().as_scalar().unwrap();
        let tp = (202.0 + 200.0 + 201.0) / 3.0;
        assert!((value - tp).abs() < 1e-9);
    }
}
