//! Moving Average Convergence Divergence (MACD) indicator.

use crate::models::Bar;

use super::ema::Ema;
use super::{Indicator, IndicatorError, IndicatorValue, PriceSource, Result};

/// Moving Average Convergence Divergence.
///
/// - `macd = EMA(fast) − EMA(slow)`
/// - `signal = EMA(macd, signal_period)`
/// - `hist = macd − signal`
///
/// Output record fields: `macd`, `signal`, `hist`. The value is `None`
/// until the signal line has warmed up.
#[derive(Debug, Clone)]
pub struct Macd {
    source: PriceSource,
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    /// Create a new MACD with the given EMA periods.
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self> {
        if fast == 0 || slow == 0 || signal == 0 {
            return Err(IndicatorError::InvalidPeriod(
                "Periods must be greater than 0".to_string(),
            ));
        }
        if fast >= slow {
            return Err(IndicatorError::InvalidParameter {
                param: "fast".to_string(),
                reason: "fast period must be shorter than slow period".to_string(),
            });
        }
        Ok(Self {
            source: PriceSource::Close,
            fast: Ema::new(fast)?,
            slow: Ema::new(slow)?,
            signal: Ema::new(signal)?,
        })
    }

    /// Select the bar field to read
    pub fn with_source(mut self, source: PriceSource) -> Self {
        self.source = source;
        self
    }
}

impl Indicator for Macd {
    fn update(&mut self, bar: &Bar) {
        let value = self.source.apply(bar);
        self.fast.push(value);
        self.slow.push(value);
        if let (Some(f), Some(s)) = (self.fast.current(), self.slow.current()) {
            self.signal.push(f - s);
        }
    }

    fn value(&self) -> Option<IndicatorValue> {
        let macd = self.fast.current()? - self.slow.current()?;
        let signal = self.signal.current()?;
        Some(IndicatorValue::record([
            ("macd", macd),
            ("signal", signal),
            ("hist", macd - signal),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bar(ts: i64, price: f64) -> Bar {
        Bar::new_1m("TEST", ts, price, price, price, price, 1.0)
    }

    #[test]
    fn test_macd_warmup() {
        let mut macd = Macd::new(2, 4, 2).unwrap();
        // Slow EMA needs 4 bars, signal needs 2 macd values after that
        for i in 0..4 {
            macd.update(&flat_bar(i * 60, 100.0));
            assert!(macd.value().is_none());
        }
        macd.update(&flat_bar(240, 100.0));
        assert!(macd.value().is_some());
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let mut macd = Macd::new(2, 4, 2).unwrap();
        for i in 0..10 {
            macd.update(&flat_bar(i * 60, 100.0));
        }
        let value = macd.value().unwrap();
        assert!(value.field("macd").unwrap().abs() < 1e-12);
        assert!(value.field("signal").unwrap().abs() < 1e-12);
        assert!(value.field("hist").unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let mut macd = Macd::new(3, 6, 3).unwrap();
        for i in 0..20 {
            macd.update(&flat_bar(i * 60, 100.0 + i as f64));
        }
        // Fast EMA sits above slow EMA in a steady uptrend
        assert!(macd.value().unwrap().field("macd").unwrap() > 0.0);
    }

    #[test]
    fn test_macd_invalid_params_rejected() {
        assert!(Macd::new(0, 26, 9).is_err());
        assert!(Macd::new(26, 12, 9).is_err());
        assert!(Macd::new(12, 12, 9).is_err());
    }
}
