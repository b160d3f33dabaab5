//! Bollinger Bands indicator.

use std::collections::VecDeque;

use crate::models::Bar;

use super::{Indicator, IndicatorError, IndicatorValue, PriceSource, Result};

/// Bollinger Bands.
///
/// A middle band (SMA) with upper/lower bands `num_std` population standard
/// deviations away, plus two derived fields:
///
/// - `bandwidth = (upper − lower) / middle`
/// - `pct_b = (price − lower) / (upper − lower)`
///
/// Output record fields: `upper`, `middle`, `lower`, `bandwidth`, `pct_b`.
#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    num_std: f64,
    source: PriceSource,
    window: VecDeque<f64>,
}

impl Bollinger {
    /// Create new bands over `period` values with `num_std` deviations.
    pub fn new(period: usize, num_std: f64) -> Result<Self> {
        if period == 0 {
            return Err(IndicatorError::InvalidPeriod(
                "Period must be greater than 0".to_string(),
            ));
        }
        if !(num_std.is_finite() && num_std > 0.0) {
            return Err(IndicatorError::InvalidParameter {
                param: "num_std".to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        Ok(Self {
            period,
            num_std,
            source: PriceSource::Close,
            window: VecDeque::with_capacity(period + 1),
        })
    }

    /// Select the bar field to read
    pub fn with_source(mut self, source: PriceSource) -> Self {
        self.source = source;
        self
    }
}

impl Indicator for Bollinger {
    fn update(&mut self, bar: &Bar) {
        self.window.push_back(self.source.apply(bar));
        if self.window.len() > self.period {
            self.window.pop_front();
        }
    }

    fn value(&self) -> Option<IndicatorValue> {
        if self.window.len() < self.period {
            return None;
        }
        let n = self.period as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let variance = self.window.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        let upper = mean + self.num_std * std_dev;
        let lower = mean - self.num_std * std_dev;
        let price = *self.window.back()?;

        let bandwidth = if mean != 0.0 { (upper - lower) / mean } else { 0.0 };
        let band_range = upper - lower;
        let pct_b = if band_range != 0.0 {
            (price - lower) / band_range
        } else {
            0.5
        };

        Some(IndicatorValue::record([
            ("upper", upper),
            ("middle", mean),
            ("lower", lower),
            ("bandwidth", bandwidth),
            ("pct_b", pct_b),
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
    fn test_bollinger_warmup() {
        let mut bb = Bollinger::new(3, 2.0).unwrap();
        bb.update(&flat_bar(0, 100.0));
        bb.update(&flat_bar(60, 100.0));
        assert!(bb.value().is_none());
        bb.update(&flat_bar(120, 100.0));
        assert!(bb.value().is_some());
    }

    #[test]
    fn test_bollinger_flat_prices_collapse_bands() {
        let mut bb = Bollinger::new(3, 2.0).unwrap();
        for i in 0..3 {
            bb.update(&flat_bar(i * 60, 100.0));
        }
        let value = bb.value().unwrap();
        assert_eq!(value.field("upper"), Some(100.0));
        assert_eq!(value.field("middle"), Some(100.0));
        assert_eq!(value.field("lower"), Some(100.0));
        assert_eq!(value.field("bandwidth"), Some(0.0));
        // Degenerate band: pct_b falls back to the midpoint
        assert_eq!(value.field("pct_b"), Some(0.5));
    }

    #[test]
    fn test_bollinger_known_values() {
        // Window [1, 2, 3]: mean 2, population std sqrt(2/3)
        let mut bb = Bollinger::new(3, 2.0).unwrap();
        for (i, p) in [1.0, 2.0, 3.0].iter().enumerate() {
            bb.update(&flat_bar(i as i64 * 60, *p));
        }
        let value = bb.value().unwrap();
        let std = (2.0f64 / 3.0).sqrt();
        assert!((value.field("middle").unwrap() - 2.0).abs() < 1e-12);
        assert!((value.field("upper").unwrap() - (2.0 + 2.0 * std)).abs() < 1e-12);
        assert!((value.field("lower").unwrap() - (2.0 - 2.0 * std)).abs() < 1e-12);

        // Last price 3 sits above the middle: pct_b > 0.5
        assert!(value.field("pct_b").unwrap() > 0.5);
    }

    #[test]
    fn test_bollinger_invalid_params_rejected() {
        assert!(Bollinger::new(0, 2.0).is_err());
        assert!(Bollinger::new(20, 0.0).is_err());
        assert!(Bollinger::new(20, f64::NAN).is_err());
    }
}
