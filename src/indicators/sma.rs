//! Simple Moving Average (SMA) indicator.

use std::collections::VecDeque;

use crate::models::Bar;

use super::{Indicator, IndicatorError, IndicatorValue, PriceSource, Result};

/// Simple Moving Average.
///
/// Arithmetic mean of the last `period` source values. Emits `None` until
/// the window is full.
///
/// # Example
///
/// ```
/// use barsim::indicators::{Indicator, Sma};
/// use barsim::models::Bar;
///
/// let mut sma = Sma::new(2).unwrap();
/// for (i, close) in [10.0, 12.0].iter().enumerate() {
///     sma.update(&Bar::new_1m("X", i as i64 * 60, *close, *close, *close, *close, 1.0));
/// }
/// assert_eq!(sma.value().unwrap().as_scalar(), Some(11.0));
/// ```
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    source: PriceSource,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    /// Create a new SMA over `period` values.
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(IndicatorError::InvalidPeriod(
                "Period must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            period,
            source: PriceSource::Close,
            window: VecDeque::with_capacity(period + 1),
            sum: 0.0,
        })
    }

    /// Select the bar field to average
    pub fn with_source(mut self, source: PriceSource) -> Self {
        self.source = source;
        self
    }

    /// Feed a raw value instead of a bar (used by composite indicators).
    pub(crate) fn push(&mut self, value: f64) {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            // unwrap is safe: len > period >= 1
            self.sum -= self.window.pop_front().unwrap();
        }
    }

    /// Current mean, or `None` during warmup.
    pub(crate) fn current(&self) -> Option<f64> {
        if self.window.len() == self.period {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }
}

impl Indicator for Sma {
    fn update(&mut self, bar: &Bar) {
        self.push(self.source.apply(bar));
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.current().map(IndicatorValue::Scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bar(ts: i64, price: f64) -> Bar {
        Bar::new_1m("TEST", ts, price, price, price, price, 1.0)
    }

    #[test]
    fn test_sma_warmup() {
        let mut sma = Sma::new(3).unwrap();
        sma.update(&flat_bar(0, 1.0));
        assert!(sma.value().is_none());
        sma.update(&flat_bar(60, 2.0));
        assert!(sma.value().is_none());
        sma.update(&flat_bar(120, 3.0));
        assert_eq!(sma.value().unwrap().as_scalar(), Some(2.0));
    }

    #[test]
    fn test_sma_rolls_window() {
        let mut sma = Sma::new(2).unwrap();
        for (i, p) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            sma.update(&flat_bar(i as i64 * 60, *p));
        }
        // Last two values: (3 + 4) / 2
        assert_eq!(sma.value().unwrap().as_scalar(), Some(3.5));
    }

    #[test]
    fn test_sma_zero_period_rejected() {
        assert!(Sma::new(0).is_err());
    }

    #[test]
    fn test_sma_source_selection() {
        let mut sma = Sma::new(1).unwrap().with_source(PriceSource::High);
        sma.update(&Bar::new_1m("TEST", 0, 10.0, 15.0, 9.0, 12.0, 1.0));
        assert_eq!(sma.value().unwrap().as_scalar(), Some(15.0));
    }
}
