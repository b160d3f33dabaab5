//! Exponential Moving Average (EMA) indicator.

use crate::models::Bar;

use super::{Indicator, IndicatorError, IndicatorValue, PriceSource, Result};

/// Exponential Moving Average.
///
/// Seeded with an SMA after `period` samples, then recursed with
/// `alpha = 2 / (period + 1)`:
///
/// - First EMA = SMA(period)
/// - EMA = (value − previous EMA) × alpha + previous EMA
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    source: PriceSource,
    alpha: f64,
    seed_sum: f64,
    count: usize,
    current: Option<f64>,
}

impl Ema {
    /// Create a new EMA over `period` values.
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(IndicatorError::InvalidPeriod(
                "Period must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            period,
            source: PriceSource::Close,
            alpha: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            count: 0,
            current: None,
        })
    }

    /// Select the bar field to average
    pub fn with_source(mut self, source: PriceSource) -> Self {
        self.source = source;
        self
    }

    /// Feed a raw value instead of a bar (used by composite indicators).
    pub(crate) fn push(&mut self, value: f64) {
        self.count += 1;
        match self.current {
            Some(prev) => {
                self.current = Some((value - prev) * self.alpha + prev);
            }
            None => {
                self.seed_sum += value;
                if self.count == self.period {
                    self.current = Some(self.seed_sum / self.period as f64);
                }
            }
        }
    }

    /// Current EMA, or `None` during warmup.
    pub(crate) fn current(&self) -> Option<f64> {
        self.current
    }
}

impl Indicator for Ema {
    fn update(&mut self, bar: &Bar) {
        self.push(self.source.apply(bar));
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.current.map(IndicatorValue::Scalar)
    }
}
