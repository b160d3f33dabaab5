//! Stochastic Oscillator indicator.

use std::collections::VecDeque;

use crate::models::Bar;

use super::sma::Sma;
use super::{Indicator, IndicatorError, IndicatorValue, Result};

/// Stochastic Oscillator.
///
/// - `raw_k = 100 × (close − lowest low) / (highest high − lowest low)` over
///   `k_period` bars (50 when the range is zero)
/// - `k = SMA(raw_k, smooth_k)`
/// - `d = SMA(k, d_period)`
///
/// Output record fields: `k`, `d`.
#[derive(Debug)]
pub struct Stochastic {
    k_period: usize,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    smooth_k: Sma,
    d: Sma,
}

impl Stochastic {
    /// Create a new oscillator.
    pub fn new(k_period: usize, smooth_k: usize, d_period: usize) -> Result<Self> {
        if k_period == 0 || smooth_k == 0 || d_period == 0 {
            return Err(IndicatorError::InvalidPeriod(
                "Periods must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            k_period,
            highs: VecDeque::new(),
            lows: VecDeque::new(),
            smooth_k: Sma::new(smooth_k)?,
            d: Sma::new(d_period)?,
        })
    }
}

impl Indicator for Stochastic {
    fn update(&mut self, bar: &Bar) {
        self.highs.push_back(bar.high);
        self.lows.push_back(bar.low);
        if self.highs.len() > self.k_period {
            self.highs.pop_front();
            self.lows.pop_front();
        }
        if self.highs.len() < self.k_period {
            return;
        }

        let highest = self.highs.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let lowest = self.lows.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let range = highest - lowest;
        let raw_k = if range == 0.0 {
            50.0 // Neutral when no range
        } else {
            (bar.close - lowest) / range * 100.0
        };

        self.smooth_k.push(raw_k);
        if let Some(k) = self.smooth_k.current() {
            self.d.push(k);
        }
    }

    fn value(&self) -> Option<IndicatorValue> {
        let k = self.smooth_k.current()?;
        let d = self.d.current()?;
        Some(IndicatorValue::record([("k", k), ("d", d)]))
    }
}
