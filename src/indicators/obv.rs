//! On-Balance Volume (OBV) indicator.

use crate::models::Bar;

use super::{Indicator, IndicatorValue};

/// On-Balance Volume.
///
/// Cumulative: adds volume when the close rises, subtracts it when the
/// close falls, unchanged when equal. Starts at 0 on the first bar.
#[derive(Debug, Clone, Default)]
pub struct Obv {
    prev_close: Option<f64>,
    obv: f64,
}

impl Obv {
    /// Create a new OBV accumulator.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for Obv {
    fn update(&mut self, bar: &Bar) {
        if let Some(prev) = self.prev_close {
            if bar.close > prev {
                self.obv += bar.volume;
            } else if bar.close < prev {
                self.obv -= bar.volume;
            }
        }
        self.prev_close = Some(bar.close);
    }

    fn value(&self) -> Option<IndicatorValue> {
        self.prev_close.map(|_| IndicatorValue::Scalar(self.obv))
    }
}
