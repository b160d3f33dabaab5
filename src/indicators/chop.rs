//! Volatility ratio: ATR as a fraction of price.

use crate::models::Bar;

use super::{Atr, AtrSmoothing, Indicator, IndicatorValue, Result};

/// ATR divided by the latest close.
///
/// A dimensionless volatility measure, useful for regime filters: the same
/// threshold applies to a $10 coin and a $60,000 coin.
#[derive(Debug, Clone)]
pub struct Chop {
    atr: Atr,
    last_close: Option<f64>,
}

impl Chop {
    /// Create a new ratio over an ATR of `period` bars.
    pub fn new(period: usize) -> Result<Self> {
        Ok(Self {
            atr: Atr::new(period, AtrSmoothing::Wilder)?,
            last_close: None,
        })
    }
}

impl Indicator for Chop {
    fn update(&mut self, bar: &Bar) {
        self.atr.update(bar);
        self.last_close = Some(bar.close);
    }

    fn value(&self) -> Option<IndicatorValue> {
        let atr = self.atr.value()?.as_scalar()?;
        let close = self.last_close?;
        if close == 0.0 {
            return None;
        }
        Some(IndicatorValue::Scalar(atr / close))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new_1m("TEST", ts, close, high, low, close, 1.0)
    }

    #[test]
    fn test_chop_ratio() {
        let mut chop = Chop::new(2).unwrap();
        chop.update(&bar(0, 102.0, 100.0, 100.0)); // TR 2.0
        chop.update(&bar(60, 102.0, 100.0, 100.0)); // TR 2.0
        // ATR = 2.0, close = 100 -> 0.02
        let value = chop.value().unwrap().as_scalar().unwrap();
        assert!((value - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_chop_warmup_follows_atr() {
        let mut chop = Chop::new(3).unwrap();
        chop.update(&bar(0, 102.0, 100.0, 101.0));
        chop.update(&bar(60, 102.0, 100.0, 101.0));
        assert!(chop.value().is_none());
        chop.update(&bar(120, 102.0, 100.0, 101.0));
        assert!(chop.value().is_some());
    }
}
