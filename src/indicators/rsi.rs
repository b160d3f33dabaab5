//! Relative Strength Index (RSI) indicator.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::models::Bar;

use super::{Indicator, IndicatorError, IndicatorValue, PriceSource, Result};

/// How the average gain/loss series is smoothed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiSmoothing {
    /// Wilder's smoothing: `avg = (avg * (period - 1) + change) / period`
    #[default]
    Wilder,
    /// Rolling arithmetic average over the last `period` changes
    Simple,
}

/// Relative Strength Index.
///
/// Measures the magnitude of recent price changes on a 0–100 scale.
///
/// # Formula
///
/// 1. Split per-bar changes into gains and losses (absolute value)
/// 2. Average both series over `period` (Wilder or simple)
/// 3. `RS = avg gain / avg loss`; `RSI = 100 − 100 / (1 + RS)`
///
/// When the average loss is zero the RSI saturates at 100.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    smoothing: RsiSmoothing,
    source: PriceSource,
    prev_value: Option<f64>,
    // Wilder state
    avg_gain: f64,
    avg_loss: f64,
    seeded: bool,
    seed_gains: f64,
    seed_losses: f64,
    changes_seen: usize,
    // Simple state
    gains: VecDeque<f64>,
    losses: VecDeque<f64>,
}

impl Rsi {
    /// Create a new RSI over `period` changes.
    pub fn new(period: usize, smoothing: RsiSmoothing) -> Result<Self> {
        if period == 0 {
            return Err(IndicatorError::InvalidPeriod(
                "Period must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            period,
            smoothing,
            source: PriceSource::Close,
            prev_value: None,
            avg_gain: 0.0,
            avg_loss: 0.0,
            seeded: false,
            seed_gains: 0.0,
            seed_losses: 0.0,
            changes_seen: 0,
            gains: VecDeque::new(),
            losses: VecDeque::new(),
        })
    }

    /// Select the bar field to read
    pub fn with_source(mut self, source: PriceSource) -> Self {
        self.source = source;
        self
    }

    fn ready(&self) -> bool {
        match self.smoothing {
            RsiSmoothing::Wilder => self.seeded,
            RsiSmoothing::Simple => self.gains.len() == self.period,
        }
    }
}

impl Indicator for Rsi {
    fn update(&mut self, bar: &Bar) {
        let value = self.source.apply(bar);
        let Some(prev) = self.prev_value.replace(value) else {
            return;
        };

        let change = value - prev;
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, change.abs())
        };

        match self.smoothing {
            RsiSmoothing::Wilder => {
                self.changes_seen += 1;
                if self.seeded {
                    let p = self.period as f64;
                    self.avg_gain = (self.avg_gain * (p - 1.0) + gain) / p;
                    self.avg_loss = (self.avg_loss * (p - 1.0) + loss) / p;
                } else {
                    self.seed_gains += gain;
                    self.seed_losses += loss;
                    if self.changes_seen == self.period {
                        self.avg_gain = self.seed_gains / self.period as f64;
                        self.avg_loss = self.seed_losses / self.period as f64;
                        self.seeded = true;
                    }
                }
            }
            RsiSmoothing::Simple => {
                self.gains.push_back(gain);
                self.losses.push_back(loss);
                if self.gains.len() > self.period {
                    self.gains.pop_front();
                    self.losses.pop_front();
                }
            }
        }
    }

    fn value(&self) -> Option<IndicatorValue> {
        if !self.ready() {
            return None;
        }
        let (avg_gain, avg_loss) = match self.smoothing {
            RsiSmoothing::Wilder => (self.avg_gain, self.avg_loss),
            RsiSmoothing::Simple => {
                let n = self.period as f64;
                (
                    self.gains.iter().sum::<f64>() / n,
                    self.losses.iter().sum::<f64>() / n,
                )
            }
        };
        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
        Some(IndicatorValue::Scalar(rsi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bar(ts: i64, price: f64) -> Bar {
        Bar::new_1m("TEST", ts, price, price, price, price, 1.0)
    }

    fn feed(rsi: &mut Rsi, prices: &[f64]) {
        for (i, p) in prices.iter().enumerate() {
            rsi.update(&flat_bar(i as i64 * 60, *p));
        }
    }

    #[test]
    fn test_rsi_warmup_needs_period_plus_one_bars() {
        let mut rsi = Rsi::new(3, RsiSmoothing::Wilder).unwrap();
        feed(&mut rsi, &[1.0, 2.0, 3.0]);
        assert!(rsi.value().is_none());
        rsi.update(&flat_bar(180, 4.0));
        assert!(rsi.value().is_some());
    }

    #[test]
    fn test_rsi_all_gains_saturates_at_100() {
        let mut rsi = Rsi::new(3, RsiSmoothing::Wilder).unwrap();
        feed(&mut rsi, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(rsi.value().unwrap().as_scalar(), Some(100.0));
    }

    #[test]
    fn test_rsi_all_losses_is_zero() {
        let mut rsi = Rsi::new(3, RsiSmoothing::Wilder).unwrap();
        feed(&mut rsi, &[5.0, 4.0, 3.0, 2.0, 1.0]);
        assert_eq!(rsi.value().unwrap().as_scalar(), Some(0.0));
    }

    #[test]
    fn test_rsi_balanced_is_50() {
        // Alternating +1 / -1 changes: avg gain == avg loss
        let mut rsi = Rsi::new(2, RsiSmoothing::Simple).unwrap();
        feed(&mut rsi, &[10.0, 11.0, 10.0]);
        let value = rsi.value().unwrap().as_scalar().unwrap();
        assert!((value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_stays_in_range() {
        let prices = [44.0, 44.34, 44.09, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84];
        let mut rsi = Rsi::new(5, RsiSmoothing::Wilder).unwrap();
        feed(&mut rsi, &prices);
        let value = rsi.value().unwrap().as_scalar().unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_rsi_zero_period_rejected() {
        assert!(Rsi::new(0, RsiSmoothing::Wilder).is_err());
    }
}
