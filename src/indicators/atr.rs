//! Average True Range (ATR) indicator.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::models::Bar;

use super::{Indicator, IndicatorError, IndicatorValue, Result};

/// How the true-range series is smoothed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtrSmoothing {
    /// Wilder's smoothing (seeded with an SMA of the first `period` true ranges)
    #[default]
    Wilder,
    /// Rolling arithmetic mean of the last `period` true ranges
    Sma,
}

/// Average True Range.
///
/// True range per bar is
/// `max(high − low, |high − prev close|, |low − prev close|)`; the first
/// bar's true range is simply `high − low`.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    smoothing: AtrSmoothing,
    prev_close: Option<f64>,
    // Wilder state
    current: Option<f64>,
    seed_sum: f64,
    seen: usize,
    // SMA state
    window: VecDeque<f64>,
}

impl Atr {
    /// Create a new ATR over `period` bars.
    pub fn new(period: usize, smoothing: AtrSmoothing) -> Result<Self> {
        if period == 0 {
            return Err(IndicatorError::InvalidPeriod(
                "Period must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            period,
            smoothing,
            prev_close: None,
            current: None,
            seed_sum: 0.0,
            seen: 0,
            window: VecDeque::new(),
        })
    }

    fn true_range(&self, bar: &Bar) -> f64 {
        let h_l = bar.high - bar.low;
        match self.prev_close {
            Some(pc) => h_l.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
            None => h_l,
        }
    }
}

impl Indicator for Atr {
    fn update(&mut self, bar: &Bar) {
        let tr = self.true_range(bar);
        self.prev_close = Some(bar.close);

        match self.smoothing {
            AtrSmoothing::Wilder => {
                self.seen += 1;
                match self.current {
                    Some(prev) => {
                        let p = self.period as f64;
                        self.current = Some((prev * (p - 1.0) + tr) / p);
                    }
                    None => {
                        self.seed_sum += tr;
                        if self.seen == self.period {
                            self.current = Some(self.seed_sum / self.period as f64);
                        }
                    }
                }
            }
            AtrSmoothing::Sma => {
                self.window.push_back(tr);
                if self.window.len() > self.period {
                    self.window.pop_front();
                }
            }
        }
    }

    fn value(&self) -> Option<IndicatorValue> {
        match self.smoothing {
            AtrSmoothing::Wilder => self.current.map(IndicatorValue::Scalar),
            AtrSmoothing::Sma => {
                if self.window.len() == self.period {
                    Some(IndicatorValue::Scalar(
                        self.window.iter().sum::<f64>() / self.period as f64,
                    ))
                } else {
                    None
                }
            }
        }
    }
}
