//! Pre-built reference strategies.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::indicators::{IndicatorSpec, PriceSource};
use crate::models::{Bar, Timeframe};
use crate::orders::{ExitRules, MarketOrder, Order, Side};
use crate::position::Position;

use super::{IndicatorSnapshot, Strategy, snapshot_value};

/// SMA crossover: long when the fast average crosses above the slow one,
/// flat (via opposite signal or configured exits) when it crosses below.
#[derive(Debug, Clone)]
pub struct SmaCross {
    fast_period: usize,
    slow_period: usize,
    exits: ExitRules,
    prev_fast: Option<f64>,
    prev_slow: Option<f64>,
}

impl SmaCross {
    /// New crossover strategy over `fast`/`slow` 1-minute SMAs.
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            exits: ExitRules::default(),
            prev_fast: None,
            prev_slow: None,
        }
    }

    /// Attach exit rules to every emitted order.
    pub fn with_exits(mut self, exits: ExitRules) -> Self {
        self.exits = exits;
        self
    }

    fn fast_name(&self) -> String {
        format!("sma_{}", self.fast_period)
    }

    fn slow_name(&self) -> String {
        format!("sma_{}", self.slow_period)
    }
}

impl Strategy for SmaCross {
    fn required_indicators(&self) -> BTreeMap<String, IndicatorSpec> {
        let mut specs = BTreeMap::new();
        specs.insert(
            self.fast_name(),
            IndicatorSpec::Sma {
                period: self.fast_period,
                source: PriceSource::Close,
                timeframe: Timeframe::M1,
            },
        );
        specs.insert(
            self.slow_name(),
            IndicatorSpec::Sma {
                period: self.slow_period,
                source: PriceSource::Close,
                timeframe: Timeframe::M1,
            },
        );
        specs
    }

    fn on_bar(
        &mut self,
        _bar: &Bar,
        indicators: &IndicatorSnapshot,
        positions: &[Position],
    ) -> Result<Vec<Order>> {
        let fast = snapshot_value(indicators, &self.fast_name());
        let slow = snapshot_value(indicators, &self.slow_name());
        let prev_fast = self.prev_fast;
        let prev_slow = self.prev_slow;
        self.prev_fast = fast;
        self.prev_slow = slow;

        let (Some(f), Some(s), Some(fp), Some(sp)) = (fast, slow, prev_fast, prev_slow) else {
            return Ok(vec![]);
        };

        let mut orders = Vec::new();
        if fp < sp && f > s && positions.is_empty() {
            orders.push(Order::Market(
                MarketOrder::new(Side::Long).with_exits(self.exits.clone()),
            ));
        } else if fp > sp && f < s && positions.iter().any(|p| p.is_long()) {
            orders.push(Order::Market(
                MarketOrder::new(Side::Short).with_exits(self.exits.clone()),
            ));
        }
        Ok(orders)
    }
}

/// RSI reversal: long when RSI crosses up out of the oversold zone, with
/// exits handled by the order's SL/TP percentages.
#[derive(Debug, Clone)]
pub struct RsiReversal {
    period: usize,
    oversold: f64,
    exits: ExitRules,
    prev_rsi: Option<f64>,
}

impl RsiReversal {
    /// New reversal strategy with a 1-minute RSI of `period`, entering when
    /// RSI crosses above `oversold`.
    pub fn new(period: usize, oversold: f64) -> Self {
        Self {
            period,
            oversold,
            exits: ExitRules {
                sl_pct: Some(0.02),
                tp_pct: Some(0.04),
                ..Default::default()
            },
            prev_rsi: None,
        }
    }

    /// Replace the default exit rules.
    pub fn with_exits(mut self, exits: ExitRules) -> Self {
        self.exits = exits;
        self
    }

    fn rsi_name(&self) -> String {
        format!("rsi_{}", self.period)
    }
}

impl Strategy for RsiReversal {
    fn required_indicators(&self) -> BTreeMap<String, IndicatorSpec> {
        let mut specs = BTreeMap::new();
        specs.insert(
            self.rsi_name(),
            IndicatorSpec::Rsi {
                period: self.period,
                smoothing: Default::default(),
                source: PriceSource::Close,
                timeframe: Timeframe::M1,
            },
        );
        specs
    }

    fn on_bar(
        &mut self,
        _bar: &Bar,
        indicators: &IndicatorSnapshot,
        positions: &[Position],
    ) -> Result<Vec<Order>> {
        let rsi = snapshot_value(indicators, &self.rsi_name());
        let prev = self.prev_rsi;
        self.prev_rsi = rsi;

        let (Some(now), Some(p)) = (rsi, prev) else {
            return Ok(vec![]);
        };

        if p <= self.oversold && now > self.oversold && positions.is_empty() {
            return Ok(vec![Order::Market(
                MarketOrder::new(Side::Long).with_exits(self.exits.clone()),
            )]);
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorValue;

    fn bar(ts: i64) -> Bar {
        Bar::new_1m("BTC/USD", ts, 100.0, 100.0, 100.0, 100.0, 1.0)
    }

    fn snapshot(pairs: &[(&str, f64)]) -> IndicatorSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(IndicatorValue::Scalar(*v))))
            .collect()
    }

    #[test]
    fn test_sma_cross_requires_indicators() {
        let strategy = SmaCross::new(10, 30);
        let specs = strategy.required_indicators();
        assert!(specs.contains_key("sma_10"));
        assert!(specs.contains_key("sma_30"));
    }

    #[test]
    fn test_sma_cross_fires_on_golden_cross() {
        let mut strategy = SmaCross::new(10, 30);
        let orders = strategy
            .on_bar(&bar(0), &snapshot(&[("sma_10", 9.0), ("sma_30", 10.0)]), &[])
            .unwrap();
        assert!(orders.is_empty());

        let orders = strategy
            .on_bar(&bar(60), &snapshot(&[("sma_10", 11.0), ("sma_30", 10.0)]), &[])
            .unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side(), Some(Side::Long));
    }

    #[test]
    fn test_rsi_reversal_fires_leaving_oversold() {
        let mut strategy = RsiReversal::new(14, 30.0);
        strategy
            .on_bar(&bar(0), &snapshot(&[("rsi_14", 25.0)]), &[])
            .unwrap();
        let orders = strategy
            .on_bar(&bar(60), &snapshot(&[("rsi_14", 35.0)]), &[])
            .unwrap();
        assert_eq!(orders.len(), 1);
    }

    #[test]
    fn test_rsi_reversal_quiet_inside_zone() {
        let mut strategy = RsiReversal::new(14, 30.0);
        strategy
            .on_bar(&bar(0), &snapshot(&[("rsi_14", 25.0)]), &[])
            .unwrap();
        let orders = strategy
            .on_bar(&bar(60), &snapshot(&[("rsi_14", 28.0)]), &[])
            .unwrap();
        assert!(orders.is_empty());
    }
}
