//! Config-driven strategies: a condition tree over indicator names.
//!
//! A [`DeclarativeConfig`] deserializes from JSON (or is built in code) and
//! turns into a [`DeclarativeStrategy`]: the `entry.long` / `entry.short`
//! condition lists are AND-ed each bar, and a matching side emits a market
//! order carrying the configured exit percentages.
//!
//! ```
//! use barsim::strategy::DeclarativeConfig;
//!
//! let config = DeclarativeConfig::from_json(r#"{
//!     "indicators": {
//!         "fast": {"kind": "sma", "period": 10},
//!         "slow": {"kind": "sma", "period": 30}
//!     },
//!     "entry": {
//!         "long": [{"kind": "crossover", "fast": "fast", "slow": "slow"}]
//!     },
//!     "exit": {"sl_pct": 0.02, "tp_pct": 0.04}
//! }"#).unwrap();
//! let strategy = config.into_strategy();
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{BacktestError, Result};
use crate::indicators::IndicatorSpec;
use crate::models::Bar;
use crate::orders::{ExitRules, MarketOrder, Order, Side};
use crate::position::Position;

use super::{IndicatorSnapshot, Strategy, snapshot_value};

/// A condition operand: a numeric literal, an indicator name (dotted paths
/// reach record fields, e.g. `"macd.signal"`), or one of the pseudo-names
/// `bar.close` / `bar.open` / `bar.high` / `bar.low`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// Numeric literal
    Value(f64),
    /// Indicator name or `bar.*` pseudo-name
    Name(String),
}

impl Operand {
    fn resolve(&self, snapshot: &IndicatorSnapshot, bar: &Bar) -> Option<f64> {
        match self {
            Operand::Value(v) => Some(*v),
            Operand::Name(name) => match name.as_str() {
                "bar.close" => Some(bar.close),
                "bar.open" => Some(bar.open),
                "bar.high" => Some(bar.high),
                "bar.low" => Some(bar.low),
                other => snapshot_value(snapshot, other),
            },
        }
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Value(v)
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Name(s.to_string())
    }
}

/// One entry condition. Conditions in a list are AND-ed.
///
/// Crossing semantics: indicator-vs-indicator crossings are strict on both
/// sides (`prev_fast < prev_slow && fast > slow`), threshold crossings are
/// inclusive on the prior side (`prev <= threshold && now > threshold`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionSpec {
    /// `fast` crossed above `slow` this bar
    Crossover {
        /// Faster operand
        fast: Operand,
        /// Slower operand
        slow: Operand,
    },
    /// `fast` crossed below `slow` this bar
    Crossunder {
        /// Faster operand
        fast: Operand,
        /// Slower operand
        slow: Operand,
    },
    /// `left > right`
    Above {
        /// Left operand
        left: Operand,
        /// Right operand
        right: Operand,
    },
    /// `left < right`
    Below {
        /// Left operand
        left: Operand,
        /// Right operand
        right: Operand,
    },
    /// `indicator > threshold`
    AboveThreshold {
        /// Indicator operand
        indicator: Operand,
        /// Threshold literal
        threshold: f64,
    },
    /// `indicator < threshold`
    BelowThreshold {
        /// Indicator operand
        indicator: Operand,
        /// Threshold literal
        threshold: f64,
    },
    /// Indicator crossed above the threshold this bar
    CrossesAbove {
        /// Indicator operand
        indicator: Operand,
        /// Threshold literal
        threshold: f64,
    },
    /// Indicator crossed below the threshold this bar
    CrossesBelow {
        /// Indicator operand
        indicator: Operand,
        /// Threshold literal
        threshold: f64,
    },
}

/// Snapshot of the previous bar's view, needed by crossing conditions.
#[derive(Debug, Clone)]
struct PrevView {
    snapshot: IndicatorSnapshot,
    bar: Bar,
}

impl ConditionSpec {
    fn evaluate(
        &self,
        snapshot: &IndicatorSnapshot,
        bar: &Bar,
        prev: Option<&PrevView>,
    ) -> bool {
        let resolve_prev = |operand: &Operand| -> Option<f64> {
            let p = prev?;
            operand.resolve(&p.snapshot, &p.bar)
        };

        match self {
            ConditionSpec::Crossover { fast, slow } => {
                match (
                    fast.resolve(snapshot, bar),
                    slow.resolve(snapshot, bar),
                    resolve_prev(fast),
                    resolve_prev(slow),
                ) {
                    (Some(f), Some(s), Some(fp), Some(sp)) => fp < sp && f > s,
                    _ => false,
                }
            }
            ConditionSpec::Crossunder { fast, slow } => {
                match (
                    fast.resolve(snapshot, bar),
                    slow.resolve(snapshot, bar),
                    resolve_prev(fast),
                    resolve_prev(slow),
                ) {
                    (Some(f), Some(s), Some(fp), Some(sp)) => fp > sp && f < s,
                    _ => false,
                }
            }
            ConditionSpec::Above { left, right } => {
                match (left.resolve(snapshot, bar), right.resolve(snapshot, bar)) {
                    (Some(l), Some(r)) => l > r,
                    _ => false,
                }
            }
            ConditionSpec::Below { left, right } => {
                match (left.resolve(snapshot, bar), right.resolve(snapshot, bar)) {
                    (Some(l), Some(r)) => l < r,
                    _ => false,
                }
            }
            ConditionSpec::AboveThreshold { indicator, threshold } => indicator
                .resolve(snapshot, bar)
                .map(|v| v > *threshold)
                .unwrap_or(false),
            ConditionSpec::BelowThreshold { indicator, threshold } => indicator
                .resolve(snapshot, bar)
                .map(|v| v < *threshold)
                .unwrap_or(false),
            ConditionSpec::CrossesAbove { indicator, threshold } => {
                match (indicator.resolve(snapshot, bar), resolve_prev(indicator)) {
                    (Some(now), Some(p)) => p <= *threshold && now > *threshold,
                    _ => false,
                }
            }
            ConditionSpec::CrossesBelow { indicator, threshold } => {
                match (indicator.resolve(snapshot, bar), resolve_prev(indicator)) {
                    (Some(now), Some(p)) => p >= *threshold && now < *threshold,
                    _ => false,
                }
            }
        }
    }
}

/// Entry condition lists per side; each list is AND-ed, an empty list never
/// fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryRules {
    /// Conditions opening a long position
    #[serde(default)]
    pub long: Vec<ConditionSpec>,
    /// Conditions opening a short position
    #[serde(default)]
    pub short: Vec<ConditionSpec>,
}

/// Declarative strategy configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeConfig {
    /// Indicators the conditions reference, forwarded to the engine's
    /// indicator manager
    #[serde(default)]
    pub indicators: BTreeMap<String, IndicatorSpec>,
    /// Entry conditions per side
    #[serde(default)]
    pub entry: EntryRules,
    /// Exit percentages stamped on every emitted order
    #[serde(default)]
    pub exit: ExitRules,
}

impl DeclarativeConfig {
    /// Deserialize a strategy configuration from JSON.
    ///
    /// An indicator entry naming a kind the library does not provide fails
    /// with [`BacktestError::UnknownIndicator`] instead of an opaque
    /// deserialization error.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| BacktestError::invalid_param("strategy config", e.to_string()))?;
        if let Some(indicators) = value.get("indicators").and_then(|v| v.as_object()) {
            crate::config::check_indicator_kinds(indicators)?;
        }
        serde_json::from_value(value)
            .map_err(|e| BacktestError::invalid_param("strategy config", e.to_string()))
    }

    /// Turn this configuration into a runnable strategy.
    pub fn into_strategy(self) -> DeclarativeStrategy {
        DeclarativeStrategy::new(self)
    }
}

/// Strategy interpreting a [`DeclarativeConfig`] condition tree.
#[derive(Debug, Clone)]
pub struct DeclarativeStrategy {
    config: DeclarativeConfig,
    prev: Option<PrevView>,
}

impl DeclarativeStrategy {
    /// New strategy over `config`.
    pub fn new(config: DeclarativeConfig) -> Self {
        Self { config, prev: None }
    }

    fn entry_fires(&self, conditions: &[ConditionSpec], snapshot: &IndicatorSnapshot, bar: &Bar) -> bool {
        !conditions.is_empty()
            && conditions
                .iter()
                .all(|c| c.evaluate(snapshot, bar, self.prev.as_ref()))
    }
}

impl Strategy for DeclarativeStrategy {
    fn configure(&mut self, _config: &EngineConfig) -> Result<()> {
        self.config.exit.validate()
    }

    fn required_indicators(&self) -> BTreeMap<String, IndicatorSpec> {
        self.config.indicators.clone()
    }

    fn on_bar(
        &mut self,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
        positions: &[Position],
    ) -> Result<Vec<Order>> {
        let mut orders = Vec::new();

        // Entries are evaluated only when flat; pyramiding is the job of
        // explicit strategies, not the condition tree.
        if positions.is_empty() {
            if self.entry_fires(&self.config.entry.long, indicators, bar) {
                orders.push(Order::Market(
                    MarketOrder::new(Side::Long).with_exits(self.config.exit.clone()),
                ));
            } else if self.entry_fires(&self.config.entry.short, indicators, bar) {
                orders.push(Order::Market(
                    MarketOrder::new(Side::Short).with_exits(self.config.exit.clone()),
                ));
            }
        }

        self.prev = Some(PrevView {
            snapshot: indicators.clone(),
            bar: bar.clone(),
        });
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorValue;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new_1m("BTC/USD", ts, close, close, close, close, 1.0)
    }

    fn snapshot(pairs: &[(&str, f64)]) -> IndicatorSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(IndicatorValue::Scalar(*v))))
            .collect()
    }

    fn run_two_bars(
        strategy: &mut DeclarativeStrategy,
        first: &[(&str, f64)],
        second: &[(&str, f64)],
    ) -> Vec<Order> {
        strategy
            .on_bar(&bar(0, 100.0), &snapshot(first), &[])
            .unwrap();
        strategy
            .on_bar(&bar(60, 100.0), &snapshot(second), &[])
            .unwrap()
    }

    #[test]
    fn test_crossover_requires_prior_bar() {
        let config = DeclarativeConfig {
            entry: EntryRules {
                long: vec![ConditionSpec::Crossover {
                    fast: "fast".into(),
                    slow: "slow".into(),
                }],
                short: vec![],
            },
            ..Default::default()
        };
        let mut strategy = config.clone().into_strategy();

        // No previous snapshot: no signal even though fast > slow
        let orders = strategy
            .on_bar(&bar(0, 100.0), &snapshot(&[("fast", 11.0), ("slow", 10.0)]), &[])
            .unwrap();
        assert!(orders.is_empty());

        // Genuine cross fires
        let mut strategy = config.into_strategy();
        let orders = run_two_bars(
            &mut strategy,
            &[("fast", 9.0), ("slow", 10.0)],
            &[("fast", 11.0), ("slow", 10.0)],
        );
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side(), Some(Side::Long));
    }

    #[test]
    fn test_crossover_is_strict() {
        // Previous bar exactly equal: no cross (strict inequality)
        let config = DeclarativeConfig {
            entry: EntryRules {
                long: vec![ConditionSpec::Crossover {
                    fast: "fast".into(),
                    slow: "slow".into(),
                }],
                short: vec![],
            },
            ..Default::default()
        };
        let mut strategy = config.into_strategy();
        let orders = run_two_bars(
            &mut strategy,
            &[("fast", 10.0), ("slow", 10.0)],
            &[("fast", 11.0), ("slow", 10.0)],
        );
        assert!(orders.is_empty());
    }

    #[test]
    fn test_threshold_cross_is_inclusive_on_prior_side() {
        let config = DeclarativeConfig {
            entry: EntryRules {
                long: vec![ConditionSpec::CrossesAbove {
                    indicator: "rsi".into(),
                    threshold: 30.0,
                }],
                short: vec![],
            },
            ..Default::default()
        };
        let mut strategy = config.into_strategy();
        // prev == threshold still counts as a cross
        let orders = run_two_bars(&mut strategy, &[("rsi", 30.0)], &[("rsi", 31.0)]);
        assert_eq!(orders.len(), 1);
    }

    #[test]
    fn test_conditions_are_anded() {
        let config = DeclarativeConfig {
            entry: EntryRules {
                long: vec![
                    ConditionSpec::AboveThreshold {
                        indicator: "rsi".into(),
                        threshold: 50.0,
                    },
                    ConditionSpec::Above {
                        left: "bar.close".into(),
                        right: "sma".into(),
                    },
                ],
                short: vec![],
            },
            ..Default::default()
        };
        let mut strategy = config.into_strategy();

        // First condition true, second false: no order
        let orders = strategy
            .on_bar(&bar(0, 90.0), &snapshot(&[("rsi", 60.0), ("sma", 100.0)]), &[])
            .unwrap();
        assert!(orders.is_empty());

        // Both true
        let orders = strategy
            .on_bar(&bar(60, 110.0), &snapshot(&[("rsi", 60.0), ("sma", 100.0)]), &[])
            .unwrap();
        assert_eq!(orders.len(), 1);
    }

    #[test]
    fn test_no_entries_while_position_open() {
        let config = DeclarativeConfig {
            entry: EntryRules {
                long: vec![ConditionSpec::AboveThreshold {
                    indicator: "rsi".into(),
                    threshold: 0.0,
                }],
                short: vec![],
            },
            ..Default::default()
        };
        let mut strategy = config.into_strategy();
        let position = Position::open(
            Side::Long,
            100.0,
            0,
            1_000.0,
            "BTC/USD",
            None,
            &ExitRules::default(),
            0.0,
        );
        let orders = strategy
            .on_bar(&bar(0, 100.0), &snapshot(&[("rsi", 50.0)]), &[position])
            .unwrap();
        assert!(orders.is_empty());
    }

    #[test]
    fn test_exit_rules_stamped_on_orders() {
        let config = DeclarativeConfig {
            entry: EntryRules {
                long: vec![ConditionSpec::AboveThreshold {
                    indicator: "rsi".into(),
                    threshold: 0.0,
                }],
                short: vec![],
            },
            exit: ExitRules {
                sl_pct: Some(0.02),
                tp_pct: Some(0.04),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut strategy = config.into_strategy();
        let orders = strategy
            .on_bar(&bar(0, 100.0), &snapshot(&[("rsi", 50.0)]), &[])
            .unwrap();
        match &orders[0] {
            Order::Market(m) => {
                assert_eq!(m.exits.sl_pct, Some(0.02));
                assert_eq!(m.exits.tp_pct, Some(0.04));
            }
            other => panic!("expected market order, got {other:?}"),
        }
    }

    #[test]
    fn test_configure_rejects_contradictory_exits() {
        let config = DeclarativeConfig {
            exit: ExitRules {
                be_trigger_pct: Some(0.01),
                be_lock_pct: Some(0.05),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut strategy = config.into_strategy();
        assert!(strategy.configure(&EngineConfig::default()).is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let json = r#"{
            "indicators": {"rsi": {"kind": "rsi", "period": 14}},
            "entry": {"long": [{"kind": "crosses_below", "indicator": "rsi", "threshold": 30.0}]},
            "exit": {"sl_pct": 0.03}
        }"#;
        let config = DeclarativeConfig::from_json(json).unwrap();
        assert_eq!(config.entry.long.len(), 1);
        assert_eq!(config.exit.sl_pct, Some(0.03));
        assert!(config.indicators.contains_key("rsi"));
    }

    #[test]
    fn test_from_json_reports_unknown_indicator_kind() {
        let err = DeclarativeConfig::from_json(
            r#"{"indicators": {"trend": {"kind": "supertrend", "period": 10}}}"#,
        )
        .unwrap_err();
        match err {
            BacktestError::UnknownIndicator(msg) => assert!(msg.contains("supertrend")),
            other => panic!("expected UnknownIndicator, got {other}"),
        }
    }
}
