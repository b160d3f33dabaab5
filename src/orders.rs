//! Order types emitted by strategies and the engine's pending-order queues.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Long position (profit when price rises)
    Long,
    /// Short position (profit when price falls)
    Short,
}

impl Side {
    /// The opposite direction
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a position (or part of one) was closed.
///
/// `*Gap` variants mean the bar opened already beyond the trigger level and
/// the fill used the open price instead of the level itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// Intra-bar stop-loss at the stop level
    StopLoss,
    /// Bar opened through the stop; filled at open
    StopLossGap,
    /// Intra-bar take-profit at the target level
    TakeProfit,
    /// Bar opened through the target; filled at open
    TakeProfitGap,
    /// Breakeven stop (stop raised to a small-profit level) hit intra-bar
    Breakeven,
    /// Bar opened through the breakeven stop
    BreakevenGap,
    /// Trailing stop hit intra-bar
    TrailingStop,
    /// Bar opened through the trailing stop
    TrailingStopGap,
    /// Partial take-profit (fraction of the position closed)
    PartialTp,
    /// Strategy-requested exit via `check_exits`
    Signal,
}

impl ExitReason {
    /// True for the open-gap variants
    pub fn is_gap(&self) -> bool {
        matches!(
            self,
            ExitReason::StopLossGap
                | ExitReason::TakeProfitGap
                | ExitReason::BreakevenGap
                | ExitReason::TrailingStopGap
        )
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::StopLossGap => "STOP_LOSS_GAP",
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::TakeProfitGap => "TAKE_PROFIT_GAP",
            ExitReason::Breakeven => "BREAKEVEN",
            ExitReason::BreakevenGap => "BREAKEVEN_GAP",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::TrailingStopGap => "TRAILING_STOP_GAP",
            ExitReason::PartialTp => "PARTIAL_TP",
            ExitReason::Signal => "SIGNAL",
        };
        write!(f, "{s}")
    }
}

/// Exit-management rules attached to an entry order.
///
/// All fields are optional and independent; percentages are fractions of the
/// fill price (e.g. `0.03` for 3%).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitRules {
    /// Take-profit distance from entry
    #[serde(default)]
    pub tp_pct: Option<f64>,
    /// Stop-loss distance from entry
    #[serde(default)]
    pub sl_pct: Option<f64>,
    /// Favorable excursion that arms the breakeven stop
    #[serde(default)]
    pub be_trigger_pct: Option<f64>,
    /// Profit locked in once breakeven is armed (must stay below the trigger)
    #[serde(default)]
    pub be_lock_pct: Option<f64>,
    /// Trailing-stop distance from the favorable extreme
    #[serde(default)]
    pub trail_pct: Option<f64>,
    /// Favorable excursion that activates the trail (0 / absent = immediately)
    #[serde(default)]
    pub trail_activation_pct: Option<f64>,
    /// Fraction of the position closed at the first take-profit touch, in (0, 1)
    #[serde(default)]
    pub partial_tp_pct: Option<f64>,
    /// New take-profit distance applied to the remainder after the partial
    #[serde(default)]
    pub partial_tp_new_tp_pct: Option<f64>,
}

impl ExitRules {
    /// Fail fast on contradictory or out-of-range percentages.
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("tp_pct", self.tp_pct),
            ("sl_pct", self.sl_pct),
            ("be_trigger_pct", self.be_trigger_pct),
            ("be_lock_pct", self.be_lock_pct),
            ("trail_pct", self.trail_pct),
            ("trail_activation_pct", self.trail_activation_pct),
            ("partial_tp_new_tp_pct", self.partial_tp_new_tp_pct),
        ];
        for (name, v) in non_negative {
            if let Some(v) = v
                && !(v >= 0.0 && v.is_finite())
            {
                return Err(BacktestError::invalid_param(name, "must be a finite, non-negative fraction"));
            }
        }
        if let Some(p) = self.partial_tp_pct
            && !(p > 0.0 && p < 1.0)
        {
            return Err(BacktestError::invalid_param(
                "partial_tp_pct",
                "must be a fraction in (0, 1)",
            ));
        }
        if let (Some(lock), Some(trigger)) = (self.be_lock_pct, self.be_trigger_pct)
            && lock >= trigger
        {
            return Err(BacktestError::invalid_param(
                "be_lock_pct",
                "must be strictly below be_trigger_pct",
            ));
        }
        Ok(())
    }
}

/// A market order: fills at the next bar's open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    /// Direction to trade
    pub side: Side,
    /// Explicit size in quote units; `None` uses the configured default / sizer
    pub size_usd: Option<f64>,
    /// Target symbol; `None` means the engine's own symbol
    pub symbol: Option<String>,
    /// Position group label (caps positions per group)
    pub group: Option<String>,
    /// Exit management for the resulting position
    pub exits: ExitRules,
    /// Clear the pending limit queue when this order is queued
    pub cancel_pending_limits: bool,
}

impl MarketOrder {
    /// New market order with defaults
    pub fn new(side: Side) -> Self {
        Self {
            side,
            size_usd: None,
            symbol: None,
            group: None,
            exits: ExitRules::default(),
            cancel_pending_limits: false,
        }
    }

    /// Set an explicit size in quote units
    pub fn with_size(mut self, size_usd: f64) -> Self {
        self.size_usd = Some(size_usd);
        self
    }

    /// Set a position group label
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set take-profit distance
    pub fn with_tp_pct(mut self, pct: f64) -> Self {
        self.exits.tp_pct = Some(pct);
        self
    }

    /// Set stop-loss distance
    pub fn with_sl_pct(mut self, pct: f64) -> Self {
        self.exits.sl_pct = Some(pct);
        self
    }

    /// Replace the full exit-rule set
    pub fn with_exits(mut self, exits: ExitRules) -> Self {
        self.exits = exits;
        self
    }
}

/// A limit order: rests until price trades through its level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    /// Direction to trade
    pub side: Side,
    /// Explicit size in quote units
    pub size_usd: Option<f64>,
    /// Target symbol
    pub symbol: Option<String>,
    /// Position group label
    pub group: Option<String>,
    /// Exit management for the resulting position
    pub exits: ExitRules,
    /// Clear the pending limit queue when this order is queued
    pub cancel_pending_limits: bool,
    /// Resting price
    pub limit_price: f64,
    /// Cancel after this many untriggered bars (0 = never)
    pub timeout_bars: u32,
    /// Charge the maker fee on fill (limit fills rest on the book)
    pub use_maker_fee: bool,
    /// Only fill when at least this many positions are already open
    pub min_positions: usize,
    /// Merge into an existing same-symbol same-side position instead of
    /// opening a new one
    pub merge_position: bool,
}

impl LimitOrder {
    /// New limit order at `limit_price`
    pub fn new(side: Side, limit_price: f64) -> Self {
        Self {
            side,
            size_usd: None,
            symbol: None,
            group: None,
            exits: ExitRules::default(),
            cancel_pending_limits: false,
            limit_price,
            timeout_bars: 0,
            use_maker_fee: true,
            min_positions: 0,
            merge_position: false,
        }
    }

    /// Set an explicit size in quote units
    pub fn with_size(mut self, size_usd: f64) -> Self {
        self.size_usd = Some(size_usd);
        self
    }

    /// Cancel after `bars` untriggered bars
    pub fn with_timeout(mut self, bars: u32) -> Self {
        self.timeout_bars = bars;
        self
    }

    /// Gate the fill on a minimum number of open positions
    pub fn with_min_positions(mut self, n: usize) -> Self {
        self.min_positions = n;
        self
    }

    /// Merge into an existing position on fill
    pub fn merging(mut self) -> Self {
        self.merge_position = true;
        self
    }

    /// Replace the full exit-rule set
    pub fn with_exits(mut self, exits: ExitRules) -> Self {
        self.exits = exits;
        self
    }
}

/// A stop order: becomes a market order once price trades through its level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopOrder {
    /// Direction to trade
    pub side: Side,
    /// Explicit size in quote units
    pub size_usd: Option<f64>,
    /// Target symbol
    pub symbol: Option<String>,
    /// Position group label
    pub group: Option<String>,
    /// Exit management for the resulting position
    pub exits: ExitRules,
    /// Clear the pending limit queue when this order is queued
    pub cancel_pending_limits: bool,
    /// Trigger price
    pub stop_price: f64,
    /// Cancel after this many untriggered bars (0 = never)
    pub timeout_bars: u32,
}

impl StopOrder {
    /// New stop order at `stop_price`
    pub fn new(side: Side, stop_price: f64) -> Self {
        Self {
            side,
            size_usd: None,
            symbol: None,
            group: None,
            exits: ExitRules::default(),
            cancel_pending_limits: false,
            stop_price,
            timeout_bars: 0,
        }
    }

    /// Set an explicit size in quote units
    pub fn with_size(mut self, size_usd: f64) -> Self {
        self.size_usd = Some(size_usd);
        self
    }

    /// Cancel after `bars` untriggered bars
    pub fn with_timeout(mut self, bars: u32) -> Self {
        self.timeout_bars = bars;
        self
    }

    /// Replace the full exit-rule set
    pub fn with_exits(mut self, exits: ExitRules) -> Self {
        self.exits = exits;
        self
    }
}

/// A strategy-emitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Order {
    /// Fill at the next bar's open
    Market(MarketOrder),
    /// Rest until the limit price trades
    Limit(LimitOrder),
    /// Trigger into a market fill at the stop price
    Stop(StopOrder),
    /// Sentinel: clear the pending limit queue
    CancelPendingLimits,
}

impl Order {
    /// Shorthand for a plain market order
    pub fn market(side: Side) -> Order {
        Order::Market(MarketOrder::new(side))
    }

    /// Shorthand for a plain limit order
    pub fn limit(side: Side, limit_price: f64) -> Order {
        Order::Limit(LimitOrder::new(side, limit_price))
    }

    /// Shorthand for a plain stop order
    pub fn stop(side: Side, stop_price: f64) -> Order {
        Order::Stop(StopOrder::new(side, stop_price))
    }

    /// The order's direction, if it has one
    pub fn side(&self) -> Option<Side> {
        match self {
            Order::Market(o) => Some(o.side),
            Order::Limit(o) => Some(o.side),
            Order::Stop(o) => Some(o.side),
            Order::CancelPendingLimits => None,
        }
    }
}

/// A queued order plus the number of bars it has been resting.
#[derive(Debug, Clone)]
pub struct Pending<T> {
    /// The resting order
    pub order: T,
    /// Bars elapsed since the order was queued without triggering
    pub bars_elapsed: u32,
}

impl<T> Pending<T> {
    /// Wrap a freshly queued order
    pub fn new(order: T) -> Self {
        Self {
            order,
            bars_elapsed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn test_exit_reason_display() {
        assert_eq!(ExitReason::StopLossGap.to_string(), "STOP_LOSS_GAP");
        assert_eq!(ExitReason::PartialTp.to_string(), "PARTIAL_TP");
        assert!(ExitReason::TrailingStopGap.is_gap());
        assert!(!ExitReason::TrailingStop.is_gap());
    }

    #[test]
    fn test_exit_rules_validate_partial_range() {
        let mut rules = ExitRules::default();
        rules.partial_tp_pct = Some(0.5);
        assert!(rules.validate().is_ok());

        rules.partial_tp_pct = Some(1.0);
        assert!(rules.validate().is_err());

        rules.partial_tp_pct = Some(0.0);
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_exit_rules_validate_breakeven_contradiction() {
        let rules = ExitRules {
            be_trigger_pct: Some(0.01),
            be_lock_pct: Some(0.02),
            ..Default::default()
        };
        assert!(rules.validate().is_err());

        let rules = ExitRules {
            be_trigger_pct: Some(0.015),
            be_lock_pct: Some(0.005),
            ..Default::default()
        };
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_market_order_builder() {
        let order = MarketOrder::new(Side::Long)
            .with_size(5_000.0)
            .with_tp_pct(0.05)
            .with_sl_pct(0.03);
        assert_eq!(order.size_usd, Some(5_000.0));
        assert_eq!(order.exits.tp_pct, Some(0.05));
        assert_eq!(order.exits.sl_pct, Some(0.03));
    }

    #[test]
    fn test_limit_order_defaults() {
        let order = LimitOrder::new(Side::Short, 101.5);
        assert!(order.use_maker_fee);
        assert_eq!(order.timeout_bars, 0);
        assert_eq!(order.min_positions, 0);
        assert!(!order.merge_position);
    }

    #[test]
    fn test_order_side_accessor() {
        assert_eq!(Order::market(Side::Long).side(), Some(Side::Long));
        assert_eq!(Order::CancelPendingLimits.side(), None);
    }
}
