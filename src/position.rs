//! Position, fill, and trade types.

use serde::{Deserialize, Serialize};

use crate::orders::{ExitReason, ExitRules, Side};

/// Which rule currently owns a position's stop level.
///
/// Used to attribute the correct exit reason when the stop is hit: an
/// initial stop exits as `STOP_LOSS`, a breakeven-raised stop as
/// `BREAKEVEN`, a trailing stop as `TRAILING_STOP` (each with a `_GAP`
/// variant when the bar opens through the level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    /// The stop derived from the order's `sl_pct`
    Initial,
    /// The stop raised to the breakeven lock level
    Breakeven,
    /// The stop set by the trailing rule
    Trailing,
}

impl StopKind {
    /// Exit reason for an intra-bar stop hit
    pub fn reason(&self) -> ExitReason {
        match self {
            StopKind::Initial => ExitReason::StopLoss,
            StopKind::Breakeven => ExitReason::Breakeven,
            StopKind::Trailing => ExitReason::TrailingStop,
        }
    }

    /// Exit reason when the bar opened through the stop
    pub fn gap_reason(&self) -> ExitReason {
        match self {
            StopKind::Initial => ExitReason::StopLossGap,
            StopKind::Breakeven => ExitReason::BreakevenGap,
            StopKind::Trailing => ExitReason::TrailingStopGap,
        }
    }
}

/// An open position, owned by the portfolio and mutated in place during the
/// bar loop.
///
/// Invariant: for a long position `stop_loss <= entry_price <= take_profit`;
/// mirrored for shorts. Either level may be absent when the corresponding
/// rule is not configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Direction
    pub side: Side,
    /// Average entry price (slippage-adjusted; re-averaged on merge)
    pub entry_price: f64,
    /// Timestamp of the opening fill
    pub entry_timestamp: i64,
    /// Size in quote units
    pub size_usd: f64,
    /// Current stop level, if any
    pub stop_loss: Option<f64>,
    /// Current take-profit level, if any
    pub take_profit: Option<f64>,
    /// Which rule owns the current stop level
    pub stop_kind: StopKind,
    /// Ticker symbol
    pub symbol: String,
    /// Position group label
    pub group: Option<String>,
    /// Highest price seen since entry
    pub position_high: f64,
    /// Lowest price seen since entry
    pub position_low: f64,
    /// Favorable excursion that arms the breakeven stop
    pub be_trigger_pct: Option<f64>,
    /// Profit locked once breakeven is armed
    pub be_lock_pct: Option<f64>,
    /// Whether the breakeven stop has been armed (sticky)
    pub be_activated: bool,
    /// Trailing distance from the favorable extreme
    pub trail_pct: Option<f64>,
    /// Favorable excursion that activates the trail
    pub trail_activation_pct: Option<f64>,
    /// Whether the trail is active
    pub trail_activated: bool,
    /// Fraction closed at the first take-profit touch
    pub partial_tp_pct: Option<f64>,
    /// New take-profit distance applied after the partial
    pub partial_tp_new_tp_pct: Option<f64>,
    /// Whether the partial take-profit has already fired
    pub partial_tp_done: bool,
    /// Entry fee not yet attributed to a closed trade
    pub entry_fee_remaining: f64,
}

impl Position {
    /// Open a position at `fill_price`, deriving exit levels from the
    /// order's percentages relative to that price.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        side: Side,
        fill_price: f64,
        entry_timestamp: i64,
        size_usd: f64,
        symbol: impl Into<String>,
        group: Option<String>,
        rules: &ExitRules,
        entry_fee: f64,
    ) -> Self {
        let mut position = Self {
            side,
            entry_price: fill_price,
            entry_timestamp,
            size_usd,
            stop_loss: None,
            take_profit: None,
            stop_kind: StopKind::Initial,
            symbol: symbol.into(),
            group,
            position_high: fill_price,
            position_low: fill_price,
            be_trigger_pct: rules.be_trigger_pct,
            be_lock_pct: rules.be_lock_pct,
            be_activated: false,
            trail_pct: rules.trail_pct,
            trail_activation_pct: rules.trail_activation_pct,
            trail_activated: false,
            partial_tp_pct: rules.partial_tp_pct,
            partial_tp_new_tp_pct: rules.partial_tp_new_tp_pct,
            partial_tp_done: false,
            entry_fee_remaining: entry_fee,
        };
        position.derive_levels(rules);
        position
    }

    /// Re-derive SL/TP from the current entry price using `rules`.
    ///
    /// Called at open and again after a merge re-averages the entry. The
    /// breakeven/trailing/partial configuration is replaced wholesale;
    /// activation flags reset so the new levels arm from the new entry.
    pub fn derive_levels(&mut self, rules: &ExitRules) {
        let entry = self.entry_price;
        match self.side {
            Side::Long => {
                self.stop_loss = rules.sl_pct.map(|p| entry * (1.0 - p));
                self.take_profit = rules.tp_pct.map(|p| entry * (1.0 + p));
            }
            Side::Short => {
                self.stop_loss = rules.sl_pct.map(|p| entry * (1.0 + p));
                self.take_profit = rules.tp_pct.map(|p| entry * (1.0 - p));
            }
        }
        self.stop_kind = StopKind::Initial;
        self.be_trigger_pct = rules.be_trigger_pct;
        self.be_lock_pct = rules.be_lock_pct;
        self.be_activated = false;
        self.trail_pct = rules.trail_pct;
        self.trail_activation_pct = rules.trail_activation_pct;
        self.trail_activated = false;
        self.partial_tp_pct = rules.partial_tp_pct;
        self.partial_tp_new_tp_pct = rules.partial_tp_new_tp_pct;
    }

    /// Fold a bar's range into the tracked extremes.
    pub fn update_extremes(&mut self, high: f64, low: f64) {
        self.position_high = self.position_high.max(high);
        self.position_low = self.position_low.min(low);
    }

    /// Gross PnL in quote units at `price` (no fees).
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        match self.side {
            Side::Long => self.size_usd * (price - self.entry_price) / self.entry_price,
            Side::Short => self.size_usd * (self.entry_price - price) / self.entry_price,
        }
    }

    /// True for long positions
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }
}

/// A single execution, entry or exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Timestamp of the bar the fill occurred on
    pub timestamp: i64,
    /// Direction of the position the fill belongs to
    pub side: Side,
    /// Executed price (slippage already applied)
    pub price: f64,
    /// Size in quote units
    pub size_usd: f64,
    /// Ticker symbol
    pub symbol: String,
    /// Fee paid on this fill
    pub fee: f64,
    /// Slippage cost in quote units
    pub slippage_cost: f64,
    /// True for entry and merge fills
    pub is_entry: bool,
    /// Exit reason; `None` for entries
    pub exit_reason: Option<ExitReason>,
}

/// A closed round-trip (or partial close).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Direction
    pub side: Side,
    /// Entry fill timestamp
    pub entry_timestamp: i64,
    /// Exit fill timestamp
    pub exit_timestamp: i64,
    /// Average entry price
    pub entry_price: f64,
    /// Exit price (slippage-adjusted)
    pub exit_price: f64,
    /// Size closed, in quote units
    pub size_usd: f64,
    /// Gross realized PnL in quote units (fees recorded separately)
    pub pnl: f64,
    /// PnL as a fraction of notional
    pub return_pct: f64,
    /// Fees attributed to this trade (entry share + exit)
    pub fees: f64,
    /// Why the position closed
    pub exit_reason: ExitReason,
    /// Ticker symbol
    pub symbol: String,
    /// True when only part of the position was closed
    pub is_partial: bool,
    /// Position group label
    pub group: Option<String>,
}

impl Trade {
    /// PnL strictly positive
    pub fn is_profitable(&self) -> bool {
        self.pnl > 0.0
    }

    /// PnL strictly negative
    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }

    /// Holding time in seconds
    pub fn duration_secs(&self) -> i64 {
        self.exit_timestamp - self.entry_timestamp
    }
}
