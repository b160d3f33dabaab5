//! Portfolio state: open positions, closed trades, fills, and equity.
//!
//! All position mutations go through the portfolio so the accounting
//! invariants hold at every step:
//!
//! - `equity == initial_equity + Σ trade.pnl − Σ fees` (trade PnL is gross)
//! - peak equity is monotone non-decreasing across recorded samples
//! - drawdown ratio is `(peak − equity) / peak` at each sample
//!
//! Equity is floored at zero; a ruined portfolio stops compounding but the
//! run completes without error.

use serde::Serialize;

use crate::execution::ExecutionModel;
use crate::orders::{ExitReason, ExitRules, Side};
use crate::position::{Fill, Position, Trade};
use crate::result::EquityPoint;
use crate::sizing::PositionSizer;

/// Portfolio-level state shared by every engine flavour.
#[derive(Serialize)]
pub struct Portfolio {
    /// Starting equity
    pub initial_equity: f64,
    /// Current equity
    pub equity: f64,
    /// Highest equity seen across recorded samples
    pub peak_equity: f64,
    /// Largest drawdown ratio seen so far
    pub max_drawdown: f64,
    /// Open positions, in open order
    pub positions: Vec<Position>,
    /// Closed trades, append-only
    pub trades: Vec<Trade>,
    /// Every fill, append-only
    pub fills: Vec<Fill>,
    /// Cumulative fees paid
    pub total_fees: f64,
    /// `(timestamp, equity)` samples recorded after each close
    pub equity_curve: Vec<EquityPoint>,
    /// Maximum concurrent positions (per group when orders carry groups)
    pub max_positions: usize,
    /// Fallback size for orders without an explicit one
    pub default_size_usd: f64,
    /// Optional cap on summed open position sizes
    pub max_total_exposure_usd: Option<f64>,
    #[serde(skip)]
    sizer: Option<Box<dyn PositionSizer>>,
}

impl Portfolio {
    /// New portfolio with the given limits.
    pub fn new(initial_equity: f64, max_positions: usize, default_size_usd: f64) -> Self {
        Self {
            initial_equity,
            equity: initial_equity,
            peak_equity: initial_equity,
            max_drawdown: 0.0,
            positions: Vec::new(),
            trades: Vec::new(),
            fills: Vec::new(),
            total_fees: 0.0,
            equity_curve: Vec::new(),
            max_positions,
            default_size_usd,
            max_total_exposure_usd: None,
            sizer: None,
        }
    }

    /// Install a position sizer; supersedes `default_size_usd`.
    pub fn with_sizer(mut self, sizer: Box<dyn PositionSizer>) -> Self {
        self.sizer = Some(sizer);
        self
    }

    /// Install a position sizer on an existing portfolio.
    pub fn set_sizer(&mut self, sizer: Box<dyn PositionSizer>) {
        self.sizer = Some(sizer);
    }

    /// Set the portfolio-wide exposure cap.
    pub fn with_exposure_cap(mut self, cap: f64) -> Self {
        self.max_total_exposure_usd = Some(cap);
        self
    }

    /// Whether a new position may open: below the position limit and, when
    /// the order carries a group, no open position already holds that group.
    pub fn can_open(&self, group: Option<&str>) -> bool {
        if self.positions.len() >= self.max_positions {
            return false;
        }
        match group {
            Some(g) => !self.positions.iter().any(|p| p.group.as_deref() == Some(g)),
            None => true,
        }
    }

    /// Sum of open position sizes in quote units.
    pub fn total_exposure(&self) -> f64 {
        self.positions.iter().map(|p| p.size_usd).sum()
    }

    /// Whether adding `size_usd` of exposure stays under the cap.
    pub fn exposure_allows(&self, size_usd: f64) -> bool {
        match self.max_total_exposure_usd {
            Some(cap) => self.total_exposure() + size_usd <= cap,
            None => true,
        }
    }

    /// Resolve the size for an entry: the order's explicit size, else the
    /// installed sizer, else the default.
    pub fn resolve_size(
        &self,
        explicit: Option<f64>,
        side: Side,
        price: f64,
        symbol: &str,
        stop_loss_pct: Option<f64>,
    ) -> f64 {
        if let Some(size) = explicit {
            return size;
        }
        match &self.sizer {
            Some(sizer) => sizer.size(self.equity, side, price, symbol, stop_loss_pct),
            None => self.default_size_usd,
        }
    }

    /// Open a position at `raw_price` (bar open for market fills, the limit
    /// price for limit fills). Entry slippage is applied, the fee debited
    /// from equity, and the entry fill recorded.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        timestamp: i64,
        side: Side,
        size_usd: f64,
        raw_price: f64,
        rules: &ExitRules,
        symbol: &str,
        group: Option<String>,
        exec: &ExecutionModel,
        is_maker: bool,
    ) -> Fill {
        let fill_price = exec.entry_price(raw_price, side);
        let fee = exec.fee(size_usd, is_maker);

        self.equity = (self.equity - fee).max(0.0);
        self.total_fees += fee;

        let position = Position::open(
            side, fill_price, timestamp, size_usd, symbol, group, rules, fee,
        );
        self.positions.push(position);

        let fill = Fill {
            timestamp,
            side,
            price: fill_price,
            size_usd,
            symbol: symbol.to_string(),
            fee,
            slippage_cost: exec.slippage_cost(size_usd),
            is_entry: true,
            exit_reason: None,
        };
        self.fills.push(fill.clone());
        tracing::debug!(symbol, %side, price = fill_price, size = size_usd, "opened position");
        fill
    }

    /// Merge a limit fill into the position at `index`.
    ///
    /// The entry becomes the size-weighted average of the old entry and the
    /// new fill; exit levels re-derive from that average using the merging
    /// order's percentages. `position_high`/`position_low` keep tracking.
    #[allow(clippy::too_many_arguments)]
    pub fn merge_position(
        &mut self,
        index: usize,
        timestamp: i64,
        add_size_usd: f64,
        limit_price: f64,
        rules: &ExitRules,
        exec: &ExecutionModel,
        is_maker: bool,
    ) -> Fill {
        let side = self.positions[index].side;
        let fill_price = exec.entry_price(limit_price, side);
        let fee = exec.fee(add_size_usd, is_maker);

        self.equity = (self.equity - fee).max(0.0);
        self.total_fees += fee;

        let position = &mut self.positions[index];
        let old_size = position.size_usd;
        let new_size = old_size + add_size_usd;
        position.entry_price =
            (old_size * position.entry_price + add_size_usd * fill_price) / new_size;
        position.size_usd = new_size;
        position.entry_fee_remaining += fee;
        position.derive_levels(rules);

        let symbol = position.symbol.clone();
        let fill = Fill {
            timestamp,
            side,
            price: fill_price,
            size_usd: add_size_usd,
            symbol,
            fee,
            slippage_cost: exec.slippage_cost(add_size_usd),
            is_entry: true,
            exit_reason: None,
        };
        self.fills.push(fill.clone());
        fill
    }

    /// Close the position at `index` at `raw_price` with exit slippage.
    ///
    /// Gross PnL is `size · (exit − entry) / entry` for longs and the
    /// mirror for shorts; equity is credited the PnL net of the exit fee
    /// (the entry fee was debited at open).
    pub fn close_position(
        &mut self,
        index: usize,
        timestamp: i64,
        raw_price: f64,
        reason: ExitReason,
        exec: &ExecutionModel,
        is_maker: bool,
    ) -> (Fill, Trade) {
        let position = self.positions.remove(index);
        let exit_price = exec.exit_price(raw_price, position.side);
        let fee = exec.fee(position.size_usd, is_maker);

        let pnl = position.unrealized_pnl(exit_price);
        let return_pct = if position.size_usd > 0.0 {
            pnl / position.size_usd
        } else {
            0.0
        };

        self.equity = (self.equity + pnl - fee).max(0.0);
        self.total_fees += fee;

        let fill = Fill {
            timestamp,
            side: position.side,
            price: exit_price,
            size_usd: position.size_usd,
            symbol: position.symbol.clone(),
            fee,
            slippage_cost: exec.slippage_cost(position.size_usd),
            is_entry: false,
            exit_reason: Some(reason),
        };
        let trade = Trade {
            side: position.side,
            entry_timestamp: position.entry_timestamp,
            exit_timestamp: timestamp,
            entry_price: position.entry_price,
            exit_price,
            size_usd: position.size_usd,
            pnl,
            return_pct,
            fees: position.entry_fee_remaining + fee,
            exit_reason: reason,
            symbol: position.symbol.clone(),
            is_partial: false,
            group: position.group.clone(),
        };

        self.fills.push(fill.clone());
        self.trades.push(trade.clone());
        self.record_equity(timestamp);
        tracing::debug!(symbol = %trade.symbol, %reason, pnl, "closed position");
        (fill, trade)
    }

    /// Close `fraction` of the position at `index`.
    ///
    /// The remainder keeps its stop and trailing state; its take-profit is
    /// rewritten to the configured post-partial level and the partial flag
    /// set so it fires at most once.
    pub fn partial_close_position(
        &mut self,
        index: usize,
        timestamp: i64,
        fraction: f64,
        raw_price: f64,
        reason: ExitReason,
        exec: &ExecutionModel,
    ) -> (Fill, Trade) {
        let position = &mut self.positions[index];
        let side = position.side;
        let closed_size = position.size_usd * fraction;
        let exit_price = exec.exit_price(raw_price, side);
        let fee = exec.fee(closed_size, false);

        let entry = position.entry_price;
        let pnl = match side {
            Side::Long => closed_size * (exit_price - entry) / entry,
            Side::Short => closed_size * (entry - exit_price) / entry,
        };
        let entry_fee_share = position.entry_fee_remaining * fraction;

        position.size_usd -= closed_size;
        position.entry_fee_remaining -= entry_fee_share;
        position.partial_tp_done = true;
        if let Some(new_tp_pct) = position.partial_tp_new_tp_pct {
            position.take_profit = Some(match side {
                Side::Long => entry * (1.0 + new_tp_pct),
                Side::Short => entry * (1.0 - new_tp_pct),
            });
        }

        let symbol = position.symbol.clone();
        let group = position.group.clone();
        let entry_timestamp = position.entry_timestamp;

        self.equity = (self.equity + pnl - fee).max(0.0);
        self.total_fees += fee;

        let fill = Fill {
            timestamp,
            side,
            price: exit_price,
            size_usd: closed_size,
            symbol: symbol.clone(),
            fee,
            slippage_cost: exec.slippage_cost(closed_size),
            is_entry: false,
            exit_reason: Some(reason),
        };
        let trade = Trade {
            side,
            entry_timestamp,
            exit_timestamp: timestamp,
            entry_price: entry,
            exit_price,
            size_usd: closed_size,
            pnl,
            return_pct: if closed_size > 0.0 { pnl / closed_size } else { 0.0 },
            fees: entry_fee_share + fee,
            exit_reason: reason,
            symbol,
            is_partial: true,
            group,
        };

        self.fills.push(fill.clone());
        self.trades.push(trade.clone());
        self.record_equity(timestamp);
        (fill, trade)
    }

    /// Rewind to the initial state, keeping limits and the sizer.
    pub fn reset(&mut self) {
        self.equity = self.initial_equity;
        self.peak_equity = self.initial_equity;
        self.max_drawdown = 0.0;
        self.positions.clear();
        self.trades.clear();
        self.fills.clear();
        self.total_fees = 0.0;
        self.equity_curve.clear();
    }

    fn record_equity(&mut self, timestamp: i64) {
        self.peak_equity = self.peak_equity.max(self.equity);
        let drawdown = if self.peak_equity > 0.0 {
            (self.peak_equity - self.equity) / self.peak_equity
        } else {
            0.0
        };
        self.max_drawdown = self.max_drawdown.max(drawdown);
        self.equity_curve.push(EquityPoint {
            timestamp,
            equity: self.equity,
            drawdown_pct: drawdown,
        });
    }
}
