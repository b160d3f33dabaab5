//! Run results and summary metrics.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::position::{Fill, Trade};

/// Point on the equity curve, recorded after each close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Timestamp of the close that produced this sample
    pub timestamp: i64,
    /// Portfolio equity at this point
    pub equity: f64,
    /// Drawdown from the running peak, as a fraction (0.0–1.0)
    pub drawdown_pct: f64,
}

/// Aggregate statistics over a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Summary {
    /// Net PnL in quote units (gross PnL minus fees)
    pub net_pnl: f64,
    /// Net return as a percentage of initial equity
    pub return_pct: f64,
    /// Largest drawdown ratio (0.0–1.0)
    pub max_drawdown_pct: f64,
    /// `winning_trades / total_trades`; break-even trades count in the
    /// denominator only
    pub win_rate: f64,
    /// Mean gross PnL of winning trades
    pub avg_win: f64,
    /// Mean gross PnL of losing trades (negative)
    pub avg_loss: f64,
    /// `gross_profit / gross_loss`; infinite when there are wins but no
    /// losses, zero with no trades
    pub profit_factor: f64,
    /// Total fees paid
    pub total_fees: f64,
    /// Number of closed trades (partials included)
    pub total_trades: usize,
    /// Trades with positive PnL
    pub winning_trades: usize,
    /// Trades with negative PnL
    pub losing_trades: usize,
    /// Count of closes per exit reason
    pub exit_breakdown: BTreeMap<String, usize>,
    /// Net PnL per UTC calendar month (`YYYY-MM`)
    pub monthly_pnl: BTreeMap<String, f64>,
    /// Return of holding the asset from first to last bar, as a percentage
    pub buy_and_hold_return_pct: f64,
}

impl Summary {
    /// Compute the summary from a run's trades and equity curve.
    ///
    /// `buy_and_hold_return_pct` derives from `first_close`/`last_close` of
    /// the replayed stream (zero when either is absent).
    pub fn calculate(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_equity: f64,
        final_equity: f64,
        total_fees: f64,
        first_close: Option<f64>,
        last_close: Option<f64>,
    ) -> Self {
        let net_pnl = final_equity - initial_equity;
        let return_pct = if initial_equity > 0.0 {
            net_pnl / initial_equity * 100.0
        } else {
            0.0
        };

        let max_drawdown_pct = equity_curve
            .iter()
            .map(|e| e.drawdown_pct)
            .fold(0.0, f64::max);

        let buy_and_hold_return_pct = match (first_close, last_close) {
            (Some(first), Some(last)) if first > 0.0 => (last - first) / first * 100.0,
            _ => 0.0,
        };

        // Single pass over the trade log
        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut gross_profit = 0.0;
        let mut gross_loss = 0.0;
        let mut exit_breakdown: BTreeMap<String, usize> = BTreeMap::new();
        let mut monthly_pnl: BTreeMap<String, f64> = BTreeMap::new();

        for trade in trades {
            if trade.is_profitable() {
                winning_trades += 1;
                gross_profit += trade.pnl;
            } else if trade.is_loss() {
                losing_trades += 1;
                gross_loss += trade.pnl.abs();
            }
            *exit_breakdown
                .entry(trade.exit_reason.to_string())
                .or_insert(0) += 1;
            let month = month_key(trade.exit_timestamp);
            *monthly_pnl.entry(month).or_insert(0.0) += trade.pnl - trade.fees;
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };
        let avg_win = if winning_trades > 0 {
            gross_profit / winning_trades as f64
        } else {
            0.0
        };
        let avg_loss = if losing_trades > 0 {
            -(gross_loss / losing_trades as f64)
        } else {
            0.0
        };
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Self {
            net_pnl,
            return_pct,
            max_drawdown_pct,
            win_rate,
            avg_win,
            avg_loss,
            profit_factor,
            total_fees,
            total_trades,
            winning_trades,
            losing_trades,
            exit_breakdown,
            monthly_pnl,
            buy_and_hold_return_pct,
        }
    }
}

/// UTC `YYYY-MM` key for a Unix timestamp.
fn month_key(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Everything produced by a completed run.
#[derive(Serialize, Debug)]
#[non_exhaustive]
pub struct BacktestResult {
    /// Starting equity
    pub initial_equity: f64,
    /// Equity after the last bar
    pub final_equity: f64,
    /// Equity samples recorded after each close
    pub equity_curve: Vec<EquityPoint>,
    /// Every closed trade, in close order
    pub trades: Vec<Trade>,
    /// Every fill, in execution order
    pub fills: Vec<Fill>,
    /// Aggregate statistics
    pub summary: Summary,
}
