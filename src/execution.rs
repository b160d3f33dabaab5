//! Fill-price and fee model.
//!
//! Slippage is always adverse: entries and exits both move against the
//! trader. Fees are charged on notional per side, with separate maker and
//! taker rates.

use serde::{Deserialize, Serialize};

use crate::orders::Side;

/// Slippage and fee parameters applied to every fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionModel {
    /// Adverse slippage per side, as a fraction of price
    pub slippage_pct: f64,
    /// Taker fee per side, as a fraction of notional
    pub taker_fee_pct: f64,
    /// Maker fee per side, as a fraction of notional
    pub maker_fee_pct: f64,
}

impl Default for ExecutionModel {
    fn default() -> Self {
        Self {
            slippage_pct: 0.0002,   // 0.02%
            taker_fee_pct: 0.00015, // 0.015%
            maker_fee_pct: 0.0,
        }
    }
}

impl ExecutionModel {
    /// Frictionless model for tests and benchmark comparisons.
    pub fn zero_cost() -> Self {
        Self {
            slippage_pct: 0.0,
            taker_fee_pct: 0.0,
            maker_fee_pct: 0.0,
        }
    }

    /// Entry fill price after adverse slippage.
    pub fn entry_price(&self, raw: f64, side: Side) -> f64 {
        match side {
            Side::Long => raw * (1.0 + self.slippage_pct),
            Side::Short => raw * (1.0 - self.slippage_pct),
        }
    }

    /// Exit fill price after adverse slippage.
    pub fn exit_price(&self, raw: f64, side: Side) -> f64 {
        match side {
            Side::Long => raw * (1.0 - self.slippage_pct),
            Side::Short => raw * (1.0 + self.slippage_pct),
        }
    }

    /// Fee on `size_usd` of notional for one side of a trade.
    pub fn fee(&self, size_usd: f64, is_maker: bool) -> f64 {
        if is_maker {
            size_usd * self.maker_fee_pct
        } else {
            size_usd * self.taker_fee_pct
        }
    }

    /// Cost of slippage on `size_usd` of notional, for reporting.
    pub fn slippage_cost(&self, size_usd: f64) -> f64 {
        size_usd * self.slippage_pct
    }
}
