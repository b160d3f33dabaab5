//! Position sizing.

use crate::orders::Side;

/// Computes the quote-currency size of a new position.
///
/// When a sizer is installed on the portfolio it supersedes the configured
/// `default_size_usd` for every fill whose order carries no explicit size.
pub trait PositionSizer: Send + Sync {
    /// Size in quote units for a prospective entry.
    ///
    /// `stop_loss_pct` is the order's stop distance when configured, letting
    /// risk-based sizers normalise position size by stop width.
    fn size(
        &self,
        equity: f64,
        side: Side,
        price: f64,
        symbol: &str,
        stop_loss_pct: Option<f64>,
    ) -> f64;
}

/// Sizes every position as a fixed fraction of current equity.
#[derive(Debug, Clone, Copy)]
pub struct FixedFraction {
    /// Fraction of equity per position (e.g. `0.25`)
    pub fraction: f64,
}

impl FixedFraction {
    /// New fixed-fraction sizer.
    pub fn new(fraction: f64) -> Self {
        Self { fraction }
    }
}

impl PositionSizer for FixedFraction {
    fn size(
        &self,
        equity: f64,
        _side: Side,
        _price: f64,
        _symbol: &str,
        _stop_loss_pct: Option<f64>,
    ) -> f64 {
        (equity * self.fraction).max(0.0)
    }
}

/// Risks a fixed fraction of equity per trade, scaled by the stop width.
///
/// With a 1% risk budget and a 2% stop, the position is sized at half of
/// equity; without a stop it falls back to the risk fraction itself.
#[derive(Debug, Clone, Copy)]
pub struct FixedRisk {
    /// Fraction of equity risked per trade (e.g. `0.01`)
    pub risk_fraction: f64,
}

impl FixedRisk {
    /// New fixed-risk sizer.
    pub fn new(risk_fraction: f64) -> Self {
        Self { risk_fraction }
    }
}

impl PositionSizer for FixedRisk {
    fn size(
        &self,
        equity: f64,
        _side: Side,
        _price: f64,
        _symbol: &str,
        stop_loss_pct: Option<f64>,
    ) -> f64 {
        let budget = equity * self.risk_fraction;
        match stop_loss_pct {
            Some(sl) if sl > 0.0 => (budget / sl).max(0.0),
            _ => budget.max(0.0),
        }
    }
}
