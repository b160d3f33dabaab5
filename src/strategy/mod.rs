//! Strategy trait and supporting types.
//!
//! A strategy is defined by a capability set: `configure` runs once before
//! the first bar, `on_bar` is required, and `on_fill` / `on_exit` /
//! `check_exits` are optional with default no-op implementations. Callback
//! errors abort the run and are surfaced with the bar timestamp attached.
//!
//! # Example
//!
//! ```
//! use barsim::models::Bar;
//! use barsim::orders::{Order, Side};
//! use barsim::position::Position;
//! use barsim::strategy::{IndicatorSnapshot, Strategy};
//!
//! struct BuyOnce {
//!     bought: bool,
//! }
//!
//! impl Strategy for BuyOnce {
//!     fn on_bar(
//!         &mut self,
//!         _bar: &Bar,
//!         _indicators: &IndicatorSnapshot,
//!         _positions: &[Position],
//!     ) -> barsim::Result<Vec<Order>> {
//!         if self.bought {
//!             return Ok(vec![]);
//!         }
//!         self.bought = true;
//!         Ok(vec![Order::market(Side::Long)])
//!     }
//! }
//! ```

pub mod declarative;
mod prebuilt;

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::indicators::{IndicatorSpec, IndicatorValue};
use crate::models::Bar;
use crate::orders::{ExitReason, Order};
use crate::position::{Fill, Position, Trade};

pub use declarative::{ConditionSpec, DeclarativeConfig, DeclarativeStrategy, EntryRules, Operand};
pub use prebuilt::{RsiReversal, SmaCross};

/// The indicator values visible to a strategy on one bar: every configured
/// name mapped to its current output (`None` while warming up).
pub type IndicatorSnapshot = BTreeMap<String, Option<IndicatorValue>>;

/// An exit requested by [`Strategy::check_exits`].
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyExit {
    /// Index into the positions slice passed to `check_exits`
    pub index: usize,
    /// Raw exit price (exit slippage still applies)
    pub price: f64,
    /// Reason recorded on the trade
    pub reason: ExitReason,
    /// Close only this fraction of the position when set
    pub fraction: Option<f64>,
}

impl StrategyExit {
    /// Full close of position `index` at `price`.
    pub fn full(index: usize, price: f64, reason: ExitReason) -> Self {
        Self {
            index,
            price,
            reason,
            fraction: None,
        }
    }

    /// Partial close of position `index` at `price`.
    pub fn partial(index: usize, price: f64, reason: ExitReason, fraction: f64) -> Self {
        Self {
            index,
            price,
            reason,
            fraction: Some(fraction),
        }
    }
}

/// A trading strategy driven by the engine's bar loop.
pub trait Strategy: Send {
    /// One-shot initialisation before the first bar.
    fn configure(&mut self, _config: &EngineConfig) -> Result<()> {
        Ok(())
    }

    /// Indicators this strategy needs, merged into the engine's configured
    /// set before the run starts.
    fn required_indicators(&self) -> BTreeMap<String, IndicatorSpec> {
        BTreeMap::new()
    }

    /// Called once per bar (phase 4) with the indicator snapshot derived
    /// from strictly prior bars. Returned orders are queued: market orders
    /// replace the pending market slot, limit/stop orders append.
    fn on_bar(
        &mut self,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
        positions: &[Position],
    ) -> Result<Vec<Order>>;

    /// Called after every entry or merge fill.
    fn on_fill(&mut self, _fill: &Fill) -> Result<Option<Order>> {
        Ok(None)
    }

    /// Called after every close (full or partial).
    fn on_exit(&mut self, _fill: &Fill, _trade: &Trade) -> Result<Option<Order>> {
        Ok(None)
    }

    /// Called in phase 3 with the open positions; returned entries close
    /// (or partially close) positions by index at the given raw price.
    fn check_exits(&mut self, _bar: &Bar, _positions: &[Position]) -> Result<Vec<StrategyExit>> {
        Ok(Vec::new())
    }
}

impl Strategy for Box<dyn Strategy> {
    fn configure(&mut self, config: &EngineConfig) -> Result<()> {
        (**self).configure(config)
    }
    fn required_indicators(&self) -> BTreeMap<String, IndicatorSpec> {
        (**self).required_indicators()
    }
    fn on_bar(
        &mut self,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
        positions: &[Position],
    ) -> Result<Vec<Order>> {
        (**self).on_bar(bar, indicators, positions)
    }
    fn on_fill(&mut self, fill: &Fill) -> Result<Option<Order>> {
        (**self).on_fill(fill)
    }
    fn on_exit(&mut self, fill: &Fill, trade: &Trade) -> Result<Option<Order>> {
        (**self).on_exit(fill, trade)
    }
    fn check_exits(&mut self, bar: &Bar, positions: &[Position]) -> Result<Vec<StrategyExit>> {
        (**self).check_exits(bar, positions)
    }
}

/// Resolve a scalar from a snapshot entry, reaching into record fields with
/// a dotted path (`"macd.signal"`).
pub fn snapshot_value(snapshot: &IndicatorSnapshot, name: &str) -> Option<f64> {
    match name.split_once('.') {
        Some((base, field)) => snapshot.get(base)?.as_ref()?.field(field),
        None => snapshot.get(name)?.as_ref()?.as_scalar(),
    }
}
