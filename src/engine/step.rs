//! Step-wise engine for reinforcement-learning callers.
//!
//! Re-expresses the per-bar loop as `reset()` / `step(action)`: each step
//! runs phases 1 and 2 against the next bar, queues the caller's order as
//! if the strategy had returned it from `on_bar`, and reports the equity
//! delta as the reward.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::data::BarSource;
use crate::error::{BacktestError, Result};
use crate::events::EventHub;
use crate::indicators::IndicatorValue;
use crate::models::Bar;
use crate::orders::Order;
use crate::portfolio::Portfolio;
use crate::position::Position;
use crate::strategy::{IndicatorSnapshot, Strategy};

use super::SymbolEngine;

/// Strategy stand-in for the RL caller: phases that would consult a
/// strategy see only no-ops.
struct NoopStrategy;

impl Strategy for NoopStrategy {
    fn on_bar(
        &mut self,
        _bar: &Bar,
        _indicators: &IndicatorSnapshot,
        _positions: &[Position],
    ) -> Result<Vec<Order>> {
        Ok(vec![])
    }
}

/// What the caller observes after a step.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Observation {
    /// The bar the step processed
    pub bar: Bar,
    /// Indicator snapshot *after* this bar was consumed
    pub indicators: BTreeMap<String, Option<IndicatorValue>>,
    /// Open positions after phases 1–2
    pub positions: Vec<Position>,
    /// Portfolio equity after the step
    pub equity: f64,
    /// Steps taken since the last reset
    pub step_count: usize,
    /// Whether the stream is exhausted
    pub done: bool,
}

/// Result of one [`StepEngine::step`] call.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct StepOutcome {
    /// Post-step observation
    pub observation: Observation,
    /// Equity after the step minus equity before it
    pub reward: f64,
    /// Whether the stream is exhausted
    pub done: bool,
    /// Whether any exit fired during phase 2
    pub exits_fired: bool,
}

/// Step-wise wrapper over the per-bar state machine.
pub struct StepEngine {
    inner: SymbolEngine,
    portfolio: Portfolio,
    events: EventHub,
    source: Box<dyn BarSource>,
    strategy: NoopStrategy,
    prefetched: Option<Bar>,
    step_count: usize,
}

impl StepEngine {
    /// Build a step engine over `source`.
    pub fn new(config: EngineConfig, source: Box<dyn BarSource>) -> Result<Self> {
        config.validate()?;
        let portfolio = Portfolio::new(
            config.initial_equity,
            config.max_positions,
            config.default_size_usd,
        );
        let symbol = source.symbol().to_string();
        let inner = SymbolEngine::new(symbol, config)?;

        let mut engine = Self {
            inner,
            portfolio,
            events: EventHub::new(),
            source,
            strategy: NoopStrategy,
            prefetched: None,
            step_count: 0,
        };
        engine.prefetched = engine.source.next_bar();
        Ok(engine)
    }

    /// Rewind the bar stream, portfolio, queues, and indicators.
    pub fn reset(&mut self) -> Result<()> {
        self.source.reset();
        self.portfolio.reset();
        self.inner.reset()?;
        self.prefetched = self.source.next_bar();
        self.step_count = 0;
        Ok(())
    }

    /// Whether the stream is exhausted.
    pub fn done(&self) -> bool {
        self.prefetched.is_none()
    }

    /// The portfolio's current state.
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Advance one bar: fill pending orders, evaluate rule exits, queue
    /// `action` for the next bar, and report the observation and reward.
    pub fn step(&mut self, action: Option<Order>) -> Result<StepOutcome> {
        let bar = self.prefetched.take().ok_or_else(|| {
            BacktestError::invalid_param("step", "bar stream exhausted; call reset()")
        })?;

        let equity_before = self.portfolio.equity;

        self.inner
            .fill_pending(&bar, &mut self.portfolio, &mut self.events, &mut self.strategy)?;
        let exits_fired = self.inner.evaluate_exits(
            &bar,
            &mut self.portfolio,
            &mut self.events,
            &mut self.strategy,
        )?;

        if let Some(order) = action {
            self.inner
                .queue_order(order, bar.timestamp, &self.portfolio, &mut self.events);
        }

        self.inner.indicators.update(&bar);
        self.step_count += 1;
        self.prefetched = self.source.next_bar();

        let reward = self.portfolio.equity - equity_before;
        let done = self.prefetched.is_none();
        let observation = Observation {
            indicators: self.inner.indicators.values(),
            positions: self.portfolio.positions.clone(),
            equity: self.portfolio.equity,
            step_count: self.step_count,
            done,
            bar,
        };

        Ok(StepOutcome {
            observation,
            reward,
            done,
            exits_fired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VecSource;
    use crate::orders::{MarketOrder, Side};

    fn config() -> EngineConfig {
        EngineConfig::builder()
            .slippage(0.0)
            .taker_fee(0.0)
            .build()
            .unwrap()
    }

    fn bars(prices: &[f64]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| Bar::new_1m("BTC/USD", i as i64 * 60, *p, *p, *p, *p, 1.0))
            .collect()
    }

    #[test]
    fn test_action_fills_on_next_step() {
        let source = VecSource::new(bars(&[100.0, 110.0, 120.0]));
        let mut engine = StepEngine::new(config(), Box::new(source)).unwrap();

        let order = Order::Market(MarketOrder::new(Side::Long).with_size(10_000.0));
        let outcome = engine.step(Some(order)).unwrap();
        assert_eq!(outcome.observation.positions.len(), 0);
        assert_eq!(outcome.reward, 0.0);

        // Next step fills at this bar's open (110)
        let outcome = engine.step(None).unwrap();
        assert_eq!(outcome.observation.positions.len(), 1);
        assert_eq!(outcome.observation.positions[0].entry_price, 110.0);
    }

    #[test]
    fn test_reward_is_equity_delta() {
        let source = VecSource::new(bars(&[100.0, 100.0, 100.0]));
        let mut engine = StepEngine::new(config(), Box::new(source)).unwrap();

        // Open at 100 with a 10% TP that cannot fire on flat bars
        let order = Order::Market(
            MarketOrder::new(Side::Long)
                .with_size(10_000.0)
                .with_tp_pct(0.10),
        );
        engine.step(Some(order)).unwrap();
        let outcome = engine.step(None).unwrap();
        // Zero-cost fill on a flat series: no equity change
        assert_eq!(outcome.reward, 0.0);
    }

    #[test]
    fn test_done_and_reset() {
        let source = VecSource::new(bars(&[100.0, 101.0]));
        let mut engine = StepEngine::new(config(), Box::new(source)).unwrap();

        assert!(!engine.done());
        engine.step(None).unwrap();
        let outcome = engine.step(None).unwrap();
        assert!(outcome.done);
        assert!(engine.done());

        // Exhausted stream errors until reset
        assert!(engine.step(None).is_err());

        engine.reset().unwrap();
        assert!(!engine.done());
        let outcome = engine.step(None).unwrap();
        assert_eq!(outcome.observation.step_count, 1);
        assert_eq!(outcome.observation.bar.timestamp, 0);
    }

    #[test]
    fn test_stop_loss_produces_negative_reward() {
        let source = VecSource::new(bars(&[100.0, 100.0, 90.0, 90.0]));
        let mut engine = StepEngine::new(config(), Box::new(source)).unwrap();

        let order = Order::Market(
            MarketOrder::new(Side::Long)
                .with_size(10_000.0)
                .with_sl_pct(0.05),
        );
        engine.step(Some(order)).unwrap(); // queue at bar 0
        engine.step(None).unwrap(); // fills at bar 1 open (100)

        // Bar 2 gaps to 90, through the 95 stop
        let outcome = engine.step(None).unwrap();
        assert!(outcome.exits_fired);
        assert!(outcome.reward < 0.0);
        assert!(outcome.observation.positions.is_empty());
    }
}
