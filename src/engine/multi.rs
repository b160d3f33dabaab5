//! Multi-symbol engine: time-merged dispatch over a shared portfolio.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use crate::config::EngineConfig;
use crate::data::{BarSource, Validator};
use crate::error::{BacktestError, Result};
use crate::events::{EngineEvent, EventHub, EventKind, ListenerId};
use crate::models::Bar;
use crate::portfolio::Portfolio;
use crate::result::{BacktestResult, Summary};
use crate::strategy::Strategy;

use super::SymbolEngine;

/// Heap entry ordering bars by `(timestamp, symbol)` ascending; the symbol
/// tie-break keeps multi-stream merges deterministic.
struct QueuedBar {
    bar: Bar,
    source_index: usize,
}

impl PartialEq for QueuedBar {
    fn eq(&self, other: &Self) -> bool {
        self.bar.timestamp == other.bar.timestamp && self.bar.symbol == other.bar.symbol
    }
}

impl Eq for QueuedBar {}

impl PartialOrd for QueuedBar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedBar {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we pop the earliest bar
        (other.bar.timestamp, &other.bar.symbol).cmp(&(self.bar.timestamp, &self.bar.symbol))
    }
}

/// Time-merges several symbol streams and dispatches each bar to that
/// symbol's sub-engine. One shared portfolio tracks all positions, so
/// equity, drawdown, `max_positions`, and the optional
/// `max_total_exposure_usd` cap are portfolio-wide.
pub struct MultiAssetEngine {
    config: EngineConfig,
    engines: BTreeMap<String, (SymbolEngine, Box<dyn Strategy>)>,
    portfolio: Portfolio,
    events: EventHub,
    first_closes: BTreeMap<String, f64>,
    last_closes: BTreeMap<String, f64>,
}

impl MultiAssetEngine {
    /// New multi-asset engine over a validated config.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut portfolio = Portfolio::new(
            config.initial_equity,
            config.max_positions,
            config.default_size_usd,
        );
        if let Some(cap) = config.max_total_exposure_usd {
            portfolio = portfolio.with_exposure_cap(cap);
        }
        Ok(Self {
            config,
            engines: BTreeMap::new(),
            portfolio,
            events: EventHub::new(),
            first_closes: BTreeMap::new(),
            last_closes: BTreeMap::new(),
        })
    }

    /// Register a symbol with its own strategy instance. Per-symbol config
    /// overrides from `symbol_configs` apply here.
    pub fn add_symbol(
        &mut self,
        symbol: impl Into<String>,
        strategy: impl Strategy + 'static,
    ) -> Result<()> {
        let symbol = symbol.into();
        let mut strategy: Box<dyn Strategy> = Box::new(strategy);
        let mut sym_config = self.config.for_symbol(&symbol);
        strategy.configure(&sym_config)?;
        for (name, spec) in strategy.required_indicators() {
            sym_config.indicators.entry(name).or_insert(spec);
        }
        let engine = SymbolEngine::new(symbol.clone(), sym_config)?;
        self.engines.insert(symbol, (engine, strategy));
        Ok(())
    }

    /// Subscribe a listener shared by all sub-engines.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        listener: impl FnMut(&EngineEvent) + Send + 'static,
    ) -> ListenerId {
        self.events.subscribe(kind, listener)
    }

    /// Remove a listener by identity.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Install a position sizer on the shared portfolio.
    pub fn with_sizer(mut self, sizer: Box<dyn crate::sizing::PositionSizer>) -> Self {
        self.portfolio.set_sizer(sizer);
        self
    }

    /// The shared portfolio.
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Merge `sources` by bar timestamp (symbol-name tie-break) and run
    /// each bar through its symbol's sub-engine.
    pub fn run(&mut self, mut sources: Vec<Box<dyn BarSource>>) -> Result<BacktestResult> {
        for source in &sources {
            if !self.engines.contains_key(source.symbol()) {
                return Err(BacktestError::invalid_param(
                    "sources",
                    format!("no strategy registered for symbol '{}'", source.symbol()),
                ));
            }
        }

        let mut validators: Vec<Validator> = sources
            .iter()
            .map(|_| Validator::new(self.config.validation))
            .collect();

        let mut heap = BinaryHeap::new();
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some(bar) = source.next_bar() {
                heap.push(QueuedBar {
                    bar,
                    source_index: index,
                });
            }
        }

        while let Some(QueuedBar { bar, source_index }) = heap.pop() {
            if validators[source_index].check(&bar)? {
                self.dispatch(&bar)?;
            }
            if let Some(next) = sources[source_index].next_bar() {
                heap.push(QueuedBar {
                    bar: next,
                    source_index,
                });
            }
        }

        Ok(self.result())
    }

    fn dispatch(&mut self, bar: &Bar) -> Result<()> {
        let (engine, strategy) = self
            .engines
            .get_mut(&bar.symbol)
            .ok_or_else(|| {
                BacktestError::invalid_param(
                    "bar.symbol",
                    format!("no sub-engine for symbol '{}'", bar.symbol),
                )
            })?;
        self.first_closes
            .entry(bar.symbol.clone())
            .or_insert(bar.close);
        self.last_closes.insert(bar.symbol.clone(), bar.close);
        engine.process_bar(bar, &mut self.portfolio, &mut self.events, strategy.as_mut())?;
        Ok(())
    }

    /// Build the portfolio-wide result. The buy-and-hold reference is the
    /// equal-weight mean of each symbol's close-to-close return.
    pub fn result(&self) -> BacktestResult {
        let (first, last) = self.buy_and_hold_reference();
        let summary = Summary::calculate(
            &self.portfolio.trades,
            &self.portfolio.equity_curve,
            self.portfolio.initial_equity,
            self.portfolio.equity,
            self.portfolio.total_fees,
            first,
            last,
        );
        BacktestResult {
            initial_equity: self.portfolio.initial_equity,
            final_equity: self.portfolio.equity,
            equity_curve: self.portfolio.equity_curve.clone(),
            trades: self.portfolio.trades.clone(),
            fills: self.portfolio.fills.clone(),
            summary,
        }
    }

    /// Collapse per-symbol buy-and-hold returns into a synthetic pair of
    /// (first, last) prices producing their equal-weight mean return.
    fn buy_and_hold_reference(&self) -> (Option<f64>, Option<f64>) {
        let mut returns = Vec::new();
        for (symbol, first) in &self.first_closes {
            if let Some(last) = self.last_closes.get(symbol)
                && *first > 0.0
            {
                returns.push((last - first) / first);
            }
        }
        if returns.is_empty() {
            return (None, None);
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        (Some(1.0), Some(1.0 + mean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VecSource;
    use crate::orders::{MarketOrder, Order, Side};
    use crate::position::Position;
    use crate::strategy::IndicatorSnapshot;

    /// Buys once on the first bar it sees, with a fixed size.
    struct BuyOnce {
        size: f64,
        bought: bool,
    }

    impl BuyOnce {
        fn new(size: f64) -> Self {
            Self {
                size,
                bought: false,
            }
        }
    }

    impl Strategy for BuyOnce {
        fn on_bar(
            &mut self,
            _bar: &Bar,
            _indicators: &IndicatorSnapshot,
            _positions: &[Position],
        ) -> Result<Vec<Order>> {
            if self.bought {
                return Ok(vec![]);
            }
            self.bought = true;
            Ok(vec![Order::Market(
                MarketOrder::new(Side::Long).with_size(self.size),
            )])
        }
    }

    fn bars(symbol: &str, count: i64, price: f64) -> Vec<Bar> {
        (0..count)
            .map(|i| Bar::new_1m(symbol, i * 60, price, price, price, price, 1.0))
            .collect()
    }

    fn engine_with_cap(cap: f64) -> MultiAssetEngine {
        let config = EngineConfig::builder()
            .initial_equity(100_000.0)
            .max_positions(10)
            .slippage(0.0)
            .taker_fee(0.0)
            .max_total_exposure_usd(cap)
            .build()
            .unwrap();
        MultiAssetEngine::new(config).unwrap()
    }

    #[test]
    fn test_exposure_cap_rejects_second_fill() {
        let mut engine = engine_with_cap(20_000.0);
        engine.add_symbol("AAA/USD", BuyOnce::new(15_000.0)).unwrap();
        engine.add_symbol("BBB/USD", BuyOnce::new(15_000.0)).unwrap();

        let sources: Vec<Box<dyn BarSource>> = vec![
            Box::new(VecSource::new(bars("AAA/USD", 5, 100.0))),
            Box::new(VecSource::new(bars("BBB/USD", 5, 50.0))),
        ];
        engine.run(sources).unwrap();

        // First order fills (exposure 15k); the second would push to 30k
        // and is silently rejected
        assert_eq!(engine.portfolio().fills.len(), 1);
        assert_eq!(engine.portfolio().positions.len(), 1);
        // Symbol tie-break is alphabetical, so AAA won the slot
        assert_eq!(engine.portfolio().positions[0].symbol, "AAA/USD");
    }

    #[test]
    fn test_shared_portfolio_counts_positions_across_symbols() {
        let config = EngineConfig::builder()
            .initial_equity(100_000.0)
            .max_positions(1)
            .slippage(0.0)
            .taker_fee(0.0)
            .build()
            .unwrap();
        let mut engine = MultiAssetEngine::new(config).unwrap();
        engine.add_symbol("AAA/USD", BuyOnce::new(1_000.0)).unwrap();
        engine.add_symbol("BBB/USD", BuyOnce::new(1_000.0)).unwrap();

        let sources: Vec<Box<dyn BarSource>> = vec![
            Box::new(VecSource::new(bars("AAA/USD", 5, 100.0))),
            Box::new(VecSource::new(bars("BBB/USD", 5, 50.0))),
        ];
        engine.run(sources).unwrap();

        // max_positions is portfolio-wide
        assert_eq!(engine.portfolio().positions.len(), 1);
    }

    #[test]
    fn test_unregistered_symbol_rejected() {
        let mut engine = engine_with_cap(10_000.0);
        engine.add_symbol("AAA/USD", BuyOnce::new(1_000.0)).unwrap();

        let sources: Vec<Box<dyn BarSource>> =
            vec![Box::new(VecSource::new(bars("ZZZ/USD", 2, 10.0)))];
        assert!(engine.run(sources).is_err());
    }

    #[test]
    fn test_merge_is_deterministic_across_orderings() {
        // Same streams, sources supplied in different orders: identical fills
        let run = |flip: bool| {
            let mut engine = engine_with_cap(50_000.0);
            engine.add_symbol("AAA/USD", BuyOnce::new(5_000.0)).unwrap();
            engine.add_symbol("BBB/USD", BuyOnce::new(5_000.0)).unwrap();
            let a: Box<dyn BarSource> = Box::new(VecSource::new(bars("AAA/USD", 4, 100.0)));
            let b: Box<dyn BarSource> = Box::new(VecSource::new(bars("BBB/USD", 4, 50.0)));
            let sources = if flip { vec![b, a] } else { vec![a, b] };
            engine.run(sources).unwrap();
            engine
                .portfolio()
                .fills
                .iter()
                .map(|f| (f.timestamp, f.symbol.clone(), f.price.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(false), run(true));
    }
}
