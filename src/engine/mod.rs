//! The execution engine: a 4-phase state machine per 1-minute bar.
//!
//! For every arriving bar, in strict order:
//!
//! 1. **Fill pending orders**: the market slot first, then the limit
//!    queue in insertion order, then the stop queue (stable,
//!    implementation-defined ordering between the two queues).
//! 2. **Exit evaluation with gap protection**: per position, gap-through
//!    stop, gap-through take-profit, intra-bar stop, breakeven/trailing
//!    updates, then intra-bar take-profit (partial first when configured).
//! 3. **Strategy exits**: `check_exits` closes positions by index.
//! 4. **Strategy signals**: `on_bar`, skipped when an exit fired and
//!    `skip_signal_on_close` is set.
//!
//! The indicator manager is updated *after* phase 4, so the snapshot
//! `on_bar` observes on bar `T` derives only from bars `[0..T-1]`.

mod multi;
mod step;

pub use multi::MultiAssetEngine;
pub use step::{Observation, StepEngine, StepOutcome};

use tracing::debug;

use crate::config::EngineConfig;
use crate::data::{BarSource, Validator};
use crate::error::{BacktestError, Result};
use crate::events::{EngineEvent, EventHub, EventKind, ListenerId};
use crate::execution::ExecutionModel;
use crate::indicators::IndicatorManager;
use crate::models::Bar;
use crate::orders::{ExitReason, LimitOrder, MarketOrder, Order, Pending, Side, StopOrder};
use crate::portfolio::Portfolio;
use crate::position::Position;
use crate::result::{BacktestResult, Summary};
use crate::strategy::Strategy;

/// What phase 2 decided for one position on one bar.
enum ExitAction {
    Full { raw_price: f64, reason: ExitReason },
    Partial { raw_price: f64, reason: ExitReason, fraction: f64 },
}

/// Per-symbol engine state: pending queues and the indicator manager.
///
/// The portfolio is owned by the caller ([`Engine`], [`MultiAssetEngine`],
/// or [`StepEngine`]) and passed into each phase, which is what lets the
/// multi-asset engine share one portfolio across symbols.
pub(crate) struct SymbolEngine {
    pub(crate) symbol: String,
    config: EngineConfig,
    execution: ExecutionModel,
    pub(crate) indicators: IndicatorManager,
    pending_market: Option<MarketOrder>,
    pending_limits: Vec<Pending<LimitOrder>>,
    pending_stops: Vec<Pending<StopOrder>>,
}

impl SymbolEngine {
    pub(crate) fn new(symbol: impl Into<String>, config: EngineConfig) -> Result<Self> {
        let indicators = IndicatorManager::from_specs(&config.indicators)?;
        let execution = config.execution_model();
        Ok(Self {
            symbol: symbol.into(),
            config,
            execution,
            indicators,
            pending_market: None,
            pending_limits: Vec::new(),
            pending_stops: Vec::new(),
        })
    }

    /// Clear queues and indicator state for a rerun.
    pub(crate) fn reset(&mut self) -> Result<()> {
        self.pending_market = None;
        self.pending_limits.clear();
        self.pending_stops.clear();
        self.indicators.reset()?;
        Ok(())
    }

    /// Run all four phases for one bar, then update indicators and emit the
    /// bar event. Returns whether any exit fired.
    pub(crate) fn process_bar(
        &mut self,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<bool> {
        if self.symbol.is_empty() {
            self.symbol = bar.symbol.clone();
        }

        self.fill_pending(bar, portfolio, events, strategy)?;
        let rule_exits = self.evaluate_exits(bar, portfolio, events, strategy)?;
        let strategy_exits = self.apply_strategy_exits(bar, portfolio, events, strategy)?;

        let exits_fired = rule_exits || strategy_exits;
        if !(self.config.skip_signal_on_close && exits_fired) {
            self.collect_signals(bar, portfolio, events, strategy)?;
        }

        self.indicators.update(bar);
        events.emit(&EngineEvent::Bar(bar.clone()));
        Ok(exits_fired)
    }

    /// Phase 1: market slot, then limits in insertion order, then stops.
    pub(crate) fn fill_pending(
        &mut self,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<()> {
        if let Some(order) = self.pending_market.take() {
            self.fill_market(order, bar, portfolio, events, strategy)?;
        }
        self.fill_limits(bar, portfolio, events, strategy)?;
        self.fill_stops(bar, portfolio, events, strategy)?;
        Ok(())
    }

    fn order_symbol(&self, explicit: &Option<String>) -> String {
        explicit.clone().unwrap_or_else(|| self.symbol.clone())
    }

    /// `same_direction_only` gate: no opposite-side position on the symbol.
    fn side_acceptable(&self, portfolio: &Portfolio, symbol: &str, side: Side) -> bool {
        if !self.config.same_direction_only {
            return true;
        }
        !portfolio
            .positions
            .iter()
            .any(|p| p.symbol == symbol && p.side != side)
    }

    fn fill_market(
        &mut self,
        order: MarketOrder,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<()> {
        let symbol = self.order_symbol(&order.symbol);
        let size = portfolio.resolve_size(
            order.size_usd,
            order.side,
            bar.open,
            &symbol,
            order.exits.sl_pct,
        );

        if !self.side_acceptable(portfolio, &symbol, order.side)
            || !portfolio.can_open(order.group.as_deref())
            || !portfolio.exposure_allows(size)
            || size <= 0.0
        {
            debug!(symbol, side = %order.side, "market order rejected");
            return Ok(());
        }

        let fill = portfolio.open_position(
            bar.timestamp,
            order.side,
            size,
            bar.open,
            &order.exits,
            &symbol,
            order.group.clone(),
            &self.execution,
            false,
        );
        events.emit(&EngineEvent::Fill(fill.clone()));
        let followup = strategy
            .on_fill(&fill)
            .map_err(|e| BacktestError::strategy(bar.timestamp, e))?;
        if let Some(next) = followup {
            self.queue_order(next, bar.timestamp, portfolio, events);
        }
        Ok(())
    }

    fn fill_limits(
        &mut self,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<()> {
        let mut i = 0;
        while i < self.pending_limits.len() {
            let order = &self.pending_limits[i].order;
            let gate_open = portfolio.positions.len() >= order.min_positions;
            let triggered = gate_open
                && match order.side {
                    Side::Long => bar.low <= order.limit_price,
                    Side::Short => bar.high >= order.limit_price,
                };

            if triggered {
                let order = self.pending_limits.remove(i).order;
                self.fill_limit(order, bar, portfolio, events, strategy)?;
                // do not advance: the next pending limit shifted into `i`
            } else {
                let pending = &mut self.pending_limits[i];
                pending.bars_elapsed += 1;
                if pending.order.timeout_bars > 0
                    && pending.bars_elapsed >= pending.order.timeout_bars
                {
                    debug!(limit_price = pending.order.limit_price, "limit order timed out");
                    self.pending_limits.remove(i);
                } else {
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn fill_limit(
        &mut self,
        order: LimitOrder,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<()> {
        let symbol = self.order_symbol(&order.symbol);
        let is_maker = order.use_maker_fee;
        let size = portfolio.resolve_size(
            order.size_usd,
            order.side,
            order.limit_price,
            &symbol,
            order.exits.sl_pct,
        );
        if size <= 0.0 || !portfolio.exposure_allows(size) {
            debug!(symbol, "limit fill rejected by exposure cap");
            return Ok(());
        }

        let merge_target = if order.merge_position {
            portfolio
                .positions
                .iter()
                .position(|p| p.symbol == symbol && p.side == order.side)
        } else {
            None
        };

        let fill = if let Some(index) = merge_target {
            portfolio.merge_position(
                index,
                bar.timestamp,
                size,
                order.limit_price,
                &order.exits,
                &self.execution,
                is_maker,
            )
        } else {
            if !self.side_acceptable(portfolio, &symbol, order.side)
                || !portfolio.can_open(order.group.as_deref())
            {
                debug!(symbol, side = %order.side, "limit fill rejected");
                return Ok(());
            }
            portfolio.open_position(
                bar.timestamp,
                order.side,
                size,
                order.limit_price,
                &order.exits,
                &symbol,
                order.group.clone(),
                &self.execution,
                is_maker,
            )
        };

        events.emit(&EngineEvent::Fill(fill.clone()));
        let followup = strategy
            .on_fill(&fill)
            .map_err(|e| BacktestError::strategy(bar.timestamp, e))?;
        if let Some(next) = followup {
            self.queue_order(next, bar.timestamp, portfolio, events);
        }
        Ok(())
    }

    fn fill_stops(
        &mut self,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<()> {
        let mut i = 0;
        while i < self.pending_stops.len() {
            let order = &self.pending_stops[i].order;
            let triggered = match order.side {
                Side::Long => bar.high >= order.stop_price,
                Side::Short => bar.low <= order.stop_price,
            };

            if triggered {
                let order = self.pending_stops.remove(i).order;
                let symbol = self.order_symbol(&order.symbol);
                let size = portfolio.resolve_size(
                    order.size_usd,
                    order.side,
                    order.stop_price,
                    &symbol,
                    order.exits.sl_pct,
                );
                if self.side_acceptable(portfolio, &symbol, order.side)
                    && portfolio.can_open(order.group.as_deref())
                    && portfolio.exposure_allows(size)
                    && size > 0.0
                {
                    // Stop entries trade like market orders at the stop price
                    let fill = portfolio.open_position(
                        bar.timestamp,
                        order.side,
                        size,
                        order.stop_price,
                        &order.exits,
                        &symbol,
                        order.group.clone(),
                        &self.execution,
                        false,
                    );
                    events.emit(&EngineEvent::Fill(fill.clone()));
                    let followup = strategy
                        .on_fill(&fill)
                        .map_err(|e| BacktestError::strategy(bar.timestamp, e))?;
                    if let Some(next) = followup {
                        self.queue_order(next, bar.timestamp, portfolio, events);
                    }
                } else {
                    debug!(symbol, side = %order.side, "stop order rejected");
                }
            } else {
                let pending = &mut self.pending_stops[i];
                pending.bars_elapsed += 1;
                if pending.order.timeout_bars > 0
                    && pending.bars_elapsed >= pending.order.timeout_bars
                {
                    self.pending_stops.remove(i);
                } else {
                    i += 1;
                }
            }
        }
        Ok(())
    }

    /// Phase 2: the exit priority ladder per open position of this symbol.
    /// The first matching exit closes (or partially closes) the position;
    /// no further exit is considered for it on this bar.
    pub(crate) fn evaluate_exits(
        &mut self,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<bool> {
        let mut any_fired = false;
        let mut i = 0;
        while i < portfolio.positions.len() {
            if portfolio.positions[i].symbol != self.symbol {
                i += 1;
                continue;
            }
            match evaluate_position_exit(&mut portfolio.positions[i], bar) {
                Some(ExitAction::Full { raw_price, reason }) => {
                    let (fill, trade) = portfolio.close_position(
                        i,
                        bar.timestamp,
                        raw_price,
                        reason,
                        &self.execution,
                        false,
                    );
                    any_fired = true;
                    events.emit(&EngineEvent::Exit {
                        fill: fill.clone(),
                        trade: trade.clone(),
                    });
                    let followup = strategy
                        .on_exit(&fill, &trade)
                        .map_err(|e| BacktestError::strategy(bar.timestamp, e))?;
                    if let Some(next) = followup {
                        self.queue_order(next, bar.timestamp, portfolio, events);
                    }
                    // position removed: the next one shifted into `i`
                }
                Some(ExitAction::Partial {
                    raw_price,
                    reason,
                    fraction,
                }) => {
                    let (fill, trade) = portfolio.partial_close_position(
                        i,
                        bar.timestamp,
                        fraction,
                        raw_price,
                        reason,
                        &self.execution,
                    );
                    any_fired = true;
                    events.emit(&EngineEvent::Exit {
                        fill: fill.clone(),
                        trade: trade.clone(),
                    });
                    let followup = strategy
                        .on_exit(&fill, &trade)
                        .map_err(|e| BacktestError::strategy(bar.timestamp, e))?;
                    if let Some(next) = followup {
                        self.queue_order(next, bar.timestamp, portfolio, events);
                    }
                    i += 1;
                }
                None => i += 1,
            }
        }
        Ok(any_fired)
    }

    /// Indices into the shared portfolio for this symbol's positions.
    fn symbol_position_indices(&self, portfolio: &Portfolio) -> Vec<usize> {
        portfolio
            .positions
            .iter()
            .enumerate()
            .filter(|(_, p)| p.symbol == self.symbol)
            .map(|(i, _)| i)
            .collect()
    }

    /// Snapshot of this symbol's positions, for strategy callbacks.
    fn position_snapshot(&self, portfolio: &Portfolio) -> Vec<Position> {
        portfolio
            .positions
            .iter()
            .filter(|p| p.symbol == self.symbol)
            .cloned()
            .collect()
    }

    /// Phase 3: strategy-requested exits, applied in descending index
    /// order so earlier removals cannot invalidate later indices.
    pub(crate) fn apply_strategy_exits(
        &mut self,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<bool> {
        let snapshot = self.position_snapshot(portfolio);
        if snapshot.is_empty() {
            return Ok(false);
        }
        let index_map = self.symbol_position_indices(portfolio);

        let mut exits = strategy
            .check_exits(bar, &snapshot)
            .map_err(|e| BacktestError::strategy(bar.timestamp, e))?;
        if exits.is_empty() {
            return Ok(false);
        }
        exits.sort_by(|a, b| b.index.cmp(&a.index));
        exits.dedup_by_key(|e| e.index);

        for exit in exits {
            let portfolio_index =
                *index_map
                    .get(exit.index)
                    .ok_or(BacktestError::UnknownPosition {
                        index: exit.index,
                        count: index_map.len(),
                    })?;
            let (fill, trade) = match exit.fraction {
                Some(fraction) if fraction < 1.0 => portfolio.partial_close_position(
                    portfolio_index,
                    bar.timestamp,
                    fraction,
                    exit.price,
                    exit.reason,
                    &self.execution,
                ),
                _ => portfolio.close_position(
                    portfolio_index,
                    bar.timestamp,
                    exit.price,
                    exit.reason,
                    &self.execution,
                    false,
                ),
            };
            events.emit(&EngineEvent::Exit {
                fill: fill.clone(),
                trade: trade.clone(),
            });
            let followup = strategy
                .on_exit(&fill, &trade)
                .map_err(|e| BacktestError::strategy(bar.timestamp, e))?;
            if let Some(next) = followup {
                self.queue_order(next, bar.timestamp, portfolio, events);
            }
        }
        Ok(true)
    }

    /// Phase 4: `on_bar` with the prior-bars indicator snapshot; queue
    /// everything it returns.
    fn collect_signals(
        &mut self,
        bar: &Bar,
        portfolio: &mut Portfolio,
        events: &mut EventHub,
        strategy: &mut dyn Strategy,
    ) -> Result<()> {
        let snapshot = self.indicators.values();
        let positions = self.position_snapshot(portfolio);
        let orders = strategy
            .on_bar(bar, &snapshot, &positions)
            .map_err(|e| BacktestError::strategy(bar.timestamp, e))?;
        for order in orders {
            self.queue_order(order, bar.timestamp, portfolio, events);
        }
        Ok(())
    }

    /// Queue an order returned by any callback: market orders replace the
    /// slot (last wins), limit/stop orders append, the cancel sentinel (or
    /// flag) clears the limit queue. Opposite-side orders are dropped under
    /// `same_direction_only`.
    pub(crate) fn queue_order(
        &mut self,
        order: Order,
        timestamp: i64,
        portfolio: &Portfolio,
        events: &mut EventHub,
    ) {
        // Every emitted order is observable, including ones dropped below
        events.emit(&EngineEvent::Signal {
            timestamp,
            order: order.clone(),
        });

        if matches!(order, Order::CancelPendingLimits) {
            self.pending_limits.clear();
            return;
        }

        if let Some(side) = order.side() {
            let symbol = match &order {
                Order::Market(o) => self.order_symbol(&o.symbol),
                Order::Limit(o) => self.order_symbol(&o.symbol),
                Order::Stop(o) => self.order_symbol(&o.symbol),
                Order::CancelPendingLimits => unreachable!(),
            };
            if self.config.same_direction_only
                && portfolio
                    .positions
                    .iter()
                    .any(|p| p.symbol == symbol && p.side != side)
            {
                debug!(symbol, %side, "dropping opposite-side order");
                return;
            }
        }

        match order {
            Order::Market(o) => {
                if o.cancel_pending_limits {
                    self.pending_limits.clear();
                }
                self.pending_market = Some(o);
            }
            Order::Limit(o) => {
                if o.cancel_pending_limits {
                    self.pending_limits.clear();
                }
                self.pending_limits.push(Pending::new(o));
            }
            Order::Stop(o) => {
                if o.cancel_pending_limits {
                    self.pending_limits.clear();
                }
                self.pending_stops.push(Pending::new(o));
            }
            Order::CancelPendingLimits => unreachable!(),
        }
    }
}

/// The phase-2 priority ladder for one position on one bar.
///
/// Extremes are folded in first; breakeven activation applies from the next
/// stop check, while a trailing tighten re-checks within the same bar.
fn evaluate_position_exit(position: &mut Position, bar: &Bar) -> Option<ExitAction> {
    position.update_extremes(bar.high, bar.low);
    match position.side {
        Side::Long => evaluate_long_exit(position, bar),
        Side::Short => evaluate_short_exit(position, bar),
    }
}

fn evaluate_long_exit(position: &mut Position, bar: &Bar) -> Option<ExitAction> {
    // Gap-through stop
    if let Some(sl) = position.stop_loss
        && bar.open <= sl
    {
        return Some(ExitAction::Full {
            raw_price: bar.open,
            reason: position.stop_kind.gap_reason(),
        });
    }
    // Gap-through take-profit (partial TP does not apply to gaps)
    if let Some(tp) = position.take_profit
        && bar.open >= tp
    {
        return Some(ExitAction::Full {
            raw_price: bar.open,
            reason: ExitReason::TakeProfitGap,
        });
    }
    // Intra-bar stop
    if let Some(sl) = position.stop_loss
        && bar.low <= sl
    {
        return Some(ExitAction::Full {
            raw_price: sl,
            reason: position.stop_kind.reason(),
        });
    }

    // Breakeven activation: sticky, effective from the next stop check
    if let Some(trigger) = position.be_trigger_pct
        && !position.be_activated
        && position.position_high >= position.entry_price * (1.0 + trigger)
    {
        let lock = position.entry_price * (1.0 + position.be_lock_pct.unwrap_or(0.0));
        if position.stop_loss.is_none_or(|sl| lock > sl) {
            position.stop_loss = Some(lock);
            position.stop_kind = crate::position::StopKind::Breakeven;
        }
        position.be_activated = true;
    }

    // Trailing update, with a same-bar re-check when the stop tightens
    if let Some(trail) = position.trail_pct {
        if !position.trail_activated {
            let activation = position.trail_activation_pct.unwrap_or(0.0);
            if position.position_high >= position.entry_price * (1.0 + activation) {
                position.trail_activated = true;
            }
        }
        if position.trail_activated {
            let trail_sl = position.position_high * (1.0 - trail);
            if position.stop_loss.is_none_or(|sl| trail_sl > sl) {
                position.stop_loss = Some(trail_sl);
                position.stop_kind = crate::position::StopKind::Trailing;
                if bar.low <= trail_sl {
                    return Some(ExitAction::Full {
                        raw_price: trail_sl,
                        reason: ExitReason::TrailingStop,
                    });
                }
            }
        }
    }

    // Intra-bar take-profit
    if let Some(tp) = position.take_profit
        && bar.high >= tp
    {
        if let Some(fraction) = position.partial_tp_pct
            && !position.partial_tp_done
        {
            return Some(ExitAction::Partial {
                raw_price: tp,
                reason: ExitReason::PartialTp,
                fraction,
            });
        }
        return Some(ExitAction::Full {
            raw_price: tp,
            reason: ExitReason::TakeProfit,
        });
    }
    None
}

fn evaluate_short_exit(position: &mut Position, bar: &Bar) -> Option<ExitAction> {
    if let Some(sl) = position.stop_loss
        && bar.open >= sl
    {
        return Some(ExitAction::Full {
            raw_price: bar.open,
            reason: position.stop_kind.gap_reason(),
        });
    }
    if let Some(tp) = position.take_profit
        && bar.open <= tp
    {
        return Some(ExitAction::Full {
            raw_price: bar.open,
            reason: ExitReason::TakeProfitGap,
        });
    }
    if let Some(sl) = position.stop_loss
        && bar.high >= sl
    {
        return Some(ExitAction::Full {
            raw_price: sl,
            reason: position.stop_kind.reason(),
        });
    }

    if let Some(trigger) = position.be_trigger_pct
        && !position.be_activated
        && position.position_low <= position.entry_price * (1.0 - trigger)
    {
        let lock = position.entry_price * (1.0 - position.be_lock_pct.unwrap_or(0.0));
        if position.stop_loss.is_none_or(|sl| lock < sl) {
            position.stop_loss = Some(lock);
            position.stop_kind = crate::position::StopKind::Breakeven;
        }
        position.be_activated = true;
    }

    if let Some(trail) = position.trail_pct {
        if !position.trail_activated {
            let activation = position.trail_activation_pct.unwrap_or(0.0);
            if position.position_low <= position.entry_price * (1.0 - activation) {
                position.trail_activated = true;
            }
        }
        if position.trail_activated {
            let trail_sl = position.position_low * (1.0 + trail);
            if position.stop_loss.is_none_or(|sl| trail_sl < sl) {
                position.stop_loss = Some(trail_sl);
                position.stop_kind = crate::position::StopKind::Trailing;
                if bar.high >= trail_sl {
                    return Some(ExitAction::Full {
                        raw_price: trail_sl,
                        reason: ExitReason::TrailingStop,
                    });
                }
            }
        }
    }

    if let Some(tp) = position.take_profit
        && bar.low <= tp
    {
        if let Some(fraction) = position.partial_tp_pct
            && !position.partial_tp_done
        {
            return Some(ExitAction::Partial {
                raw_price: tp,
                reason: ExitReason::PartialTp,
                fraction,
            });
        }
        return Some(ExitAction::Full {
            raw_price: tp,
            reason: ExitReason::TakeProfit,
        });
    }
    None
}

/// Single-symbol engine: owns the portfolio, strategy, event hub, and bar
/// validator, and drives the per-bar state machine over a [`BarSource`].
///
/// # Example
///
/// ```
/// use barsim::config::EngineConfig;
/// use barsim::data::VecSource;
/// use barsim::engine::Engine;
/// use barsim::strategy::SmaCross;
/// use barsim::models::Bar;
///
/// let bars: Vec<Bar> = (0..120)
///     .map(|i| {
///         let p = 100.0 + (i as f64 / 10.0).sin();
///         Bar::new_1m("BTC/USD", i * 60, p, p + 0.1, p - 0.1, p, 1.0)
///     })
///     .collect();
///
/// let mut engine = Engine::new(EngineConfig::default(), SmaCross::new(5, 20)).unwrap();
/// let result = engine.run(&mut VecSource::new(bars)).unwrap();
/// assert_eq!(result.initial_equity, 10_000.0);
/// ```
pub struct Engine {
    inner: SymbolEngine,
    strategy: Box<dyn Strategy>,
    portfolio: Portfolio,
    events: EventHub,
    validator: Validator,
    first_close: Option<f64>,
    last_close: Option<f64>,
}

impl Engine {
    /// Build an engine from a validated config and a strategy.
    ///
    /// The strategy is configured here; its `required_indicators` merge
    /// into the config's indicator set (config entries win on name clash).
    pub fn new(config: EngineConfig, strategy: impl Strategy + 'static) -> Result<Self> {
        Self::with_boxed(config, Box::new(strategy))
    }

    /// Boxed-strategy variant of [`Engine::new`].
    pub fn with_boxed(mut config: EngineConfig, mut strategy: Box<dyn Strategy>) -> Result<Self> {
        config.validate()?;
        strategy.configure(&config)?;
        for (name, spec) in strategy.required_indicators() {
            config.indicators.entry(name).or_insert(spec);
        }

        let portfolio = Portfolio::new(
            config.initial_equity,
            config.max_positions,
            config.default_size_usd,
        );
        let validator = Validator::new(config.validation);
        let inner = SymbolEngine::new(String::new(), config)?;

        Ok(Self {
            inner,
            strategy,
            portfolio,
            events: EventHub::new(),
            validator,
            first_close: None,
            last_close: None,
        })
    }

    /// Install a position sizer on the portfolio.
    pub fn with_sizer(mut self, sizer: Box<dyn crate::sizing::PositionSizer>) -> Self {
        self.portfolio.set_sizer(sizer);
        self
    }

    /// Subscribe a listener; see [`EventHub::subscribe`].
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

    /// The portfolio's current state.
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Process one bar through all four phases.
    pub fn process_bar(&mut self, bar: &Bar) -> Result<()> {
        if self.first_close.is_none() {
            self.first_close = Some(bar.close);
        }
        self.last_close = Some(bar.close);
        self.inner
            .process_bar(bar, &mut self.portfolio, &mut self.events, &mut self.strategy)?;
        Ok(())
    }

    /// Drain `source` through the engine and build the result.
    pub fn run(&mut self, source: &mut dyn BarSource) -> Result<BacktestResult> {
        if self.inner.symbol.is_empty() {
            self.inner.symbol = source.symbol().to_string();
        }
        while let Some(bar) = source.next_bar() {
            if !self.validator.check(&bar)? {
                continue;
            }
            self.process_bar(&bar)?;
        }
        Ok(self.result())
    }

    /// Build a result from the current portfolio state.
    pub fn result(&self) -> BacktestResult {
        let summary = Summary::calculate(
            &self.portfolio.trades,
            &self.portfolio.equity_curve,
            self.portfolio.initial_equity,
            self.portfolio.equity,
            self.portfolio.total_fees,
            self.first_close,
            self.last_close,
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

    /// Rewind the engine for a fresh run: portfolio, queues, indicators,
    /// and validator all return to their initial state.
    pub fn reset(&mut self) -> Result<()> {
        self.portfolio.reset();
        self.inner.reset()?;
        self.validator.reset();
        self.first_close = None;
        self.last_close = None;
        Ok(())
    }
}
