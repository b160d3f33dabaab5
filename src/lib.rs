//! # barsim
//!
//! A deterministic, bias-free bar-replay simulator for trading strategies.
//!
//! Strategies consume a chronological stream of 1-minute OHLCV bars and
//! emit orders; the engine replays the stream through a strict 4-phase
//! state machine per bar (pending-order fills, exit evaluation with gap
//! protection, strategy exits, strategy signals) and produces fills,
//! trades, an equity curve, and aggregate statistics that model what the
//! strategy would have experienced live.
//!
//! ## Features
//!
//! - Market, limit, and stop orders with timeouts, maker fees, and
//!   position merging
//! - Breakeven, trailing-stop, and partial take-profit position lifecycle
//! - Streaming indicators across resampled timeframes, with a hard
//!   no-look-ahead guarantee
//! - Multi-asset runs over a shared portfolio with an exposure cap
//! - A `reset()`/`step(action)` facade for reinforcement-learning callers
//!
//! ## Quick Start
//!
//! ```
//! use barsim::config::EngineConfig;
//! use barsim::data::VecSource;
//! use barsim::engine::Engine;
//! use barsim::models::Bar;
//! use barsim::strategy::SmaCross;
//!
//! // A small synthetic 1-minute stream
//! let bars: Vec<Bar> = (0..180)
//!     .map(|i| {
//!         let p = 100.0 + (i as f64 / 15.0).sin() * 2.0;
//!         Bar::new_1m("BTC/USD", i * 60, p, p + 0.2, p - 0.2, p, 1.0)
//!     })
//!     .collect();
//!
//! let config = EngineConfig::builder()
//!     .initial_equity(10_000.0)
//!     .build()
//!     .unwrap();
//!
//! let mut engine = Engine::new(config, SmaCross::new(5, 20)).unwrap();
//! let result = engine.run(&mut VecSource::new(bars)).unwrap();
//! println!("net pnl: {:.2}", result.summary.net_pnl);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Engine configuration and builder
pub mod config;
/// Bar stream providers and validation
pub mod data;
/// The 4-phase execution engines (single, multi-asset, step)
pub mod engine;
/// Error types and result definitions
pub mod error;
/// Event listeners for observing a run
pub mod events;
/// Fill-price slippage and fee model
pub mod execution;
/// Streaming technical indicators and the indicator manager
pub mod indicators;
/// Core market-data value types
pub mod models;
/// Order types and pending-order queues
pub mod orders;
/// Portfolio state and accounting
pub mod portfolio;
/// Position, fill, and trade types
pub mod position;
/// Timeframe resampling
pub mod resample;
/// Run results and summary metrics
pub mod result;
/// Position sizing
pub mod sizing;
/// Strategy trait, declarative strategies, prebuilt strategies
pub mod strategy;

// Re-export main types
pub use config::EngineConfig;
pub use data::{BarSource, VecSource};
pub use engine::{Engine, MultiAssetEngine, StepEngine};
pub use error::{BacktestError, Result};
pub use models::{Bar, Timeframe};
pub use orders::{ExitReason, Order, Side};
pub use portfolio::Portfolio;
pub use position::{Fill, Position, Trade};
pub use result::BacktestResult;
pub use strategy::Strategy;
