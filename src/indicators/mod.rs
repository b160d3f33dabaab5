//! Streaming technical indicators.
//!
//! Every indicator is a stateful operator: it consumes completed bars of a
//! single timeframe in chronological order through [`Indicator::update`],
//! and after each update [`Indicator::value`] is either `None` (warmup
//! incomplete) or a concrete output.
//!
//! # Available Indicators
//!
//! ## Moving Averages
//! - [`Sma`] - Simple Moving Average
//! - [`Ema`] - Exponential Moving Average
//!
//! ## Momentum Oscillators
//! - [`Rsi`] - Relative Strength Index
//! - [`Stochastic`] - Stochastic Oscillator
//!
//! ## Trend Indicators
//! - [`Macd`] - Moving Average Convergence Divergence
//!
//! ## Volatility Indicators
//! - [`Bollinger`] - Bollinger Bands
//! - [`Atr`] - Average True Range
//! - [`Chop`] - ATR as a fraction of price
//!
//! ## Volume Indicators
//! - [`Vwap`] - Volume Weighted Average Price (resets at midnight UTC)
//! - [`Obv`] - On-Balance Volume
//!
//! # Example
//!
//! ```
//! use barsim::indicators::{Indicator, Sma};
//! use barsim::models::Bar;
//!
//! let mut sma = Sma::new(3).unwrap();
//! for (i, close) in [10.0, 11.0, 12.0].iter().enumerate() {
//!     let bar = Bar::new_1m("BTC/USD", i as i64 * 60, *close, *close, *close, *close, 1.0);
//!     sma.update(&bar);
//! }
//! assert_eq!(sma.value().unwrap().as_scalar(), Some(11.0));
//! ```

mod atr;
mod bollinger;
mod chop;
mod ema;
mod macd;
pub(crate) mod manager;
mod obv;
mod rsi;
mod sma;
mod stochastic;
mod vwap;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Bar, Timeframe};

pub use atr::{Atr, AtrSmoothing};
pub use bollinger::Bollinger;
pub use chop::Chop;
pub use ema::Ema;
pub use macd::Macd;
pub use manager::IndicatorManager;
pub use obv::Obv;
pub use rsi::{Rsi, RsiSmoothing};
pub use sma::Sma;
pub use stochastic::Stochastic;
pub use vwap::Vwap;

/// Error type for indicator construction and configuration
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IndicatorError {
    /// Invalid period parameter provided
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Invalid non-period parameter provided
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Parameter name
        param: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type for indicator operations
pub type Result<T> = std::result::Result<T, IndicatorError>;

/// Which bar field an indicator reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// Bar open
    Open,
    /// Bar high
    High,
    /// Bar low
    Low,
    /// Bar close (the default)
    #[default]
    Close,
}

impl PriceSource {
    /// Extract the selected field from a bar
    pub fn apply(&self, bar: &Bar) -> f64 {
        match self {
            PriceSource::Open => bar.open,
            PriceSource::High => bar.high,
            PriceSource::Low => bar.low,
            PriceSource::Close => bar.close,
        }
    }
}

/// Output of an indicator after warmup.
///
/// Simple indicators produce a scalar; Bollinger, MACD, and Stochastic
/// produce a record of named components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    /// Single number (SMA, EMA, RSI, ATR, CHOP, VWAP, OBV)
    Scalar(f64),
    /// Named components (Bollinger, MACD, Stochastic)
    Record(BTreeMap<String, f64>),
}

impl IndicatorValue {
    /// Build a record value from name/value pairs
    pub fn record<const N: usize>(fields: [(&str, f64); N]) -> Self {
        IndicatorValue::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// The scalar value, if this is a scalar
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            IndicatorValue::Scalar(v) => Some(*v),
            IndicatorValue::Record(_) => None,
        }
    }

    /// A named component, if this is a record
    pub fn field(&self, name: &str) -> Option<f64> {
        match self {
            IndicatorValue::Scalar(_) => None,
            IndicatorValue::Record(map) => map.get(name).copied(),
        }
    }
}

/// A stateful streaming indicator.
///
/// Implementations receive completed bars of one timeframe in chronological
/// order and expose their current output, or `None` while warming up.
pub trait Indicator: Send {
    /// Consume the next completed bar of this indicator's timeframe
    fn update(&mut self, bar: &Bar);

    /// Current output, or `None` during warmup
    fn value(&self) -> Option<IndicatorValue>;
}

fn default_num_std() -> f64 {
    2.0
}

fn default_smooth() -> usize {
    3
}

/// Declarative indicator configuration.
///
/// Deserializes from strategy/engine config; [`IndicatorSpec::build`]
/// constructs the matching streaming operator. Unknown kinds fail at
/// deserialization time, invalid parameters at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorSpec {
    /// Simple Moving Average
    Sma {
        /// Window length
        period: usize,
        /// Bar field to read
        #[serde(default)]
        source: PriceSource,
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// Exponential Moving Average
    Ema {
        /// Window length
        period: usize,
        /// Bar field to read
        #[serde(default)]
        source: PriceSource,
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// Relative Strength Index
    Rsi {
        /// Lookback length
        period: usize,
        /// Wilder (default) or simple averaging
        #[serde(default)]
        smoothing: RsiSmoothing,
        /// Bar field to read
        #[serde(default)]
        source: PriceSource,
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// Average True Range
    Atr {
        /// Lookback length
        period: usize,
        /// Wilder (default) or SMA smoothing
        #[serde(default)]
        smoothing: AtrSmoothing,
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// ATR divided by close (volatility as a fraction of price)
    Chop {
        /// ATR lookback length
        period: usize,
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// Bollinger Bands
    Bollinger {
        /// SMA window length
        period: usize,
        /// Standard-deviation multiplier (default 2.0)
        #[serde(default = "default_num_std")]
        num_std: f64,
        /// Bar field to read
        #[serde(default)]
        source: PriceSource,
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// Moving Average Convergence Divergence
    Macd {
        /// Fast EMA period
        fast: usize,
        /// Slow EMA period
        slow: usize,
        /// Signal EMA period
        signal: usize,
        /// Bar field to read
        #[serde(default)]
        source: PriceSource,
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// Stochastic Oscillator
    Stochastic {
        /// %K lookback length
        k_period: usize,
        /// %K smoothing window (default 3)
        #[serde(default = "default_smooth")]
        smooth_k: usize,
        /// %D window (default 3)
        #[serde(default = "default_smooth")]
        d_period: usize,
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// Volume Weighted Average Price, reset at midnight UTC
    Vwap {
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
    /// On-Balance Volume
    Obv {
        /// Timeframe the indicator runs on
        #[serde(default)]
        timeframe: Timeframe,
    },
}

impl IndicatorSpec {
    /// Config names of every supported indicator kind, matching the
    /// `kind` tags this enum deserializes from.
    pub const KINDS: [&'static str; 10] = [
        "sma",
        "ema",
        "rsi",
        "atr",
        "chop",
        "bollinger",
        "macd",
        "stochastic",
        "vwap",
        "obv",
    ];

    /// Timeframe this indicator consumes
    pub fn timeframe(&self) -> Timeframe {
        match self {
            IndicatorSpec::Sma { timeframe, .. }
            | IndicatorSpec::Ema { timeframe, .. }
            | IndicatorSpec::Rsi { timeframe, .. }
            | IndicatorSpec::Atr { timeframe, .. }
            | IndicatorSpec::Chop { timeframe, .. }
            | IndicatorSpec::Bollinger { timeframe, .. }
            | IndicatorSpec::Macd { timeframe, .. }
            | IndicatorSpec::Stochastic { timeframe, .. }
            | IndicatorSpec::Vwap { timeframe }
            | IndicatorSpec::Obv { timeframe } => *timeframe,
        }
    }

    /// Construct the streaming operator described by this spec
    pub fn build(&self) -> Result<Box<dyn Indicator>> {
        Ok(match *self {
            IndicatorSpec::Sma { period, source, .. } => {
                Box::new(Sma::new(period)?.with_source(source))
            }
            IndicatorSpec::Ema { period, source, .. } => {
                Box::new(Ema::new(period)?.with_source(source))
            }
            IndicatorSpec::Rsi {
                period,
                smoothing,
                source,
                ..
            } => Box::new(Rsi::new(period, smoothing)?.with_source(source)),
            IndicatorSpec::Atr {
                period, smoothing, ..
            } => Box::new(Atr::new(period, smoothing)?),
            IndicatorSpec::Chop { period, .. } => Box::new(Chop::new(period)?),
            IndicatorSpec::Bollinger {
                period,
                num_std,
                source,
                ..
            } => Box::new(Bollinger::new(period, num_std)?.with_source(source)),
            IndicatorSpec::Macd {
                fast,
                slow,
                signal,
                source,
                ..
            } => Box::new(Macd::new(fast, slow, signal)?.with_source(source)),
            IndicatorSpec::Stochastic {
                k_period,
                smooth_k,
                d_period,
                ..
            } => Box::new(Stochastic::new(k_period, smooth_k, d_period)?),
            IndicatorSpec::Vwap { .. } => Box::new(Vwap::new()),
            IndicatorSpec::Obv { .. } => Box::new(Obv::new()),
        })
    }
}
