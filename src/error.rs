//! Error types for the simulator.

use thiserror::Error;

/// Errors produced by configuration, data validation, and the engine itself.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BacktestError {
    /// Invalid configuration parameter
    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Parameter name
        param: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Malformed bar rejected by the validation layer
    #[error("Invalid bar at {timestamp}: {reason}")]
    InvalidBar {
        /// Timestamp of the offending bar
        timestamp: i64,
        /// What was wrong with it
        reason: String,
    },

    /// Bar stream violated the non-decreasing timestamp contract
    #[error("Out-of-order bar: {got} arrived after {prev}")]
    OutOfOrderBar {
        /// Timestamp of the previously accepted bar
        prev: i64,
        /// Timestamp of the offending bar
        got: i64,
    },

    /// Indicator construction or calculation failed
    #[error("Indicator error: {0}")]
    Indicator(#[from] crate::indicators::IndicatorError),

    /// An indicator configuration named a kind the library does not provide
    #[error("Unknown indicator type: {0}")]
    UnknownIndicator(String),

    /// A strategy callback failed; the run is aborted and no partial
    /// results are returned
    #[error("Strategy failed at bar {timestamp}: {source}")]
    Strategy {
        /// Timestamp of the bar being processed when the callback failed
        timestamp: i64,
        /// The underlying failure
        source: anyhow::Error,
    },

    /// Unknown position index returned by `check_exits`
    #[error("Strategy exit references position index {index}, only {count} open")]
    UnknownPosition {
        /// Index the strategy asked for
        index: usize,
        /// Number of open positions at the time
        count: usize,
    },

    /// CSV decoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error while loading data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, BacktestError>;

impl BacktestError {
    /// Create an invalid parameter error
    pub fn invalid_param(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid bar error
    pub fn invalid_bar(timestamp: i64, reason: impl Into<String>) -> Self {
        Self::InvalidBar {
            timestamp,
            reason: reason.into(),
        }
    }

    /// Wrap a strategy callback failure with the bar timestamp it occurred on
    pub fn strategy(timestamp: i64, source: impl Into<anyhow::Error>) -> Self {
        Self::Strategy {
            timestamp,
            source: source.into(),
        }
    }
}
