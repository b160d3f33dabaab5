//! Engine configuration and builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::ValidationPolicy;
use crate::error::{BacktestError, Result};
use crate::execution::ExecutionModel;
use crate::indicators::IndicatorSpec;

fn default_initial_equity() -> f64 {
    10_000.0
}

fn default_size_usd() -> f64 {
    10_000.0
}

fn default_max_positions() -> usize {
    1
}

fn default_slippage() -> f64 {
    0.0002
}

fn default_taker_fee() -> f64 {
    0.00015
}

fn default_true() -> bool {
    true
}

/// Per-symbol overrides used by the multi-asset engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Override the default order size for this symbol
    #[serde(default)]
    pub default_size_usd: Option<f64>,
    /// Replace the indicator set for this symbol
    #[serde(default)]
    pub indicators: Option<BTreeMap<String, IndicatorSpec>>,
}

/// Configuration for a simulation run.
///
/// Use [`EngineConfig::builder`] for fluent construction with fail-fast
/// validation.
///
/// # Example
///
/// ```
/// use barsim::config::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .initial_equity(50_000.0)
///     .default_size_usd(5_000.0)
///     .max_positions(3)
///     .slippage(0.0005)
///     .build()
///     .unwrap();
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Starting equity in quote currency
    #[serde(default = "default_initial_equity")]
    pub initial_equity: f64,

    /// Size of orders that carry no explicit size, in quote units
    #[serde(default = "default_size_usd")]
    pub default_size_usd: f64,

    /// Maximum concurrent positions
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,

    /// Adverse slippage per side, as a fraction of price
    #[serde(default = "default_slippage")]
    pub slippage: f64,

    /// Taker fee per side, as a fraction of notional
    #[serde(default = "default_taker_fee")]
    pub taker_fee: f64,

    /// Maker fee per side, as a fraction of notional
    #[serde(default)]
    pub maker_fee: f64,

    /// Indicators computed by the engine, keyed by name
    #[serde(default)]
    pub indicators: BTreeMap<String, IndicatorSpec>,

    /// Skip the `on_bar` callback on bars where an exit fired
    #[serde(default = "default_true")]
    pub skip_signal_on_close: bool,

    /// Silently drop orders opposing an open same-symbol position
    #[serde(default = "default_true")]
    pub same_direction_only: bool,

    /// How malformed bars are handled
    #[serde(default)]
    pub validation: ValidationPolicy,

    /// Multi-asset only: cap on summed open position sizes
    #[serde(default)]
    pub max_total_exposure_usd: Option<f64>,

    /// Multi-asset only: per-symbol override map
    #[serde(default)]
    pub symbol_configs: BTreeMap<String, SymbolConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_equity: default_initial_equity(),
            default_size_usd: default_size_usd(),
            max_positions: default_max_positions(),
            slippage: default_slippage(),
            taker_fee: default_taker_fee(),
            maker_fee: 0.0,
            indicators: BTreeMap::new(),
            skip_signal_on_close: true,
            same_direction_only: true,
            validation: ValidationPolicy::default(),
            max_total_exposure_usd: None,
            symbol_configs: BTreeMap::new(),
        }
    }
}

/// Reject indicator entries whose `kind` is not one the library provides,
/// before serde turns them into an opaque parse error.
pub(crate) fn check_indicator_kinds(
    indicators: &serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    for (name, spec) in indicators {
        let kind = spec
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or("<missing>");
        if !IndicatorSpec::KINDS.contains(&kind) {
            return Err(BacktestError::UnknownIndicator(format!(
                "{kind} (indicator '{name}')"
            )));
        }
    }
    Ok(())
}

impl EngineConfig {
    /// Create a new builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Deserialize and validate a configuration from JSON.
    ///
    /// An indicator entry naming a kind the library does not provide fails
    /// with [`BacktestError::UnknownIndicator`] and a descriptive message
    /// rather than an opaque deserialization error.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| BacktestError::invalid_param("config", e.to_string()))?;
        if let Some(indicators) = value.get("indicators").and_then(|v| v.as_object()) {
            check_indicator_kinds(indicators)?;
        }
        if let Some(symbols) = value.get("symbol_configs").and_then(|v| v.as_object()) {
            for overrides in symbols.values() {
                if let Some(indicators) = overrides.get("indicators").and_then(|v| v.as_object()) {
                    check_indicator_kinds(indicators)?;
                }
            }
        }
        let config: EngineConfig = serde_json::from_value(value)
            .map_err(|e| BacktestError::invalid_param("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every parameter; called by the builder and by the engines
    /// at construction time.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_equity > 0.0 && self.initial_equity.is_finite()) {
            return Err(BacktestError::invalid_param(
                "initial_equity",
                "must be positive",
            ));
        }
        if !(self.default_size_usd > 0.0 && self.default_size_usd.is_finite()) {
            return Err(BacktestError::invalid_param(
                "default_size_usd",
                "must be positive",
            ));
        }
        if self.max_positions == 0 {
            return Err(BacktestError::invalid_param(
                "max_positions",
                "must be at least 1",
            ));
        }
        if !(0.0..1.0).contains(&self.slippage) {
            return Err(BacktestError::invalid_param(
                "slippage",
                "must be in [0.0, 1.0)",
            ));
        }
        if self.taker_fee < 0.0 || self.maker_fee < 0.0 {
            return Err(BacktestError::invalid_param(
                "taker_fee/maker_fee",
                "cannot be negative",
            ));
        }
        if let Some(cap) = self.max_total_exposure_usd
            && !(cap > 0.0 && cap.is_finite())
        {
            return Err(BacktestError::invalid_param(
                "max_total_exposure_usd",
                "must be positive when set",
            ));
        }
        // Indicator specs fail fast here rather than mid-run
        for (name, spec) in &self.indicators {
            spec.build().map_err(|e| {
                BacktestError::invalid_param(format!("indicators.{name}"), e.to_string())
            })?;
        }
        for (symbol, overrides) in &self.symbol_configs {
            if let Some(specs) = &overrides.indicators {
                for (name, spec) in specs {
                    spec.build().map_err(|e| {
                        BacktestError::invalid_param(
                            format!("symbol_configs.{symbol}.indicators.{name}"),
                            e.to_string(),
                        )
                    })?;
                }
            }
        }
        Ok(())
    }

    /// The execution model these parameters describe.
    pub fn execution_model(&self) -> ExecutionModel {
        ExecutionModel {
            slippage_pct: self.slippage,
            taker_fee_pct: self.taker_fee,
            maker_fee_pct: self.maker_fee,
        }
    }

    /// Resolve the effective config for one symbol by applying its
    /// overrides from `symbol_configs`.
    pub fn for_symbol(&self, symbol: &str) -> EngineConfig {
        let mut resolved = self.clone();
        if let Some(overrides) = self.symbol_configs.get(symbol) {
            if let Some(size) = overrides.default_size_usd {
                resolved.default_size_usd = size;
            }
            if let Some(indicators) = &overrides.indicators {
                resolved.indicators = indicators.clone();
            }
        }
        resolved
    }
}

/// Builder for [`EngineConfig`].
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set starting equity
    pub fn initial_equity(mut self, equity: f64) -> Self {
        self.config.initial_equity = equity;
        self
    }

    /// Set the default order size in quote units
    pub fn default_size_usd(mut self, size: f64) -> Self {
        self.config.default_size_usd = size;
        self
    }

    /// Set the maximum number of concurrent positions
    pub fn max_positions(mut self, max: usize) -> Self {
        self.config.max_positions = max;
        self
    }

    /// Set per-side slippage
    pub fn slippage(mut self, pct: f64) -> Self {
        self.config.slippage = pct;
        self
    }

    /// Set the taker fee
    pub fn taker_fee(mut self, pct: f64) -> Self {
        self.config.taker_fee = pct;
        self
    }

    /// Set the maker fee
    pub fn maker_fee(mut self, pct: f64) -> Self {
        self.config.maker_fee = pct;
        self
    }

    /// Add a named indicator
    pub fn indicator(mut self, name: impl Into<String>, spec: IndicatorSpec) -> Self {
        self.config.indicators.insert(name.into(), spec);
        self
    }

    /// Control the signal-skip gate on exit bars
    pub fn skip_signal_on_close(mut self, skip: bool) -> Self {
        self.config.skip_signal_on_close = skip;
        self
    }

    /// Control opposite-side order dropping
    pub fn same_direction_only(mut self, same: bool) -> Self {
        self.config.same_direction_only = same;
        self
    }

    /// Set the bar validation policy
    pub fn validation(mut self, policy: ValidationPolicy) -> Self {
        self.config.validation = policy;
        self
    }

    /// Cap summed open exposure (multi-asset)
    pub fn max_total_exposure_usd(mut self, cap: f64) -> Self {
        self.config.max_total_exposure_usd = Some(cap);
        self
    }

    /// Add per-symbol overrides (multi-asset)
    pub fn symbol_config(mut self, symbol: impl Into<String>, config: SymbolConfig) -> Self {
        self.config.symbol_configs.insert(symbol.into(), config);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
