//! Routing of 1-minute bars to indicators across timeframes.

use std::collections::BTreeMap;

use crate::models::{Bar, Timeframe};
use crate::resample::Resampler;

use super::{Indicator, IndicatorSpec, IndicatorValue, Result};

/// Owns every configured indicator and one resampler per non-1m timeframe,
/// and routes each incoming 1-minute bar to them.
///
/// The snapshot returned by [`values`](IndicatorManager::values) is a pure
/// function of the bars pushed so far: the engine updates the manager only
/// *after* the strategy has seen the current bar, so values observed on bar
/// `T` derive from bars `[0..T-1]` (or closed higher-TF buckets ending at or
/// before `T`'s open).
pub struct IndicatorManager {
    specs: BTreeMap<String, IndicatorSpec>,
    entries: BTreeMap<String, Entry>,
    resamplers: BTreeMap<Timeframe, Resampler>,
}

struct Entry {
    indicator: Box<dyn Indicator>,
    timeframe: Timeframe,
}

impl IndicatorManager {
    /// Build all indicators named in `specs` plus the resamplers their
    /// timeframes require. Fails fast on any invalid spec.
    pub fn from_specs(specs: &BTreeMap<String, IndicatorSpec>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut resamplers = BTreeMap::new();

        for (name, spec) in specs {
            let timeframe = spec.timeframe();
            entries.insert(
                name.clone(),
                Entry {
                    indicator: spec.build()?,
                    timeframe,
                },
            );
            if timeframe != Timeframe::M1 {
                resamplers
                    .entry(timeframe)
                    .or_insert_with(|| Resampler::new(timeframe));
            }
        }

        Ok(Self {
            specs: specs.clone(),
            entries,
            resamplers,
        })
    }

    /// Whether any indicators are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Route a 1-minute bar: 1m indicators first, then each resampler; any
    /// closed higher-TF bar is forwarded to that timeframe's indicators.
    pub fn update(&mut self, bar: &Bar) {
        for entry in self.entries.values_mut() {
            if entry.timeframe == Timeframe::M1 {
                entry.indicator.update(bar);
            }
        }

        for resampler in self.resamplers.values_mut() {
            if let Some(closed) = resampler.push(bar) {
                let timeframe = resampler.timeframe();
                for entry in self.entries.values_mut() {
                    if entry.timeframe == timeframe {
                        entry.indicator.update(&closed);
                    }
                }
            }
        }
    }

    /// Current value of every configured indicator, `None` while warming up.
    pub fn values(&self) -> BTreeMap<String, Option<IndicatorValue>> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.indicator.value()))
            .collect()
    }

    /// Rebuild all indicators and resamplers from the original specs,
    /// discarding accumulated state.
    pub fn reset(&mut self) -> Result<()> {
        let fresh = Self::from_specs(&self.specs)?;
        self.entries = fresh.entries;
        self.resamplers = fresh.resamplers;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::PriceSource;

    fn flat_bar(ts: i64, price: f64) -> Bar {
        Bar::new_1m("BTC/USD", ts, price, price, price, price, 1.0)
    }

    fn sma_spec(period: usize, timeframe: Timeframe) -> IndicatorSpec {
        IndicatorSpec::Sma {
            period,
            source: PriceSource::Close,
            timeframe,
        }
    }

    #[test]
    fn test_one_minute_indicator_updates_every_bar() {
        let mut specs = BTreeMap::new();
        specs.insert("sma_2".to_string(), sma_spec(2, Timeframe::M1));
        let mut mgr = IndicatorManager::from_specs(&specs).unwrap();

        mgr.update(&flat_bar(0, 10.0));
        assert_eq!(mgr.values()["sma_2"], None);
        mgr.update(&flat_bar(60, 12.0));
        assert_eq!(
            mgr.values()["sma_2"],
            Some(IndicatorValue::Scalar(11.0))
        );
    }

    #[test]
    fn test_higher_tf_indicator_sees_only_closed_buckets() {
        let mut specs = BTreeMap::new();
        specs.insert("sma_15m".to_string(), sma_spec(1, Timeframe::M15));
        let mut mgr = IndicatorManager::from_specs(&specs).unwrap();

        let base = 1_704_067_200i64;
        // 15 bars fill the first bucket but do not close it
        for i in 0..15 {
            mgr.update(&flat_bar(base + i * 60, 100.0 + i as f64));
            assert_eq!(mgr.values()["sma_15m"], None, "bucket not closed at bar {i}");
        }
        // Bar 15 starts the second bucket, closing the first (close = 114)
        mgr.update(&flat_bar(base + 15 * 60, 200.0));
        assert_eq!(
            mgr.values()["sma_15m"],
            Some(IndicatorValue::Scalar(114.0))
        );

        // Bars 16..29 accumulate in the still-open second bucket; the
        // visible value does not move
        for i in 16..30 {
            mgr.update(&flat_bar(base + i * 60, 300.0));
            assert_eq!(
                mgr.values()["sma_15m"],
                Some(IndicatorValue::Scalar(114.0)),
                "in-progress bucket leaked at bar {i}"
            );
        }
    }

    #[test]
    fn test_mixed_timeframes_share_the_stream() {
        let mut specs = BTreeMap::new();
        specs.insert("fast".to_string(), sma_spec(1, Timeframe::M1));
        specs.insert("slow".to_string(), sma_spec(1, Timeframe::M5));
        let mut mgr = IndicatorManager::from_specs(&specs).unwrap();

        let base = 1_704_067_200i64;
        for i in 0..6 {
            mgr.update(&flat_bar(base + i * 60, i as f64));
        }
        let values = mgr.values();
        assert_eq!(values["fast"], Some(IndicatorValue::Scalar(5.0)));
        // First 5m bucket closed with close = 4
        assert_eq!(values["slow"], Some(IndicatorValue::Scalar(4.0)));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut specs = BTreeMap::new();
        specs.insert("sma_2".to_string(), sma_spec(2, Timeframe::M1));
        let mut mgr = IndicatorManager::from_specs(&specs).unwrap();

        mgr.update(&flat_bar(0, 10.0));
        mgr.update(&flat_bar(60, 12.0));
        assert!(mgr.values()["sma_2"].is_some());

        mgr.reset().unwrap();
        assert_eq!(mgr.values()["sma_2"], None);
    }
}
