//! Determinism and no-look-ahead guarantees.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use barsim::config::EngineConfig;
use barsim::data::{BarSource, VecSource};
use barsim::engine::Engine;
use barsim::error::Result;
use barsim::indicators::{IndicatorSpec, PriceSource};
use barsim::models::{Bar, Timeframe};
use barsim::orders::Order;
use barsim::position::Position;
use barsim::strategy::{IndicatorSnapshot, Strategy, snapshot_value};

fn synthetic_bars(count: i64) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let p = 100.0 + (i as f64 * 0.7).sin() * 3.0 + (i as f64 * 0.05).cos();
            Bar::new_1m("BTC/USD", 1_704_067_200 + i * 60, p, p + 0.4, p - 0.4, p + 0.1, 5.0)
        })
        .collect()
}

/// Records the SMA snapshot it observes on every bar and never trades.
struct SnapshotRecorder {
    seen: Arc<Mutex<Vec<(i64, Option<f64>)>>>,
}

impl Strategy for SnapshotRecorder {
    fn required_indicators(&self) -> BTreeMap<String, IndicatorSpec> {
        let mut specs = BTreeMap::new();
        specs.insert(
            "sma_3".to_string(),
            IndicatorSpec::Sma {
                period: 3,
                source: PriceSource::Close,
                timeframe: Timeframe::M1,
            },
        );
        specs
    }

    fn on_bar(
        &mut self,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
        _positions: &[Position],
    ) -> Result<Vec<Order>> {
        self.seen
            .lock()
            .unwrap()
            .push((bar.timestamp, snapshot_value(indicators, "sma_3")));
        Ok(vec![])
    }
}

#[test]
fn indicator_snapshot_excludes_the_current_bar() {
    let bars = synthetic_bars(10);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let strategy = SnapshotRecorder {
        seen: Arc::clone(&seen),
    };

    let mut engine = Engine::new(EngineConfig::default(), strategy).unwrap();
    engine.run(&mut VecSource::new(bars.clone())).unwrap();

    let seen = seen.lock().unwrap();
    for (i, (ts, value)) in seen.iter().enumerate() {
        assert_eq!(*ts, bars[i].timestamp);
        if i < 3 {
            // Fewer than `period` prior bars: still warming up
            assert!(value.is_none(), "look-ahead at bar {i}: {value:?}");
        } else {
            // Mean of the three closes strictly before bar i
            let expected = (bars[i - 3].close + bars[i - 2].close + bars[i - 1].close) / 3.0;
            let got = value.expect("sma should be ready");
            assert!(
                (got - expected).abs() < 1e-9,
                "bar {i}: snapshot {got} != prior-bars mean {expected}"
            );
        }
    }
}

#[test]
fn provider_reset_replays_byte_identically() {
    let bars = synthetic_bars(120);

    let run = |source: &mut VecSource| {
        let strategy = barsim::strategy::SmaCross::new(4, 12);
        let mut engine = Engine::new(EngineConfig::default(), strategy).unwrap();
        engine.run(source).unwrap()
    };

    let mut source = VecSource::new(bars);
    let first = run(&mut source);
    source.reset();
    let second = run(&mut source);

    assert_eq!(first.fills.len(), second.fills.len());
    for (a, b) in first.fills.iter().zip(&second.fills) {
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.price.to_bits(), b.price.to_bits());
        assert_eq!(a.size_usd.to_bits(), b.size_usd.to_bits());
    }
    assert_eq!(first.trades.len(), second.trades.len());
    for (a, b) in first.trades.iter().zip(&second.trades) {
        assert_eq!(a.pnl.to_bits(), b.pnl.to_bits());
    }
    assert_eq!(first.equity_curve.len(), second.equity_curve.len());
    for (a, b) in first.equity_curve.iter().zip(&second.equity_curve) {
        assert_eq!(a.equity.to_bits(), b.equity.to_bits());
    }
}

#[test]
fn higher_timeframe_values_lag_their_bucket() {
    // A 15m SMA(1) is the close of the last *completed* 15m bucket; while a
    // bucket is forming the visible value must not move.
    struct HigherTfProbe {
        seen: Arc<Mutex<Vec<(i64, Option<f64>)>>>,
    }

    impl Strategy for HigherTfProbe {
        fn required_indicators(&self) -> BTreeMap<String, IndicatorSpec> {
            let mut specs = BTreeMap::new();
            specs.insert(
                "sma_15m".to_string(),
                IndicatorSpec::Sma {
                    period: 1,
                    source: PriceSource::Close,
                    timeframe: Timeframe::M15,
                },
            );
            specs
        }

        fn on_bar(
            &mut self,
            bar: &Bar,
            indicators: &IndicatorSnapshot,
            _positions: &[Position],
        ) -> Result<Vec<Order>> {
            self.seen
                .lock()
                .unwrap()
                .push((bar.timestamp, snapshot_value(indicators, "sma_15m")));
            Ok(vec![])
        }
    }

    let base = 1_704_067_200i64; // aligned to a 15m boundary
    let bars: Vec<Bar> = (0..35)
        .map(|i| {
            let p = i as f64;
            Bar::new_1m("BTC/USD", base + i * 60, p, p, p, p, 1.0)
        })
        .collect();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let strategy = HigherTfProbe {
        seen: Arc::clone(&seen),
    };
    let mut engine = Engine::new(EngineConfig::default(), strategy).unwrap();
    engine.run(&mut VecSource::new(bars)).unwrap();

    let seen = seen.lock().unwrap();
    // Bars 0..=15 observe nothing: the first bucket closes when bar 15 is
    // consumed, and on_bar(15) runs before that update.
    for (i, (_, value)) in seen.iter().enumerate().take(16) {
        assert!(value.is_none(), "bar {i} saw {value:?}");
    }
    // Bars 16..=30 observe the first bucket's close (14); the second bucket
    // is still forming at bar 29 (minute 10:29)
    for (i, (_, value)) in seen.iter().enumerate().skip(16).take(15) {
        assert_eq!(*value, Some(14.0), "bar {i}");
    }
    // From bar 31 the second bucket [15, 30) is visible (close 29)
    for (i, (_, value)) in seen.iter().enumerate().skip(31) {
        assert_eq!(*value, Some(29.0), "bar {i}");
    }
}

#[test]
fn resampled_buckets_are_alignment_invariant() {
    // Folding the same minutes through resamplers starting at different
    // offsets produces identical buckets for the overlapping range.
    use barsim::resample::Resampler;

    let base = 1_704_067_200i64;
    let bars: Vec<Bar> = (0..60)
        .map(|i| {
            let p = 100.0 + (i as f64 * 0.3).sin();
            Bar::new_1m("BTC/USD", base + i * 60, p, p + 0.2, p - 0.2, p + 0.1, 1.0)
        })
        .collect();

    let collect = |skip: usize| {
        let mut rs = Resampler::new(Timeframe::M15);
        let mut out = Vec::new();
        for bar in bars.iter().skip(skip) {
            if let Some(done) = rs.push(bar) {
                out.push(done);
            }
        }
        out
    };

    let full = collect(0);
    let offset = collect(15); // start exactly one bucket later

    // Buckets after the first are identical between the two runs
    let full_tail: Vec<_> = full.iter().skip(1).collect();
    let offset_all: Vec<_> = offset.iter().collect();
    assert_eq!(full_tail.len(), offset_all.len());
    for (a, b) in full_tail.iter().zip(offset_all) {
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.open.to_bits(), b.open.to_bits());
        assert_eq!(a.high.to_bits(), b.high.to_bits());
        assert_eq!(a.low.to_bits(), b.low.to_bits());
        assert_eq!(a.close.to_bits(), b.close.to_bits());
        assert_eq!(a.volume.to_bits(), b.volume.to_bits());
    }
}
