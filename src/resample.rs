//! Folding a 1-minute stream into higher-timeframe bars.

use crate::models::{Bar, Timeframe};

/// Accumulates 1-minute bars into epoch-aligned buckets of one higher
/// timeframe.
///
/// A bucket is closed (and its bar emitted) when a 1m bar arrives whose
/// timestamp falls into a different bucket. The in-progress bucket is never
/// visible to consumers, so indicators only ever see completed bars.
#[derive(Debug, Clone)]
pub struct Resampler {
    timeframe: Timeframe,
    current: Option<Bucket>,
}

#[derive(Debug, Clone)]
struct Bucket {
    start: i64,
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bucket {
    fn from_bar(start: i64, bar: &Bar) -> Self {
        Self {
            start,
            symbol: bar.symbol.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }

    fn fold(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume += bar.volume;
    }

    fn into_bar(self, timeframe: Timeframe) -> Bar {
        Bar {
            timestamp: self.start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            symbol: self.symbol,
            timeframe,
        }
    }
}

impl Resampler {
    /// Create a resampler producing `timeframe` bars.
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            current: None,
        }
    }

    /// The timeframe this resampler produces.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Push a 1-minute bar; returns the completed higher-TF bar when the
    /// arriving bar starts a new bucket.
    pub fn push(&mut self, bar: &Bar) -> Option<Bar> {
        let bucket_start = self.timeframe.bucket_start(bar.timestamp);

        match self.current.as_mut() {
            Some(bucket) if bucket.start == bucket_start => {
                bucket.fold(bar);
                None
            }
            Some(_) => {
                // unwrap is safe: matched Some above
                let finished = self.current.take().unwrap();
                self.current = Some(Bucket::from_bar(bucket_start, bar));
                Some(finished.into_bar(self.timeframe))
            }
            None => {
                self.current = Some(Bucket::from_bar(bucket_start, bar));
                None
            }
        }
    }

    /// Drop the in-progress bucket (used when rewinding a run).
    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_1m(ts: i64, price: f64, volume: f64) -> Bar {
        Bar::new_1m("BTC/USD", ts, price, price + 1.0, price - 1.0, price, volume)
    }

    #[test]
    fn test_emits_on_boundary_crossing() {
        let mut rs = Resampler::new(Timeframe::M5);
        let base = 1_704_067_200i64; // 2024-01-01 00:00 UTC

        for i in 0..5 {
            assert!(rs.push(&bar_1m(base + i * 60, 100.0 + i as f64, 10.0)).is_none());
        }
        // Minute 5 starts the next bucket and closes the first
        let closed = rs.push(&bar_1m(base + 5 * 60, 200.0, 10.0)).unwrap();
        assert_eq!(closed.timestamp, base);
        assert_eq!(closed.open, 100.0);
        assert_eq!(closed.close, 104.0);
        assert_eq!(closed.high, 105.0);
        assert_eq!(closed.low, 99.0);
        assert_eq!(closed.volume, 50.0);
        assert_eq!(closed.timeframe, Timeframe::M5);
    }

    #[test]
    fn test_incomplete_bucket_never_emitted() {
        let mut rs = Resampler::new(Timeframe::M15);
        let base = 1_704_067_200i64;
        for i in 0..14 {
            assert!(rs.push(&bar_1m(base + i * 60, 100.0, 1.0)).is_none());
        }
    }

    #[test]
    fn test_sparse_stream_closes_partial_bucket() {
        // A gap in the 1m stream still closes the old bucket at the boundary
        let mut rs = Resampler::new(Timeframe::M5);
        let base = 1_704_067_200i64;
        for i in 0..4 {
            rs.push(&bar_1m(base + i * 60, 100.0, 1.0));
        }
        // Jump straight to minute 10
        let closed = rs.push(&bar_1m(base + 10 * 60, 100.0, 1.0)).unwrap();
        assert_eq!(closed.timestamp, base);
        assert_eq!(closed.volume, 4.0);
    }

    #[test]
    fn test_bucket_timestamp_is_aligned_regardless_of_start() {
        // Starting mid-bucket: the bucket's timestamp is still the aligned start
        let mut rs = Resampler::new(Timeframe::M15);
        let base = 1_704_067_200i64;
        rs.push(&bar_1m(base + 7 * 60, 100.0, 1.0));
        let closed = rs.push(&bar_1m(base + 15 * 60, 100.0, 1.0)).unwrap();
        assert_eq!(closed.timestamp, base);
    }

    #[test]
    fn test_fifteen_minute_scenario() {
        // Eighteen 1m bars with o=h=l=c=i: after minute 15 the first 15m bar
        // is [10:00, 10:15) with o=0, h=14, l=0, c=14, v=15.
        let mut rs = Resampler::new(Timeframe::M15);
        let ten_am = 1_704_103_200i64; // 2024-01-01 10:00 UTC

        let mut completed = Vec::new();
        for i in 0..18i64 {
            let p = i as f64;
            let bar = Bar::new_1m("BTC/USD", ten_am + i * 60, p, p, p, p, 1.0);
            if let Some(done) = rs.push(&bar) {
                completed.push(done);
            }
        }

        assert_eq!(completed.len(), 1);
        let first = &completed[0];
        assert_eq!(first.timestamp, ten_am);
        assert_eq!(first.open, 0.0);
        assert_eq!(first.high, 14.0);
        assert_eq!(first.low, 0.0);
        assert_eq!(first.close, 14.0);
        assert_eq!(first.volume, 15.0);
    }
}
