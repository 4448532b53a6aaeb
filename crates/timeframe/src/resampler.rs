use confluence_core::{Candle, MarketError, MarketResult, Timeframe, Timestamp};
use tracing::debug;

/// Aggregates fine-grained candles into coarser epoch-aligned bars
///
/// Each source candle lands in the bucket covering its timestamp. A bar
/// opens at its first candle's open, closes at its last candle's close,
/// spans the extreme high and low, sums volume, and is stamped with the
/// bucket start. Buckets with no candles produce no bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeResampler {
    base: Timeframe,
}

impl TimeframeResampler {
    /// `base` is the width of the candles this resampler will be fed
    pub fn new(base: Timeframe) -> Self {
        Self { base }
    }

    pub fn base(&self) -> Timeframe {
        self.base
    }

    /// Resample time-ascending `candles` into `target` bars
    ///
    /// `target` must be a whole multiple of the base width, otherwise source
    /// candles would straddle bucket edges.
    pub fn resample(&self, candles: &[Candle], target: Timeframe) -> MarketResult<Vec<Candle>> {
        if !self.base.divides(target) {
            return Err(MarketError::invalid(format!(
                "cannot resample {} candles into {} bars",
                self.base, target
            )));
        }
        if target == self.base {
            check_ascending(candles)?;
            return Ok(candles.to_vec());
        }
        let bars = resample(candles, target)?;
        debug!(
            source = candles.len(),
            bars = bars.len(),
            from = %self.base,
            to = %target,
            "Resampled candles"
        );
        Ok(bars)
    }
}

/// Running aggregate for one bucket
struct Bucket {
    start: Timestamp,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bucket {
    fn open_with(start: Timestamp, c: &Candle) -> Self {
        Self {
            start,
            open: c.open(),
            high: c.high(),
            low: c.low(),
            close: c.close(),
            volume: c.volume(),
        }
    }

    fn absorb(&mut self, c: &Candle) {
        self.high = self.high.max(c.high());
        self.low = self.low.min(c.low());
        self.close = c.close();
        self.volume += c.volume();
    }

    fn finish(self) -> MarketResult<Candle> {
        Candle::new(
            self.start,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

/// Bucket `candles` into `target`-wide bars without checking the source width
pub fn resample(candles: &[Candle], target: Timeframe) -> MarketResult<Vec<Candle>> {
    check_ascending(candles)?;
    let mut bars = Vec::new();
    let mut current: Option<Bucket> = None;

    for candle in candles {
        let start = target.bucket_start(candle.timestamp());
        if let Some(bucket) = current.as_mut()
            && bucket.start == start
        {
            bucket.absorb(candle);
            continue;
        }
        if let Some(done) = current.replace(Bucket::open_with(start, candle)) {
            bars.push(done.finish()?);
        }
    }
    if let Some(done) = current {
        bars.push(done.finish()?);
    }
    Ok(bars)
}

fn check_ascending(candles: &[Candle]) -> MarketResult<()> {
    match candles
        .windows(2)
        .find(|w| w[1].timestamp() <= w[0].timestamp())
    {
        Some(w) => Err(MarketError::integrity(format!(
            "candles not time-ascending: {} follows {}",
            w[1].timestamp(),
            w[0].timestamp()
        ))),
        None => Ok(()),
    }
}
