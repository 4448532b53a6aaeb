use chrono::Duration as ChronoDuration;
use confluence_cache::{CacheEngine, CacheOptions};
use confluence_core::{
    Candle, IndicatorResult, MarketError, MarketResult, PriceSample, PriceSeries, Timeframe,
    Timestamp,
};
use confluence_indicators::{Indicator, IndicatorAlgorithm, IndicatorFactory, IndicatorKind};
use confluence_ports::{CancellationToken, Clock, ExchangeDataSource};
use confluence_timeframe::{AlignmentEngine, TimeframeAlignment, TimeframeResampler};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

use super::cached_source::CachedMarketData;
use super::diagnostics::MarketDataDiagnostics;
use crate::config::{CacheSettings, PlatformConfig};

/// Indicator values and multi-timeframe alignment on top of cached market data
///
/// Lookback windows end at the start of the current base-interval bar, so
/// repeat requests inside one bar resolve to the same raw-data cache keys.
///
/// Requests sharing a symbol, timeframe and lookback length form a lineage:
/// the same window, sliding forward as time passes. Derived results are
/// keyed by a fingerprint of their window's newest data point and tagged
/// with their lineage. When a lineage sees a newer point, or a changed close
/// at the same open time, its older results are dropped. Other lineages of
/// the symbol are left alone.
pub struct IndicatorService<S> {
    market: Arc<CachedMarketData<S>>,
    clock: Arc<dyn Clock>,
    factory: IndicatorFactory,
    resampler: TimeframeResampler,
    engine: AlignmentEngine,
    results: CacheEngine<IndicatorResult>,
    alignments: CacheEngine<Arc<TimeframeAlignment>>,
    /// lineage -> (newest open time in ms, fingerprint)
    fingerprints: DashMap<String, (i64, u64)>,
    settings: CacheSettings,
    warmup_bars: usize,
}

impl<S> IndicatorService<S>
where
    S: ExchangeDataSource + 'static,
{
    pub fn new(
        market: Arc<CachedMarketData<S>>,
        clock: Arc<dyn Clock>,
        config: &PlatformConfig,
    ) -> Self {
        let engine_config = config.cache.engine_config();
        Self {
            market,
            factory: IndicatorFactory,
            resampler: TimeframeResampler::new(config.exchange.base_interval),
            engine: AlignmentEngine::new(config.alignment.thresholds()),
            results: CacheEngine::new(Arc::clone(&clock), engine_config),
            alignments: CacheEngine::new(Arc::clone(&clock), engine_config),
            clock,
            fingerprints: DashMap::new(),
            settings: config.cache.clone(),
            warmup_bars: config.exchange.warmup_bars,
        }
    }

    pub fn market(&self) -> &Arc<CachedMarketData<S>> {
        &self.market
    }

    pub fn base_interval(&self) -> Timeframe {
        self.resampler.base()
    }

    /// `kind(period)` over `symbol`'s candles resampled to `timeframe`
    pub async fn indicator(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        period: usize,
        timeframe: Timeframe,
    ) -> MarketResult<IndicatorResult> {
        self.indicator_with(symbol, kind, period, timeframe, &CancellationToken::new())
            .await
    }

    pub async fn indicator_with(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        period: usize,
        timeframe: Timeframe,
        cancel: &CancellationToken,
    ) -> MarketResult<IndicatorResult> {
        let indicator = self.factory.create(kind, period)?;
        self.check_timeframe(timeframe)?;
        let (start, end) = self.window(timeframe, indicator.min_samples())?;
        let candles = self
            .market
            .candle_history(symbol, start, end, cancel)
            .await?;
        let lineage = self.lineage("candles", symbol, timeframe, indicator.min_samples());
        let fingerprint = self.observe(
            &lineage,
            candles.last().map(candle_point),
            indicator.min_samples(),
        )?;

        let key = format!(
            "indicator:{}:{}:{}:{}:{:016x}",
            symbol,
            kind.short_code(),
            period,
            timeframe,
            fingerprint
        );
        let resampler = self.resampler;
        let factory = move || {
            std::future::ready(indicator_over_candles(
                &indicator, &resampler, &candles, timeframe,
            ))
        };
        self.results
            .get_or_set(&key, factory, &self.derived_options(symbol, lineage))
            .await
    }

    /// `kind(period)` over `symbol`'s historical prices at the base interval
    ///
    /// Prices carry no high/low, so range-based indicators see `high = low =
    /// close`.
    pub async fn indicator_from_prices(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        period: usize,
    ) -> MarketResult<IndicatorResult> {
        let indicator = self.factory.create(kind, period)?;
        let (start, end) = self.window(self.base_interval(), indicator.min_samples())?;
        let prices = self
            .market
            .price_history(symbol, start, end, &CancellationToken::new())
            .await?;
        let lineage = self.lineage("prices", symbol, self.base_interval(), indicator.min_samples());
        let fingerprint = self.observe(
            &lineage,
            prices.last().map(price_point),
            indicator.min_samples(),
        )?;

        let key = format!(
            "indicator:{}:{}:{}:prices:{:016x}",
            symbol,
            kind.short_code(),
            period,
            fingerprint
        );
        let factory = move || {
            std::future::ready(
                PriceSeries::from_prices(&prices).and_then(|series| indicator.calculate(&series)),
            )
        };
        self.results
            .get_or_set(&key, factory, &self.derived_options(symbol, lineage))
            .await
    }

    /// Score how `kind(period)` agrees across `timeframes`
    ///
    /// One candle window, sized for the widest timeframe, feeds every
    /// timeframe.
    pub async fn alignment(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        period: usize,
        timeframes: &[Timeframe],
    ) -> MarketResult<Arc<TimeframeAlignment>> {
        let indicator = self.factory.create(kind, period)?;
        let Some(&widest) = timeframes.iter().max() else {
            return Err(MarketError::insufficient(1, 0));
        };
        for &tf in timeframes {
            self.check_timeframe(tf)?;
        }
        let (start, end) = self.window(widest, indicator.min_samples())?;
        let candles = self
            .market
            .candle_history(symbol, start, end, &CancellationToken::new())
            .await?;
        let lineage = self.lineage("candles", symbol, widest, indicator.min_samples());
        let fingerprint = self.observe(
            &lineage,
            candles.last().map(candle_point),
            indicator.min_samples(),
        )?;

        let mut timeframes = timeframes.to_vec();
        timeframes.sort();
        timeframes.dedup();
        let codes: Vec<String> = timeframes.iter().map(Timeframe::to_string).collect();
        let key = format!(
            "alignment:{}:{}:{}:{}:{:016x}",
            symbol,
            kind.short_code(),
            period,
            codes.join(","),
            fingerprint
        );

        let engine = self.engine;
        let resampler = self.resampler;
        let factory = move || {
            std::future::ready(
                engine
                    .evaluate(&indicator, &resampler, &candles, &timeframes)
                    .map(Arc::new),
            )
        };
        self.alignments
            .get_or_set(&key, factory, &self.derived_options(symbol, lineage))
            .await
    }

    /// Raw-data and derived caches plus every breaker
    pub fn diagnostics(&self) -> MarketDataDiagnostics {
        self.market.diagnostics().with_caches([
            ("indicators".to_string(), self.results.statistics()),
            ("alignments".to_string(), self.alignments.statistics()),
        ])
    }

    fn derived_options(&self, symbol: &str, lineage: String) -> CacheOptions {
        self.settings.derived_options(symbol).with_tag(lineage)
    }

    fn check_timeframe(&self, timeframe: Timeframe) -> MarketResult<()> {
        if !self.base_interval().divides(timeframe) {
            return Err(MarketError::invalid(format!(
                "timeframe {} is not a multiple of base interval {}",
                timeframe,
                self.base_interval()
            )));
        }
        Ok(())
    }

    /// `[start, end]` covering `min_samples + warmup_bars` bars of
    /// `timeframe`, the last of them still forming
    fn window(
        &self,
        timeframe: Timeframe,
        min_samples: usize,
    ) -> MarketResult<(Timestamp, Timestamp)> {
        let end = self.base_interval().bucket_start(self.clock.now());
        let bars = self.lookback_bars(min_samples);
        let too_long = || {
            MarketError::invalid(format!("lookback of {} {} bars is too long", bars, timeframe))
        };
        let span = i64::try_from(bars - 1)
            .ok()
            .and_then(|n| n.checked_mul(timeframe.as_millis()))
            .map(ChronoDuration::milliseconds)
            .ok_or_else(too_long)?;
        let start = timeframe
            .bucket_start(end)
            .checked_sub_signed(span)
            .ok_or_else(too_long)?;
        Ok((start, end))
    }

    fn lookback_bars(&self, min_samples: usize) -> usize {
        min_samples.saturating_add(self.warmup_bars).max(1)
    }

    fn lineage(
        &self,
        source: &str,
        symbol: &str,
        timeframe: Timeframe,
        min_samples: usize,
    ) -> String {
        format!(
            "lineage:{}:{}:{}:{}",
            source,
            symbol,
            timeframe,
            self.lookback_bars(min_samples)
        )
    }

    /// Record the newest data point seen by `lineage`, dropping its derived
    /// results when the point moved forward or changed in place
    ///
    /// A point older than the one on record leaves the lineage untouched.
    fn observe(
        &self,
        lineage: &str,
        newest: Option<(i64, f64)>,
        required: usize,
    ) -> MarketResult<u64> {
        let (millis, close) = newest.ok_or_else(|| MarketError::insufficient(required, 0))?;
        let mut hasher = DefaultHasher::new();
        millis.hash(&mut hasher);
        close.to_bits().hash(&mut hasher);
        let fingerprint = hasher.finish();

        let superseded = match self.fingerprints.entry(lineage.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert((millis, fingerprint));
                false
            }
            Entry::Occupied(mut seen) => {
                let (seen_millis, seen_fingerprint) = *seen.get();
                if millis < seen_millis || fingerprint == seen_fingerprint {
                    false
                } else {
                    seen.insert((millis, fingerprint));
                    true
                }
            }
        };
        if superseded {
            let removed =
                self.results.remove_by_tag(lineage) + self.alignments.remove_by_tag(lineage);
            debug!(lineage, removed, "Newer market data, dropped derived results");
        }
        Ok(fingerprint)
    }
}

fn candle_point(candle: &Candle) -> (i64, f64) {
    (candle.timestamp().timestamp_millis(), candle.close())
}

fn price_point(sample: &PriceSample) -> (i64, f64) {
    (sample.timestamp().timestamp_millis(), sample.value())
}

fn indicator_over_candles(
    indicator: &Indicator,
    resampler: &TimeframeResampler,
    candles: &[Candle],
    timeframe: Timeframe,
) -> MarketResult<IndicatorResult> {
    let bars = resampler.resample(candles, timeframe)?;
    let series = PriceSeries::from_candles(&bars)?;
    indicator.calculate(&series)
}
