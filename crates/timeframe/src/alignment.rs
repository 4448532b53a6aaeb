use std::collections::BTreeMap;

use confluence_core::{Candle, IndicatorResult, MarketError, MarketResult, PriceSeries, Timeframe};
use confluence_indicators::{Indicator, IndicatorAlgorithm, NeutralReference};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resampler::TimeframeResampler;

/// Minimum share of timeframes agreeing with the majority for a strong confluence
pub const STRONG_ALIGNMENT_THRESHOLD: f64 = 0.8;

/// Minimum absolute confluence strength for a strong confluence
pub const STRONG_CONFLUENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendDirection {
    fn of(normalized: f64) -> Self {
        if normalized > 0.0 {
            TrendDirection::Bullish
        } else if normalized < 0.0 {
            TrendDirection::Bearish
        } else {
            TrendDirection::Neutral
        }
    }
}

/// Thresholds that decide whether an alignment counts as strong
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentThresholds {
    pub strong_alignment: f64,
    pub strong_confluence: f64,
}

impl Default for AlignmentThresholds {
    fn default() -> Self {
        Self {
            strong_alignment: STRONG_ALIGNMENT_THRESHOLD,
            strong_confluence: STRONG_CONFLUENCE_THRESHOLD,
        }
    }
}

/// One timeframe's contribution to an alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeReading {
    pub result: IndicatorResult,
    /// Signed strength in `[-1, 1]` relative to the neutral reference
    pub normalized: f64,
    pub direction: TrendDirection,
}

/// Directional agreement of one indicator across several timeframes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeAlignment {
    /// Share of timeframes agreeing with the majority, in `[0, 1]`
    pub alignment_score: f64,
    pub trend_direction: TrendDirection,
    pub values_by_timeframe: BTreeMap<Timeframe, TimeframeReading>,
    pub strongest_timeframe: Option<Timeframe>,
    pub weakest_timeframe: Option<Timeframe>,
    /// Mean normalized value, in `[-1, 1]`; positive is bullish
    pub confluence_strength: f64,
    pub is_strong_confluence: bool,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
}

impl TimeframeAlignment {
    pub fn direction(&self, timeframe: Timeframe) -> Option<TrendDirection> {
        self.values_by_timeframe.get(&timeframe).map(|r| r.direction)
    }

    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.values_by_timeframe.keys().copied()
    }
}

/// Scores how well several timeframes agree on trend direction
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignmentEngine {
    thresholds: AlignmentThresholds,
}

impl AlignmentEngine {
    pub fn new(thresholds: AlignmentThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> AlignmentThresholds {
        self.thresholds
    }

    /// Score precomputed per-timeframe results against `reference`
    ///
    /// Fails `InsufficientData` on an empty map.
    pub fn align(
        &self,
        results: BTreeMap<Timeframe, IndicatorResult>,
        reference: NeutralReference,
    ) -> MarketResult<TimeframeAlignment> {
        if results.is_empty() {
            return Err(MarketError::insufficient(1, 0));
        }

        let readings: BTreeMap<Timeframe, TimeframeReading> = results
            .into_iter()
            .map(|(tf, result)| {
                let normalized = reference.normalize(&result);
                let reading = TimeframeReading {
                    result,
                    normalized,
                    direction: TrendDirection::of(normalized),
                };
                (tf, reading)
            })
            .collect();

        let count = |d: TrendDirection| readings.values().filter(|r| r.direction == d).count();
        let bullish_count = count(TrendDirection::Bullish);
        let bearish_count = count(TrendDirection::Bearish);
        let neutral_count = count(TrendDirection::Neutral);

        let (trend_direction, majority) = majority(bullish_count, bearish_count, neutral_count);
        let total = readings.len() as f64;
        let alignment_score = majority as f64 / total;
        let confluence_strength =
            (readings.values().map(|r| r.normalized).sum::<f64>() / total).clamp(-1.0, 1.0);

        let by_strength = |sign: f64| {
            readings
                .iter()
                .map(|(tf, r)| (*tf, sign * r.normalized))
                .fold(None, |best: Option<(Timeframe, f64)>, (tf, v)| match best {
                    Some((_, b)) if b >= v => best,
                    _ => Some((tf, v)),
                })
                .map(|(tf, _)| tf)
        };
        let (strongest_timeframe, weakest_timeframe) = match trend_direction {
            TrendDirection::Bullish => (by_strength(1.0), by_strength(-1.0)),
            TrendDirection::Bearish => (by_strength(-1.0), by_strength(1.0)),
            TrendDirection::Neutral => (None, None),
        };

        let is_strong_confluence = alignment_score >= self.thresholds.strong_alignment
            && confluence_strength.abs() >= self.thresholds.strong_confluence;

        debug!(
            timeframes = readings.len(),
            direction = ?trend_direction,
            score = alignment_score,
            confluence = confluence_strength,
            "Computed timeframe alignment"
        );

        Ok(TimeframeAlignment {
            alignment_score,
            trend_direction,
            values_by_timeframe: readings,
            strongest_timeframe,
            weakest_timeframe,
            confluence_strength,
            is_strong_confluence,
            bullish_count,
            bearish_count,
            neutral_count,
        })
    }

    /// Resample `base_candles` to every timeframe, run `indicator` on each and
    /// score the results
    ///
    /// Any per-timeframe failure (typically `InsufficientData` on the widest
    /// timeframe) fails the whole alignment.
    pub fn evaluate(
        &self,
        indicator: &Indicator,
        resampler: &TimeframeResampler,
        base_candles: &[Candle],
        timeframes: &[Timeframe],
    ) -> MarketResult<TimeframeAlignment> {
        let mut results = BTreeMap::new();
        for &tf in timeframes {
            let bars = resampler.resample(base_candles, tf)?;
            let series = PriceSeries::from_candles(&bars)?;
            results.insert(tf, indicator.calculate(&series)?);
        }
        self.align(results, indicator.kind().neutral_reference())
    }
}

/// Majority direction and its count; any tie for first place is neutral
fn majority(bullish: usize, bearish: usize, neutral: usize) -> (TrendDirection, usize) {
    let top = bullish.max(bearish).max(neutral);
    let leaders = [bullish, bearish, neutral]
        .iter()
        .filter(|&&c| c == top)
        .count();
    if leaders > 1 || neutral == top {
        return (TrendDirection::Neutral, top);
    }
    if bullish == top {
        (TrendDirection::Bullish, top)
    } else {
        (TrendDirection::Bearish, top)
    }
}
