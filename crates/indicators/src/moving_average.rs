//! Trend-following moving averages

use confluence_core::{IndicatorResult, MarketError, MarketResult, PriceSeries};

use crate::algorithm::{IndicatorAlgorithm, ema_series, mean, validate_period, windowed_result};
use crate::kind::IndicatorKind;

/// Arithmetic mean of the last `period` closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleMovingAverage {
    period: usize,
}

impl SimpleMovingAverage {
    pub fn new(period: usize) -> MarketResult<Self> {
        Ok(Self {
            period: validate_period(IndicatorKind::Sma, period)?,
        })
    }
}

impl IndicatorAlgorithm for SimpleMovingAverage {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Sma
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_samples(&self) -> usize {
        self.period
    }

    fn calculate(&self, series: &PriceSeries) -> MarketResult<IndicatorResult> {
        series.require(self.min_samples())?;
        let closes = series.closes();
        let value = mean(&closes[closes.len() - self.period..]);
        windowed_result(series, self.period, value)
    }
}

/// Exponential moving average with `alpha = 2 / (period + 1)`
///
/// Seeded with the SMA of the first `period` closes, then folded over every
/// remaining close. The result window is the whole series, since every close
/// contributes to the final value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialMovingAverage {
    period: usize,
}

impl ExponentialMovingAverage {
    pub fn new(period: usize) -> MarketResult<Self> {
        Ok(Self {
            period: validate_period(IndicatorKind::Ema, period)?,
        })
    }

    pub fn alpha(&self) -> f64 {
        2.0 / (self.period as f64 + 1.0)
    }
}

impl IndicatorAlgorithm for ExponentialMovingAverage {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Ema
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_samples(&self) -> usize {
        self.period
    }

    fn calculate(&self, series: &PriceSeries) -> MarketResult<IndicatorResult> {
        series.require(self.min_samples())?;
        let emas = ema_series(series.closes(), self.period);
        let value = emas
            .last()
            .copied()
            .ok_or_else(|| MarketError::insufficient(self.period, series.len()))?;
        windowed_result(series, series.len(), value)
    }
}
