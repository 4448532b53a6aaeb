use confluence_core::{AuxiliaryOutput, IndicatorResult, MarketError, MarketResult, PriceSeries};

use crate::algorithm::{IndicatorAlgorithm, mean, std_dev, validate_period, windowed_result};
use crate::kind::IndicatorKind;

/// Standard deviations between the midline and each band
pub const DEFAULT_BAND_WIDTH: f64 = 2.0;

/// Bollinger Bands over the last `period` closes
///
/// The primary value is the SMA midline. Upper and lower bands sit
/// `k` population standard deviations away and are returned as
/// [`AuxiliaryOutput::Bands`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    period: usize,
    k: f64,
}

impl BollingerBands {
    pub fn new(period: usize) -> MarketResult<Self> {
        Self::with_width(period, DEFAULT_BAND_WIDTH)
    }

    pub fn with_width(period: usize, k: f64) -> MarketResult<Self> {
        let period = validate_period(IndicatorKind::BollingerBands, period)?;
        if !k.is_finite() || k <= 0.0 {
            return Err(MarketError::invalid(format!(
                "BB band width must be positive, got {}",
                k
            )));
        }
        Ok(Self { period, k })
    }

    pub fn band_width(&self) -> f64 {
        self.k
    }
}

impl IndicatorAlgorithm for BollingerBands {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::BollingerBands
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
        let window = &closes[closes.len() - self.period..];

        let middle = mean(window);
        let offset = self.k * std_dev(window);
        let upper = middle + offset;
        let lower = middle - offset;
        let bandwidth = if middle != 0.0 {
            (upper - lower) / middle
        } else {
            0.0
        };

        Ok(windowed_result(series, self.period, middle)?.with_auxiliary(
            AuxiliaryOutput::Bands {
                upper,
                lower,
                bandwidth,
            },
        ))
    }
}
