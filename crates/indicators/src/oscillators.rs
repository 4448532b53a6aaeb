//! Range oscillators: where the close sits inside the recent high/low range

use confluence_core::{AuxiliaryOutput, IndicatorResult, MarketResult, PriceSeries};

use crate::algorithm::{IndicatorAlgorithm, mean, validate_period, windowed_result};
use crate::kind::IndicatorKind;

/// %K reported when the window's high equals its low
pub const STOCHASTIC_DEGENERATE_K: f64 = 50.0;

/// %R reported when the window's high equals its low
pub const WILLIAMS_DEGENERATE_R: f64 = -50.0;

/// Number of %K values averaged into %D
pub const STOCHASTIC_SMOOTHING: usize = 3;

/// Highest high and lowest low over `period` points ending at `end` (exclusive)
fn range_at(series: &PriceSeries, end: usize, period: usize) -> (f64, f64) {
    let start = end - period;
    let high = series.highs()[start..end]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let low = series.lows()[start..end]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    (high, low)
}

/// Stochastic oscillator %K over `period` points
///
/// `%K = 100 * (close - lowest_low) / (highest_high - lowest_low)`, in
/// `[0, 100]`. When the series holds enough points for
/// [`STOCHASTIC_SMOOTHING`] consecutive %K values, their mean is attached
/// as %D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StochasticOscillator {
    period: usize,
}

impl StochasticOscillator {
    pub fn new(period: usize) -> MarketResult<Self> {
        Ok(Self {
            period: validate_period(IndicatorKind::Stochastic, period)?,
        })
    }

    fn k_at(&self, series: &PriceSeries, end: usize) -> f64 {
        let (high, low) = range_at(series, end, self.period);
        let close = series.closes()[end - 1];
        if high == low {
            return STOCHASTIC_DEGENERATE_K;
        }
        (100.0 * (close - low) / (high - low)).clamp(0.0, 100.0)
    }
}

impl IndicatorAlgorithm for StochasticOscillator {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Stochastic
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_samples(&self) -> usize {
        self.period
    }

    fn calculate(&self, series: &PriceSeries) -> MarketResult<IndicatorResult> {
        series.require(self.min_samples())?;
        let n = series.len();
        let k = self.k_at(series, n);
        let result = windowed_result(series, self.period, k)?;

        if n < self.period + STOCHASTIC_SMOOTHING - 1 {
            return Ok(result);
        }
        let ks: Vec<f64> = (0..STOCHASTIC_SMOOTHING)
            .map(|back| self.k_at(series, n - back))
            .collect();
        Ok(result.with_auxiliary(AuxiliaryOutput::Stochastic { d: mean(&ks) }))
    }
}

/// Williams %R over `period` points
///
/// `%R = -100 * (highest_high - close) / (highest_high - lowest_low)`, in
/// `[-100, 0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WilliamsR {
    period: usize,
}

impl WilliamsR {
    pub fn new(period: usize) -> MarketResult<Self> {
        Ok(Self {
            period: validate_period(IndicatorKind::WilliamsR, period)?,
        })
    }
}

impl IndicatorAlgorithm for WilliamsR {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::WilliamsR
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_samples(&self) -> usize {
        self.period
    }

    fn calculate(&self, series: &PriceSeries) -> MarketResult<IndicatorResult> {
        series.require(self.min_samples())?;
        let n = series.len();
        let (high, low) = range_at(series, n, self.period);
        let close = series.closes()[n - 1];
        let r = if high == low {
            WILLIAMS_DEGENERATE_R
        } else {
            (-100.0 * (high - close) / (high - low)).clamp(-100.0, 0.0)
        };
        windowed_result(series, self.period, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};
    use confluence_core::{Candle, MarketError};

    /// Candles from (high, low, close); open is the previous close
    fn candles(bars: &[(f64, f64, f64)]) -> PriceSeries {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut prev = bars[0].2;
        let candles: Vec<_> = bars
            .iter()
            .enumerate()
            .map(|(i, &(h, l, c))| {
                let open = prev.clamp(l, h);
                prev = c;
                Candle::new(base + Duration::hours(i as i64), open, h, l, c, 10.0).unwrap()
            })
            .collect();
        PriceSeries::from_candles(&candles).unwrap()
    }

    #[test]
    fn test_stochastic_position_in_range() {
        let s = candles(&[(12.0, 8.0, 10.0), (14.0, 10.0, 13.0), (13.0, 9.0, 12.0)]);
        let result = StochasticOscillator::new(3).unwrap().calculate(&s).unwrap();
        // high 14, low 8, close 12
        assert_relative_eq!(result.value, 100.0 * 4.0 / 6.0);
        assert!(result.auxiliary.is_none());
    }

    #[test]
    fn test_stochastic_d_is_mean_of_last_three_k() {
        let s = candles(&[
            (10.0, 0.0, 5.0),
            (10.0, 0.0, 10.0),
            (10.0, 0.0, 0.0),
            (10.0, 0.0, 5.0),
        ]);
        let result = StochasticOscillator::new(2).unwrap().calculate(&s).unwrap();
        assert_relative_eq!(result.value, 50.0);
        match result.auxiliary {
            Some(AuxiliaryOutput::Stochastic { d }) => assert_relative_eq!(d, 50.0),
            other => panic!("expected %D, got {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_ranges() {
        let flat = candles(&[(5.0, 5.0, 5.0); 6]);
        let k = StochasticOscillator::new(5).unwrap().calculate(&flat).unwrap();
        assert_relative_eq!(k.value, STOCHASTIC_DEGENERATE_K);
        let r = WilliamsR::new(5).unwrap().calculate(&flat).unwrap();
        assert_relative_eq!(r.value, WILLIAMS_DEGENERATE_R);
    }

    #[test]
    fn test_williams_r_extremes() {
        let at_high = candles(&[(10.0, 5.0, 6.0), (12.0, 6.0, 12.0)]);
        let r = WilliamsR::new(2).unwrap().calculate(&at_high).unwrap();
        assert_relative_eq!(r.value, 0.0);

        let at_low = candles(&[(10.0, 5.0, 6.0), (8.0, 5.0, 5.0)]);
        let r = WilliamsR::new(2).unwrap().calculate(&at_low).unwrap();
        assert_relative_eq!(r.value, -100.0);
    }

    #[test]
    fn test_bounded_for_any_window() {
        let bars: Vec<_> = (0..40)
            .map(|i| {
                let mid = 100.0 + ((i * 7) % 13) as f64;
                (mid + 2.0, mid - 2.0, mid + ((i % 5) as f64 - 2.0))
            })
            .collect();
        let s = candles(&bars);
        let k = StochasticOscillator::new(14).unwrap().calculate(&s).unwrap();
        let r = WilliamsR::new(14).unwrap().calculate(&s).unwrap();
        assert!((0.0..=100.0).contains(&k.value));
        assert!((-100.0..=0.0).contains(&r.value));
    }

    #[test]
    fn test_insufficient() {
        let s = candles(&[(10.0, 5.0, 6.0)]);
        assert!(matches!(
            WilliamsR::new(5).unwrap().calculate(&s),
            Err(MarketError::InsufficientData { required: 5, available: 1 })
        ));
    }
}
