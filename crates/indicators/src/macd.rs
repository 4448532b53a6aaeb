use confluence_core::{AuxiliaryOutput, IndicatorResult, MarketError, MarketResult, PriceSeries};

use crate::algorithm::{IndicatorAlgorithm, ema_series, validate_period, windowed_result};
use crate::kind::IndicatorKind;

pub const MACD_FAST_PERIOD: usize = 12;
pub const MACD_SLOW_PERIOD: usize = 26;
pub const MACD_SIGNAL_PERIOD: usize = 9;

/// Moving Average Convergence Divergence with the classic 12/26/9 periods
///
/// The value is the MACD line `EMA(12) - EMA(26)` at the last close; the
/// signal line `EMA(9)` of the MACD line and the histogram
/// `macd - signal` come back as [`AuxiliaryOutput::Macd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Macd;

impl Macd {
    /// The periods are fixed; `period` is only checked for positivity so
    /// every kind rejects the same bad input
    pub fn new(period: usize) -> MarketResult<Self> {
        validate_period(IndicatorKind::Macd, period)?;
        Ok(Self)
    }

    /// MACD line values, one per close from index `MACD_SLOW_PERIOD - 1` on
    fn macd_line(closes: &[f64]) -> Vec<f64> {
        let fast = ema_series(closes, MACD_FAST_PERIOD);
        let slow = ema_series(closes, MACD_SLOW_PERIOD);
        let skip = MACD_SLOW_PERIOD - MACD_FAST_PERIOD;
        fast.iter().skip(skip).zip(&slow).map(|(f, s)| f - s).collect()
    }
}

impl IndicatorAlgorithm for Macd {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Macd
    }

    fn period(&self) -> usize {
        MACD_SLOW_PERIOD
    }

    fn min_samples(&self) -> usize {
        MACD_SLOW_PERIOD + MACD_SIGNAL_PERIOD - 1
    }

    fn calculate(&self, series: &PriceSeries) -> MarketResult<IndicatorResult> {
        series.require(self.min_samples())?;
        let line = Self::macd_line(series.closes());
        let signal = ema_series(&line, MACD_SIGNAL_PERIOD);

        let (macd, signal) = match (line.last(), signal.last()) {
            (Some(&m), Some(&s)) => (m, s),
            _ => return Err(MarketError::insufficient(self.min_samples(), series.len())),
        };

        Ok(
            windowed_result(series, series.len(), macd)?.with_auxiliary(AuxiliaryOutput::Macd {
                signal,
                histogram: macd - signal,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::{Duration, TimeZone, Utc};
    use confluence_core::PriceSample;

    fn series(values: &[f64]) -> PriceSeries {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let samples: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                PriceSample::new("SOLUSDT", *v, base + Duration::hours(i as i64)).unwrap()
            })
            .collect();
        PriceSeries::from_prices(&samples).unwrap()
    }

    #[test]
    fn test_requires_34_closes() {
        let macd = Macd::new(26).unwrap();
        assert_eq!(macd.min_samples(), 34);
        assert_eq!(
            macd.calculate(&series(&[100.0; 33])),
            Err(MarketError::InsufficientData {
                required: 34,
                available: 33
            })
        );
        assert!(macd.calculate(&series(&[100.0; 34])).is_ok());
    }

    #[test]
    fn test_flat_series_is_zero() {
        let result = Macd::new(1).unwrap().calculate(&series(&[250.0; 50])).unwrap();
        assert_abs_diff_eq!(result.value, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.signal_line().unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_uptrend_is_positive_with_histogram() {
        let values: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let result = Macd::new(26).unwrap().calculate(&series(&values)).unwrap();
        assert!(result.value > 0.0);
        match result.auxiliary {
            Some(AuxiliaryOutput::Macd { signal, histogram }) => {
                assert_relative_eq!(histogram, result.value - signal);
            }
            other => panic!("expected macd output, got {:?}", other),
        }
    }

    #[test]
    fn test_line_alignment() {
        // On a linear series EMA(n) lags by (n - 1) / 2 steps, so the line
        // settles at (26 - 1) / 2 - (12 - 1) / 2 = 7
        let values: Vec<f64> = (0..400).map(|i| i as f64).collect();
        let result = Macd::new(26).unwrap().calculate(&series(&values)).unwrap();
        assert_abs_diff_eq!(result.value, 7.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(Macd::new(0), Err(MarketError::InvalidParameter(_))));
    }
}
