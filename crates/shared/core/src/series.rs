//! Columnar indicator input
//!
//! Indicators read highs, lows and closes by index; building the columns
//! once lets the same algorithm run over price samples or candles.

use crate::entities::{Candle, PriceSample};
use crate::error::{MarketError, MarketResult};
use crate::values::Timestamp;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    timestamps: Vec<Timestamp>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
}

impl PriceSeries {
    /// Build from price samples; each sample is its own high, low and close
    pub fn from_prices(samples: &[PriceSample]) -> MarketResult<Self> {
        let mut series = Self::with_capacity(samples.len());
        for s in samples {
            series.push(s.timestamp(), s.value(), s.value(), s.value())?;
        }
        Ok(series)
    }

    pub fn from_candles(candles: &[Candle]) -> MarketResult<Self> {
        let mut series = Self::with_capacity(candles.len());
        for c in candles {
            series.push(c.timestamp(), c.high(), c.low(), c.close())?;
        }
        Ok(series)
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(n),
            highs: Vec::with_capacity(n),
            lows: Vec::with_capacity(n),
            closes: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, ts: Timestamp, high: f64, low: f64, close: f64) -> MarketResult<()> {
        if let Some(&last) = self.timestamps.last()
            && ts <= last
        {
            return Err(MarketError::integrity(format!(
                "series not time-ascending: {} follows {}",
                ts, last
            )));
        }
        self.timestamps.push(ts);
        self.highs.push(high);
        self.lows.push(low);
        self.closes.push(close);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn highs(&self) -> &[f64] {
        &self.highs
    }

    pub fn lows(&self) -> &[f64] {
        &self.lows
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    /// Fail with `InsufficientData` unless at least `required` points exist
    pub fn require(&self, required: usize) -> MarketResult<()> {
        if self.len() < required {
            return Err(MarketError::insufficient(required, self.len()));
        }
        Ok(())
    }

    /// Timestamps of the trailing `n` points (first, last)
    pub fn window_bounds(&self, n: usize) -> Option<(Timestamp, Timestamp)> {
        let len = self.len();
        if n == 0 || n > len {
            return None;
        }
        Some((self.timestamps[len - n], self.timestamps[len - 1]))
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn ts(min: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(min)
    }

    #[test]
    fn test_from_prices_uses_value_for_all_columns() {
        let samples: Vec<_> = (0..3)
            .map(|i| PriceSample::new("ETHUSDT", 10.0 + i as f64, ts(i)).unwrap())
            .collect();
        let series = PriceSeries::from_prices(&samples).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.highs(), series.closes());
        assert_eq!(series.lows(), series.closes());
        assert_eq!(series.window_bounds(2), Some((ts(1), ts(2))));
        assert_eq!(series.last_close(), Some(12.0));
    }

    #[test]
    fn test_from_candles_keeps_ranges() {
        let candles = vec![
            Candle::new(ts(0), 10.0, 12.0, 9.0, 11.0, 1.0).unwrap(),
            Candle::new(ts(1), 11.0, 13.0, 10.0, 12.0, 1.0).unwrap(),
        ];
        let series = PriceSeries::from_candles(&candles).unwrap();
        assert_eq!(series.highs(), &[12.0, 13.0]);
        assert_eq!(series.lows(), &[9.0, 10.0]);
    }

    #[test]
    fn test_rejects_unordered_input() {
        let samples = vec![
            PriceSample::new("ETHUSDT", 1.0, ts(5)).unwrap(),
            PriceSample::new("ETHUSDT", 1.0, ts(4)).unwrap(),
        ];
        assert!(matches!(
            PriceSeries::from_prices(&samples),
            Err(MarketError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_require() {
        let series = PriceSeries::default();
        assert_eq!(
            series.require(3),
            Err(MarketError::InsufficientData {
                required: 3,
                available: 0
            })
        );
        assert!(series.window_bounds(1).is_none());
    }
}
