use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::values::Timestamp;

/// A body at or below this fraction of the full range classifies as a doji
pub const DOJI_BODY_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleKind {
    Bullish,
    Bearish,
    Doji,
}

/// OHLCV bar for a fixed time bucket
///
/// Invariant: `low <= min(open, close)`, `max(open, close) <= high`,
/// `volume > 0`. Derived measures are computed on demand. Deserialization
/// goes through [`Candle::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCandle")]
pub struct Candle {
    timestamp: Timestamp,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Deserialize)]
struct RawCandle {
    timestamp: Timestamp,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl TryFrom<RawCandle> for Candle {
    type Error = MarketError;

    fn try_from(raw: RawCandle) -> MarketResult<Self> {
        Candle::new(raw.timestamp, raw.open, raw.high, raw.low, raw.close, raw.volume)
    }
}

impl Candle {
    pub fn new(
        timestamp: Timestamp,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> MarketResult<Self> {
        if ![open, high, low, close, volume].iter().all(|v| v.is_finite()) {
            return Err(MarketError::integrity(format!(
                "non-finite OHLCV at {}",
                timestamp
            )));
        }
        if low > open.min(close) || open.max(close) > high {
            return Err(MarketError::integrity(format!(
                "OHLC out of order at {}: o={} h={} l={} c={}",
                timestamp, open, high, low, close
            )));
        }
        if volume <= 0.0 {
            return Err(MarketError::integrity(format!(
                "non-positive volume {} at {}",
                volume, timestamp
            )));
        }
        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn open(&self) -> f64 {
        self.open
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn close(&self) -> f64 {
        self.close
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn kind(&self) -> CandleKind {
        let range = self.range();
        if range == 0.0 || self.body_size() <= range * DOJI_BODY_RATIO {
            CandleKind::Doji
        } else if self.close > self.open {
            CandleKind::Bullish
        } else {
            CandleKind::Bearish
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.kind() == CandleKind::Bullish
    }

    pub fn is_bearish(&self) -> bool {
        self.kind() == CandleKind::Bearish
    }

    pub fn is_doji(&self) -> bool {
        self.kind() == CandleKind::Doji
    }
}
