use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::values::{Symbol, Timestamp};

/// Upper bound accepted for a quoted price
pub const MAX_PRICE_VALUE: f64 = 1e12;

/// A single quoted price for a symbol
///
/// Created by exchange adapters; read-only for everything downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceSample")]
pub struct PriceSample {
    symbol: Symbol,
    value: f64,
    timestamp: Timestamp,
}

#[derive(Deserialize)]
struct RawPriceSample {
    symbol: Symbol,
    value: f64,
    timestamp: Timestamp,
}

impl TryFrom<RawPriceSample> for PriceSample {
    type Error = MarketError;

    fn try_from(raw: RawPriceSample) -> MarketResult<Self> {
        PriceSample::new(raw.symbol, raw.value, raw.timestamp)
    }
}

impl PriceSample {
    pub fn new(symbol: impl Into<Symbol>, value: f64, timestamp: Timestamp) -> MarketResult<Self> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(MarketError::invalid("symbol must not be empty"));
        }
        if !value.is_finite() || !(0.0..=MAX_PRICE_VALUE).contains(&value) {
            return Err(MarketError::invalid(format!(
                "price {} for {} outside [0, {}]",
                value, symbol, MAX_PRICE_VALUE
            )));
        }
        Ok(Self {
            symbol,
            value,
            timestamp,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_valid_sample() {
        let now = Utc::now();
        let sample = PriceSample::new("BTCUSDT", 64_000.5, now).unwrap();
        assert_eq!(sample.symbol(), "BTCUSDT");
        assert_eq!(sample.value(), 64_000.5);
        assert_eq!(sample.timestamp(), now);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let now = Utc::now();
        assert!(PriceSample::new("BTCUSDT", -1.0, now).is_err());
        assert!(PriceSample::new("BTCUSDT", 2e12, now).is_err());
        assert!(PriceSample::new("BTCUSDT", f64::NAN, now).is_err());
        assert!(PriceSample::new("  ", 1.0, now).is_err());
        assert!(PriceSample::new("BTCUSDT", 0.0, now).is_ok());
    }

    #[test]
    fn test_deserialize_checks_range() {
        let json = r#"{"symbol":"ETHUSDT","value":-5.0,"timestamp":"2024-03-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<PriceSample>(json).is_err());

        let json = json.replace("-5.0", "3100.25");
        let sample: PriceSample = serde_json::from_str(&json).unwrap();
        assert_eq!(sample.value(), 3100.25);
    }
}
