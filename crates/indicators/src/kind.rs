use confluence_core::{IndicatorResult, MarketError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of supported indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    BollingerBands,
    Stochastic,
    Macd,
    WilliamsR,
}

/// Display metadata for an indicator kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndicatorDescriptor {
    pub display_name: &'static str,
    pub short_code: &'static str,
    pub description: &'static str,
}

/// How an indicator value maps onto bullish / bearish
///
/// `normalize` returns a signed strength in `[-1, 1]`; positive is bullish,
/// zero is neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NeutralReference {
    /// Bounded oscillator: bullish above `level`; `span` is the distance
    /// from `level` to the edge of the oscillator's range
    Level { level: f64, span: f64 },
    /// Trend-following average: bullish while the last close is above the
    /// average. `full_scale` is the relative gap that maps to full strength.
    PriceRelative { full_scale: f64 },
    /// Unbounded oscillator around zero in price units, measured relative to
    /// the last close. `full_scale` is the relative value at full strength.
    ZeroLine { full_scale: f64 },
}

impl NeutralReference {
    pub fn normalize(&self, result: &IndicatorResult) -> f64 {
        let raw = match *self {
            NeutralReference::Level { level, span } => {
                if span <= 0.0 {
                    return 0.0;
                }
                (result.value - level) / span
            }
            NeutralReference::PriceRelative { full_scale } => {
                if result.value == 0.0 || full_scale <= 0.0 {
                    return 0.0;
                }
                (result.last_close - result.value) / result.value / full_scale
            }
            NeutralReference::ZeroLine { full_scale } => {
                if result.last_close == 0.0 || full_scale <= 0.0 {
                    return 0.0;
                }
                result.value / result.last_close / full_scale
            }
        };
        raw.clamp(-1.0, 1.0)
    }
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 7] = [
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Rsi,
        IndicatorKind::BollingerBands,
        IndicatorKind::Stochastic,
        IndicatorKind::Macd,
        IndicatorKind::WilliamsR,
    ];

    pub fn short_code(&self) -> &'static str {
        self.descriptor().short_code
    }

    pub fn descriptor(&self) -> IndicatorDescriptor {
        match self {
            IndicatorKind::Sma => IndicatorDescriptor {
                display_name: "Simple Moving Average",
                short_code: "SMA",
                description: "Arithmetic mean of the last N closes",
            },
            IndicatorKind::Ema => IndicatorDescriptor {
                display_name: "Exponential Moving Average",
                short_code: "EMA",
                description: "Moving average weighting recent closes by 2/(N+1)",
            },
            IndicatorKind::Rsi => IndicatorDescriptor {
                display_name: "Relative Strength Index",
                short_code: "RSI",
                description: "Wilder momentum oscillator from average gains and losses, 0-100",
            },
            IndicatorKind::BollingerBands => IndicatorDescriptor {
                display_name: "Bollinger Bands",
                short_code: "BB",
                description: "SMA midline with bands two standard deviations away",
            },
            IndicatorKind::Stochastic => IndicatorDescriptor {
                display_name: "Stochastic Oscillator",
                short_code: "STOCH",
                description: "Position of the close within the N-period high/low range, 0-100",
            },
            IndicatorKind::Macd => IndicatorDescriptor {
                display_name: "Moving Average Convergence Divergence",
                short_code: "MACD",
                description: "EMA(12) minus EMA(26) with an EMA(9) signal line",
            },
            IndicatorKind::WilliamsR => IndicatorDescriptor {
                display_name: "Williams %R",
                short_code: "WILLR",
                description: "Distance of the close below the N-period high, -100 to 0",
            },
        }
    }

    /// Suggested `(min, max)` period for input validation and UI hints
    pub fn default_period_range(&self) -> (usize, usize) {
        match self {
            IndicatorKind::Sma | IndicatorKind::Ema => (2, 200),
            IndicatorKind::Rsi => (2, 50),
            IndicatorKind::BollingerBands => (5, 100),
            IndicatorKind::Stochastic | IndicatorKind::WilliamsR => (5, 50),
            IndicatorKind::Macd => (12, 26),
        }
    }

    /// Conventional period when the caller has no preference
    pub fn default_period(&self) -> usize {
        match self {
            IndicatorKind::Sma | IndicatorKind::Ema | IndicatorKind::BollingerBands => 20,
            IndicatorKind::Rsi | IndicatorKind::Stochastic | IndicatorKind::WilliamsR => 14,
            IndicatorKind::Macd => 26,
        }
    }

    pub fn neutral_reference(&self) -> NeutralReference {
        match self {
            IndicatorKind::Sma | IndicatorKind::Ema | IndicatorKind::BollingerBands => {
                NeutralReference::PriceRelative { full_scale: 0.05 }
            }
            IndicatorKind::Rsi | IndicatorKind::Stochastic => NeutralReference::Level {
                level: 50.0,
                span: 50.0,
            },
            IndicatorKind::WilliamsR => NeutralReference::Level {
                level: -50.0,
                span: 50.0,
            },
            IndicatorKind::Macd => NeutralReference::ZeroLine { full_scale: 0.01 },
        }
    }

    /// Whether the indicator reads highs and lows, not just closes
    pub fn uses_range(&self) -> bool {
        matches!(self, IndicatorKind::Stochastic | IndicatorKind::WilliamsR)
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_code())
    }
}

impl FromStr for IndicatorKind {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        IndicatorKind::ALL
            .into_iter()
            .find(|k| k.short_code() == code)
            .ok_or_else(|| MarketError::invalid(format!("unknown indicator type '{}'", s)))
    }
}
