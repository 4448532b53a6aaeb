//! Technical indicator algorithms
//!
//! Every algorithm computes one [`IndicatorResult`] from a time-ascending
//! [`PriceSeries`]. The set of indicators is closed: [`IndicatorKind`] lists
//! them, [`Indicator`] wraps the concrete algorithms, and
//! [`IndicatorFactory`] validates parameters and hands out instances.
//!
//! ```text
//!  IndicatorKind ──► IndicatorFactory::create(kind, period)
//!                                  │
//!                                  ▼
//!                             Indicator ──calculate(&PriceSeries)──► IndicatorResult
//! ```
//!
//! [`IndicatorResult`]: confluence_core::IndicatorResult
//! [`PriceSeries`]: confluence_core::PriceSeries

mod algorithm;
mod bollinger;
mod factory;
mod kind;
mod macd;
mod moving_average;
mod oscillators;
mod rsi;

pub use algorithm::IndicatorAlgorithm;
pub use bollinger::{BollingerBands, DEFAULT_BAND_WIDTH};
pub use factory::{Indicator, IndicatorFactory};
pub use kind::{IndicatorDescriptor, IndicatorKind, NeutralReference};
pub use macd::{MACD_FAST_PERIOD, MACD_SIGNAL_PERIOD, MACD_SLOW_PERIOD, Macd};
pub use moving_average::{ExponentialMovingAverage, SimpleMovingAverage};
pub use oscillators::{
    STOCHASTIC_DEGENERATE_K, STOCHASTIC_SMOOTHING, StochasticOscillator, WILLIAMS_DEGENERATE_R,
    WilliamsR,
};
pub use rsi::RelativeStrengthIndex;
