//! Confluence Core Domain
//!
//! Pure domain types for the Confluence market-data platform.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod error;
pub mod series;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    AuxiliaryOutput, Candle, CandleKind, DOJI_BODY_RATIO, IndicatorResult, MAX_PRICE_VALUE,
    PriceSample,
};
pub use error::{MarketError, MarketResult};
pub use series::PriceSeries;
pub use values::{Symbol, Timeframe, Timestamp};
