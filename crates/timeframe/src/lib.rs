//! Multi-timeframe analysis
//!
//! [`TimeframeResampler`] turns base-interval candles into coarser bars;
//! [`AlignmentEngine`] scores how consistently one indicator points the same
//! way across those timeframes.

mod alignment;
mod resampler;

pub use alignment::{
    AlignmentEngine, AlignmentThresholds, STRONG_ALIGNMENT_THRESHOLD, STRONG_CONFLUENCE_THRESHOLD,
    TimeframeAlignment, TimeframeReading, TrendDirection,
};
pub use resampler::{TimeframeResampler, resample};
