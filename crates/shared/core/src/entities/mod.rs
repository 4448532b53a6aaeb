mod candle;
mod indicator_result;
mod price_sample;

pub use candle::{Candle, CandleKind, DOJI_BODY_RATIO};
pub use indicator_result::{AuxiliaryOutput, IndicatorResult};
pub use price_sample::{MAX_PRICE_VALUE, PriceSample};
