pub mod binance;

pub use binance::{BinanceRestSource, RestError, is_supported_interval};
