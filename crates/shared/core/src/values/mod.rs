use chrono::{DateTime, Utc};

mod timeframe;

pub use timeframe::Timeframe;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Symbol identifier for a tradeable pair (e.g. "BTCUSDT")
pub type Symbol = String;
