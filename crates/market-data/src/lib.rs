//! Market data facades
//!
//! Composes the computation crates with the infrastructure ones into the
//! two entry points the rest of the platform uses:
//!
//! - [`CachedMarketData`]: exchange calls behind the resilience pipeline and
//!   a stale-while-revalidate cache. At most one upstream fetch runs per
//!   cache key.
//! - [`IndicatorService`]: indicator values and multi-timeframe alignment,
//!   cached per data-window fingerprint.
//!
//! ```text
//! ┌──────────────────────┐
//! │   IndicatorService   │  results keyed by (symbol, kind, period, tf, fingerprint)
//! └──────────┬───────────┘
//!            │ candle/price windows
//!            ▼
//! ┌──────────────────────┐
//! │   CachedMarketData   │  CacheEngine ──miss──► ResiliencePipeline
//! └──────────┬───────────┘
//!            │ ExchangeDataSource
//!            ▼
//! ┌──────────────────────┐
//! │  BinanceRestSource   │  /api/v3/ticker/price, /api/v3/klines
//! └──────────────────────┘
//! ```

pub mod application;
pub mod config;
pub mod infrastructure;

pub use application::{CachedMarketData, IndicatorService, MarketDataDiagnostics};
pub use config::{
    AlignmentConfig, CacheSettings, ConfigError, ExchangeConfig, PlatformConfig, WatchConfig,
    load_config, load_config_from_str, load_default_config,
};
pub use infrastructure::{BinanceRestSource, RestError};
