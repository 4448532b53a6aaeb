use confluence_cache::{CacheConfig, CacheOptions};
use confluence_core::Timeframe;
use confluence_resilience::ResilienceConfig;
use confluence_timeframe::{
    AlignmentThresholds, STRONG_ALIGNMENT_THRESHOLD, STRONG_CONFLUENCE_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root of the platform configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Kline interval fetched from the exchange; coarser timeframes are
    /// resampled from it
    #[serde(default = "default_base_interval")]
    pub base_interval: Timeframe,
    /// Klines per request (Binance caps this at 1000)
    #[serde(default = "default_request_limit")]
    pub request_limit: u32,
    /// Bars fetched beyond an indicator's minimum so smoothed indicators settle
    #[serde(default = "default_warmup_bars")]
    pub warmup_bars: usize,
}

fn default_rest_url() -> String {
    "https://api.binance.com".to_string()
}
fn default_base_interval() -> Timeframe {
    Timeframe::M15
}
fn default_request_limit() -> u32 {
    1000
}
fn default_warmup_bars() -> usize {
    50
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            base_interval: default_base_interval(),
            request_limit: default_request_limit(),
            warmup_bars: default_warmup_bars(),
        }
    }
}

/// TTLs and limits for the facade caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_price_ttl")]
    pub price_ttl_ms: u64,
    #[serde(default = "default_candle_ttl")]
    pub candle_ttl_ms: u64,
    #[serde(default = "default_indicator_ttl")]
    pub indicator_ttl_ms: u64,
    /// Fraction of a raw-data entry's TTL after which a hit refreshes it
    #[serde(default = "default_refresh_threshold")]
    pub background_refresh_threshold: f64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_concurrent_refreshes")]
    pub max_concurrent_refreshes: usize,
}

fn default_price_ttl() -> u64 {
    5_000
}
fn default_candle_ttl() -> u64 {
    60_000
}
fn default_indicator_ttl() -> u64 {
    60_000
}
fn default_refresh_threshold() -> f64 {
    confluence_cache::DEFAULT_REFRESH_THRESHOLD
}
fn default_max_entries() -> usize {
    10_000
}
fn default_max_concurrent_refreshes() -> usize {
    4
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            price_ttl_ms: default_price_ttl(),
            candle_ttl_ms: default_candle_ttl(),
            indicator_ttl_ms: default_indicator_ttl(),
            background_refresh_threshold: default_refresh_threshold(),
            max_entries: default_max_entries(),
            max_concurrent_refreshes: default_max_concurrent_refreshes(),
        }
    }
}

impl CacheSettings {
    pub fn price_ttl(&self) -> Duration {
        Duration::from_millis(self.price_ttl_ms)
    }

    pub fn candle_ttl(&self) -> Duration {
        Duration::from_millis(self.candle_ttl_ms)
    }

    pub fn indicator_ttl(&self) -> Duration {
        Duration::from_millis(self.indicator_ttl_ms)
    }

    pub fn engine_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.max_entries,
            max_concurrent_refreshes: self.max_concurrent_refreshes,
        }
    }

    /// Options for raw exchange data under `symbol`: short TTL, refreshed
    /// in the background
    pub fn raw_options(&self, ttl: Duration, symbol: &str) -> CacheOptions {
        CacheOptions::new(ttl)
            .with_tag(symbol)
            .with_background_refresh(self.background_refresh_threshold)
    }

    /// Options for results derived from `symbol`'s data
    pub fn derived_options(&self, symbol: &str) -> CacheOptions {
        CacheOptions::new(self.indicator_ttl()).with_tag(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default = "default_strong_alignment")]
    pub strong_alignment_threshold: f64,
    #[serde(default = "default_strong_confluence")]
    pub strong_confluence_threshold: f64,
}

fn default_strong_alignment() -> f64 {
    STRONG_ALIGNMENT_THRESHOLD
}
fn default_strong_confluence() -> f64 {
    STRONG_CONFLUENCE_THRESHOLD
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            strong_alignment_threshold: default_strong_alignment(),
            strong_confluence_threshold: default_strong_confluence(),
        }
    }
}

impl AlignmentConfig {
    pub fn thresholds(&self) -> AlignmentThresholds {
        AlignmentThresholds {
            strong_alignment: self.strong_alignment_threshold,
            strong_confluence: self.strong_confluence_threshold,
        }
    }
}

/// What the runner computes on start-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Indicator short code, e.g. `"RSI"`
    #[serde(default = "default_indicator")]
    pub indicator: String,
    #[serde(default = "default_period")]
    pub period: usize,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}
fn default_indicator() -> String {
    "RSI".to_string()
}
fn default_period() -> usize {
    14
}
fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::H1, Timeframe::H4, Timeframe::D1]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            indicator: default_indicator(),
            period: default_period(),
            timeframes: default_timeframes(),
        }
    }
}
