use confluence_indicators::IndicatorKind;
use std::path::Path;
use thiserror::Error;

use super::types::PlatformConfig;
use crate::infrastructure::binance::is_supported_interval;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load platform configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PlatformConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<PlatformConfig, ConfigError> {
    let config: PlatformConfig = serde_json::from_str(json)?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<PlatformConfig, ConfigError> {
    let default_config = include_str!("platform_config.json");
    load_config_from_str(default_config)
}

impl PlatformConfig {
    /// Indicator named by `watch.indicator`
    pub fn watch_indicator(&self) -> Result<IndicatorKind, ConfigError> {
        self.watch
            .indicator
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("watch.indicator: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let exchange = &self.exchange;
        if exchange.rest_url.trim().is_empty() {
            return Err(ConfigError::Invalid("exchange.rest_url is empty".into()));
        }
        if !is_supported_interval(exchange.base_interval) {
            return Err(ConfigError::Invalid(format!(
                "exchange.base_interval '{}' is not a kline interval",
                exchange.base_interval
            )));
        }
        if !(1..=1000).contains(&exchange.request_limit) {
            return Err(ConfigError::Invalid(format!(
                "exchange.request_limit must be in 1..=1000, got {}",
                exchange.request_limit
            )));
        }

        let cache = &self.cache;
        for (name, ttl) in [
            ("price_ttl_ms", cache.price_ttl_ms),
            ("candle_ttl_ms", cache.candle_ttl_ms),
            ("indicator_ttl_ms", cache.indicator_ttl_ms),
        ] {
            if ttl == 0 {
                return Err(ConfigError::Invalid(format!("cache.{} must be positive", name)));
            }
        }
        if !(cache.background_refresh_threshold > 0.0 && cache.background_refresh_threshold < 1.0)
        {
            return Err(ConfigError::Invalid(format!(
                "cache.background_refresh_threshold must be in (0, 1), got {}",
                cache.background_refresh_threshold
            )));
        }
        if cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be positive".into()));
        }

        self.resilience
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("resilience: {}", e)))?;

        let alignment = &self.alignment;
        for (name, value) in [
            ("strong_alignment_threshold", alignment.strong_alignment_threshold),
            ("strong_confluence_threshold", alignment.strong_confluence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "alignment.{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }

        self.watch_indicator()?;
        if self.watch.period == 0 {
            return Err(ConfigError::Invalid("watch.period must be positive".into()));
        }
        if let Some(tf) = self
            .watch
            .timeframes
            .iter()
            .find(|tf| !exchange.base_interval.divides(**tf))
        {
            return Err(ConfigError::Invalid(format!(
                "watch timeframe {} is not a multiple of base interval {}",
                tf, exchange.base_interval
            )));
        }
        Ok(())
    }
}
