use confluence_core::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::retry::RetryPolicy;

/// Retry and circuit-breaker settings (JSON representation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Per-attempt timeout
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Failures inside the sampling window that open the breaker
    #[serde(default = "default_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_sampling_duration")]
    pub sampling_duration_ms: u64,
    /// Calls inside the sampling window needed before the breaker may open
    #[serde(default = "default_minimum_throughput")]
    pub minimum_throughput: u32,
    #[serde(default = "default_break_duration")]
    pub break_duration_ms: u64,
}

fn default_max_retry_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    200
}
fn default_max_delay() -> u64 {
    5_000
}
fn default_timeout() -> u64 {
    10_000
}
fn default_threshold() -> u32 {
    5
}
fn default_sampling_duration() -> u64 {
    60_000
}
fn default_minimum_throughput() -> u32 {
    5
}
fn default_break_duration() -> u64 {
    30_000
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            timeout_ms: default_timeout(),
            circuit_breaker_threshold: default_threshold(),
            sampling_duration_ms: default_sampling_duration(),
            minimum_throughput: default_minimum_throughput(),
            break_duration_ms: default_break_duration(),
        }
    }
}

impl ResilienceConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sampling_duration(&self) -> Duration {
        Duration::from_millis(self.sampling_duration_ms)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_millis(self.break_duration_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retry_attempts: self.max_retry_attempts,
            base_delay: self.base_delay(),
            max_delay: self.max_delay(),
            timeout: self.timeout(),
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.circuit_breaker_threshold,
            sampling_duration: self.sampling_duration(),
            minimum_throughput: self.minimum_throughput,
            break_duration: self.break_duration(),
        }
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.timeout_ms == 0 {
            return Err(MarketError::invalid("resilience.timeout_ms must be positive"));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(MarketError::invalid(
                "resilience.circuit_breaker_threshold must be positive",
            ));
        }
        if self.sampling_duration_ms == 0 {
            return Err(MarketError::invalid(
                "resilience.sampling_duration_ms must be positive",
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(MarketError::invalid(format!(
                "resilience.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}
