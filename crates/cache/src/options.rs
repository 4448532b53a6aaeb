use confluence_core::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Eviction hint used when the cache is over capacity
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
    /// Never evicted for capacity; still expires
    NeverRemove,
}

/// Per-entry caching policy
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    /// Absolute lifetime from the moment the value is computed
    pub expiration: Duration,
    /// Idle lifetime, renewed on every hit; never outlives `expiration`
    pub sliding_expiration: Option<Duration>,
    pub tags: Vec<String>,
    pub priority: CachePriority,
    pub enable_background_refresh: bool,
    /// Fraction of `expiration` after which a hit triggers a background refresh
    pub background_refresh_threshold: f64,
}

pub const DEFAULT_REFRESH_THRESHOLD: f64 = 0.8;

impl CacheOptions {
    pub fn new(expiration: Duration) -> Self {
        Self {
            expiration,
            sliding_expiration: None,
            tags: Vec::new(),
            priority: CachePriority::Normal,
            enable_background_refresh: false,
            background_refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
        }
    }

    pub fn with_sliding_expiration(mut self, sliding: Duration) -> Self {
        self.sliding_expiration = Some(sliding);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Refresh in the background once `threshold` of the lifetime has elapsed
    pub fn with_background_refresh(mut self, threshold: f64) -> Self {
        self.enable_background_refresh = true;
        self.background_refresh_threshold = threshold;
        self
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.expiration.is_zero() {
            return Err(MarketError::invalid("cache expiration must be positive"));
        }
        if self.sliding_expiration.is_some_and(|s| s.is_zero()) {
            return Err(MarketError::invalid("sliding expiration must be positive"));
        }
        if self.enable_background_refresh
            && !(self.background_refresh_threshold > 0.0 && self.background_refresh_threshold < 1.0)
        {
            return Err(MarketError::invalid(format!(
                "background refresh threshold must be in (0, 1), got {}",
                self.background_refresh_threshold
            )));
        }
        Ok(())
    }
}

/// Engine-wide limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Background refreshes allowed to run at once across all keys
    pub max_concurrent_refreshes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_concurrent_refreshes: 4,
        }
    }
}
