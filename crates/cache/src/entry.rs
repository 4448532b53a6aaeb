use chrono::{DateTime, Duration as ChronoDuration, Utc};
use confluence_core::Timestamp;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

use crate::options::{CacheOptions, CachePriority};

/// Error type carried by background refreshes
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Re-runs the factory that produced an entry
pub(crate) type RefreshFn<V> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<V, BoxError>> + Send + Sync>;

pub(crate) fn after(now: Timestamp, d: Duration) -> Timestamp {
    ChronoDuration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) struct CacheEntry<V> {
    pub value: V,
    pub computed_at: Timestamp,
    pub absolute_expiry: Timestamp,
    pub sliding_expiry: Option<Timestamp>,
    pub last_access: Timestamp,
    pub tags: Vec<String>,
    pub priority: CachePriority,
    pub refresh: Option<RefreshFn<V>>,
    pub weight: usize,
    expiration: Duration,
    sliding: Option<Duration>,
    refresh_threshold: f64,
}

impl<V> CacheEntry<V> {
    pub fn new(
        value: V,
        now: Timestamp,
        options: &CacheOptions,
        refresh: Option<RefreshFn<V>>,
        weight: usize,
    ) -> Self {
        Self {
            value,
            computed_at: now,
            absolute_expiry: after(now, options.expiration),
            sliding_expiry: options.sliding_expiration.map(|s| after(now, s)),
            last_access: now,
            tags: options.tags.clone(),
            priority: options.priority,
            refresh: if options.enable_background_refresh {
                refresh
            } else {
                None
            },
            weight,
            expiration: options.expiration,
            sliding: options.sliding_expiration,
            refresh_threshold: options.background_refresh_threshold,
        }
    }

    /// Earliest of the absolute and sliding deadlines
    pub fn expires_at(&self) -> Timestamp {
        match self.sliding_expiry {
            Some(sliding) => sliding.min(self.absolute_expiry),
            None => self.absolute_expiry,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at()
    }

    /// Record a hit, renewing the sliding deadline
    pub fn touch(&mut self, now: Timestamp) {
        self.last_access = now;
        if let Some(sliding) = self.sliding {
            self.sliding_expiry = Some(after(now, sliding));
        }
    }

    /// Share of the absolute lifetime used up at `now`
    pub fn elapsed_fraction(&self, now: Timestamp) -> f64 {
        let elapsed = (now - self.computed_at).to_std().unwrap_or(Duration::ZERO);
        elapsed.as_secs_f64() / self.expiration.as_secs_f64()
    }

    /// The refresh factory, if a refresh is due at `now`
    pub fn refresh_due(&self, now: Timestamp) -> Option<RefreshFn<V>> {
        let refresh = self.refresh.as_ref()?;
        (self.elapsed_fraction(now) >= self.refresh_threshold).then(|| refresh.clone())
    }

    /// Swap in a refreshed value and restart both lifetimes
    pub fn replace(&mut self, value: V, now: Timestamp, weight: usize) {
        self.value = value;
        self.computed_at = now;
        self.absolute_expiry = after(now, self.expiration);
        self.sliding_expiry = self.sliding.map(|s| after(now, s));
        self.weight = weight;
    }
}
