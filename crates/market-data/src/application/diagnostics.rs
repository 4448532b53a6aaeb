use confluence_cache::CacheStatistics;
use confluence_resilience::{BreakerSnapshot, CircuitStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// Cache and circuit-breaker state for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketDataDiagnostics {
    /// Totals across every cache below
    pub cache: CacheStatistics,
    pub caches: BTreeMap<String, CacheStatistics>,
    pub breakers: Vec<BreakerSnapshot>,
}

impl MarketDataDiagnostics {
    pub fn new(caches: BTreeMap<String, CacheStatistics>, breakers: Vec<BreakerSnapshot>) -> Self {
        let cache = caches
            .values()
            .fold(CacheStatistics::default(), |total, s| total.merge(*s));
        Self {
            cache,
            caches,
            breakers,
        }
    }

    /// Fold in another component's caches; breakers are shared, so they
    /// are not merged
    pub fn with_caches(
        mut self,
        caches: impl IntoIterator<Item = (String, CacheStatistics)>,
    ) -> Self {
        for (name, stats) in caches {
            self.cache = self.cache.merge(stats);
            self.caches.insert(name, stats);
        }
        self
    }

    /// Breakers currently rejecting calls
    pub fn open_breakers(&self) -> impl Iterator<Item = &BreakerSnapshot> {
        self.breakers
            .iter()
            .filter(|b| b.status == CircuitStatus::Open)
    }
}
