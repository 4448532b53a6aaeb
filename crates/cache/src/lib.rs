//! Stale-while-revalidate cache
//!
//! [`CacheEngine`] memoizes both raw exchange responses and computed
//! indicator results. Entries carry an absolute TTL, an optional sliding
//! TTL, tags for group invalidation, and optionally the factory that built
//! them so hits late in an entry's life can refresh it in the background.

mod engine;
mod entry;
mod options;
mod stats;

pub use engine::CacheEngine;
pub use entry::BoxError;
pub use options::{CacheConfig, CacheOptions, CachePriority, DEFAULT_REFRESH_THRESHOLD};
pub use stats::CacheStatistics;
