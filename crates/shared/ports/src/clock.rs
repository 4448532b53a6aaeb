use async_trait::async_trait;
use confluence_core::{MarketResult, Timestamp};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Port for time abstraction
///
/// This allows the system to use different time sources:
/// - Real system time for production
/// - Fixed time that only moves when told to, for deterministic tests
///
/// Cache expiry, circuit-breaker windows and retry backoff all read time
/// through this trait.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Wait for `duration`, returning `MarketError::Cancelled` early if
    /// `cancel` fires first
    async fn delay(&self, duration: Duration, cancel: &CancellationToken) -> MarketResult<()>;

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
