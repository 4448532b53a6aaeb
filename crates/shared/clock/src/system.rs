use async_trait::async_trait;
use chrono::Utc;
use confluence_core::{MarketError, MarketResult, Timestamp};
use confluence_ports::{CancellationToken, Clock};
use std::time::Duration;

/// Real system clock for production use
///
/// This simply returns the current wall-clock time and sleeps on the tokio
/// timer.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    async fn delay(&self, duration: Duration, cancel: &CancellationToken) -> MarketResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(MarketError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
