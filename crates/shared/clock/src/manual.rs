use async_trait::async_trait;
use chrono::Utc;
use confluence_core::{MarketError, MarketResult, Timestamp};
use confluence_ports::{CancellationToken, Clock};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;

/// Deterministic clock for tests and replays
///
/// Time stays fixed until [`advance`](ManualClock::advance) or
/// [`set_time`](ManualClock::set_time) moves it. `delay` moves the clock
/// forward by the requested duration and returns immediately; every delay
/// is recorded so tests can assert on backoff schedules.
pub struct ManualClock {
    current_time: RwLock<Timestamp>,
    delays: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Create a manual clock frozen at the current wall time
    pub fn new() -> Arc<Self> {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(initial_time: Timestamp) -> Arc<Self> {
        Arc::new(Self {
            current_time: RwLock::new(initial_time),
            delays: Mutex::new(Vec::new()),
        })
    }

    /// Advance the clock by a specified duration
    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let mut current = self.current_time.write();
        *current += step;
    }

    /// Explicitly set the time
    ///
    /// Warning: This can move time backwards. Use with caution.
    pub fn set_time(&self, time: Timestamp) {
        *self.current_time.write() = time;
    }

    /// Every duration passed to `delay` so far, in call order
    pub fn recorded_delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current_time.read()
    }

    async fn delay(&self, duration: Duration, cancel: &CancellationToken) -> MarketResult<()> {
        if cancel.is_cancelled() {
            return Err(MarketError::Cancelled);
        }
        self.delays.lock().push(duration);
        self.advance(duration);
        // Let other tasks observe the new time before we resume
        tokio::task::yield_now().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
