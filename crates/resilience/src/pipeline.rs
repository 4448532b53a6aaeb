use confluence_core::{MarketError, MarketResult};
use confluence_ports::{CancellationToken, Clock};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::breaker::{
    Admission, BreakerConfig, BreakerSnapshot, CallOutcome, CircuitBreakerState, CircuitStatus,
};
use crate::config::ResilienceConfig;
use crate::retry::RetryPolicy;

/// Runs upstream operations through retry and a per-key circuit breaker
///
/// Each operation key owns its own breaker behind its own lock, so a
/// failing symbol never blocks calls for another.
pub struct ResiliencePipeline {
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    breaker: BreakerConfig,
    breakers: DashMap<String, Mutex<CircuitBreakerState>>,
}

impl ResiliencePipeline {
    pub fn new(clock: Arc<dyn Clock>, config: &ResilienceConfig) -> Self {
        Self::with_policies(clock, config.retry_policy(), config.breaker_config())
    }

    pub fn with_policies(
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        breaker: BreakerConfig,
    ) -> Self {
        Self {
            clock,
            retry,
            breaker,
            breakers: DashMap::new(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Execute `op` under `key`'s breaker, retrying transient failures
    ///
    /// `op` is called once per attempt. Errors:
    /// - `CircuitOpen` when the breaker rejects the first attempt
    /// - `ExchangeUnavailable` once retries run out, or when the breaker
    ///   opens part-way through
    /// - `Cancelled` when `cancel` fires; the attempt is not counted
    /// - any non-transient error from `op`, unchanged and unretried
    pub async fn execute<T, F, Fut>(
        &self,
        key: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> MarketResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MarketResult<T>>,
    {
        let max_attempts = self.retry.max_attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(MarketError::Cancelled);
            }
            if let Admission::Rejected { retry_at } = self.admit(key) {
                if attempt == 1 {
                    debug!(operation = key, "Circuit open, failing fast");
                    return Err(MarketError::CircuitOpen {
                        operation: key.to_string(),
                        retry_at,
                    });
                }
                return Err(MarketError::ExchangeUnavailable {
                    attempts: attempt - 1,
                    last_error,
                });
            }

            let attempt_guard = AttemptGuard::arm(self, key);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(self.retry.timeout, op()) => Some(result),
            };
            attempt_guard.disarm();

            let error = match outcome {
                None => {
                    self.record(key, CallOutcome::Cancelled);
                    return Err(MarketError::Cancelled);
                }
                Some(Ok(Ok(value))) => {
                    self.record(key, CallOutcome::Success);
                    return Ok(value);
                }
                Some(Ok(Err(MarketError::Cancelled))) => {
                    self.record(key, CallOutcome::Cancelled);
                    return Err(MarketError::Cancelled);
                }
                Some(Ok(Err(e))) if !e.is_transient() => {
                    // The upstream answered; the request itself was bad
                    self.record(key, CallOutcome::Success);
                    return Err(e);
                }
                Some(Ok(Err(e))) => e.to_string(),
                Some(Err(_)) => format!("attempt timed out after {:?}", self.retry.timeout),
            };

            let status = self.record(key, CallOutcome::Failure(error.clone()));
            last_error = error;

            if attempt == max_attempts {
                break;
            }
            if status == CircuitStatus::Open {
                warn!(
                    operation = key,
                    attempts = attempt,
                    error = %last_error,
                    "Circuit opened during retries"
                );
                return Err(MarketError::ExchangeUnavailable {
                    attempts: attempt,
                    last_error,
                });
            }

            let delay = self.retry.backoff(attempt);
            debug!(
                operation = key,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Retrying after transient failure"
            );
            self.clock.delay(delay, cancel).await?;
        }

        warn!(
            operation = key,
            attempts = max_attempts,
            error = %last_error,
            "Retries exhausted"
        );
        Err(MarketError::ExchangeUnavailable {
            attempts: max_attempts,
            last_error,
        })
    }

    fn admit(&self, key: &str) -> Admission {
        let now = self.clock.now();
        let entry = self
            .breakers
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(CircuitBreakerState::new(now)));
        let mut state = entry.lock();
        let (next, admission) = state.admit(now, &self.breaker);
        log_transition(key, state.status, next.status);
        *state = next;
        admission
    }

    fn record(&self, key: &str, outcome: CallOutcome) -> CircuitStatus {
        let now = self.clock.now();
        let Some(entry) = self.breakers.get(key) else {
            return CircuitStatus::Closed;
        };
        let mut state = entry.lock();
        let next = state.record(&outcome, now, &self.breaker);
        log_transition(key, state.status, next.status);
        *state = next;
        state.status
    }

    /// Current breaker state for `key`, if it has ever been used
    pub fn breaker_state(&self, key: &str) -> Option<CircuitBreakerState> {
        self.breakers.get(key).map(|entry| entry.lock().clone())
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| BreakerSnapshot::of(entry.key(), &entry.value().lock()))
            .collect();
        snapshots.sort_by(|a, b| a.operation.cmp(&b.operation));
        snapshots
    }

    /// Close `key`'s breaker by hand; returns false for an unknown key
    pub fn reset(&self, key: &str) -> bool {
        let Some(entry) = self.breakers.get(key) else {
            return false;
        };
        let mut state = entry.lock();
        let next = state.reset(self.clock.now());
        log_transition(key, state.status, next.status);
        *state = next;
        true
    }
}

/// Reports an attempt as cancelled if the `execute` future is dropped
/// while the attempt is running
struct AttemptGuard<'a> {
    pipeline: &'a ResiliencePipeline,
    key: &'a str,
    armed: bool,
}

impl<'a> AttemptGuard<'a> {
    fn arm(pipeline: &'a ResiliencePipeline, key: &'a str) -> Self {
        Self {
            pipeline,
            key,
            armed: true,
        }
    }

    /// The attempt finished and its outcome is recorded by the caller
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pipeline.record(self.key, CallOutcome::Cancelled);
        }
    }
}

fn log_transition(key: &str, from: CircuitStatus, to: CircuitStatus) {
    if from == to {
        return;
    }
    match to {
        CircuitStatus::Open => warn!(operation = key, ?from, "Circuit breaker opened"),
        CircuitStatus::HalfOpen => {
            info!(operation = key, "Circuit breaker half-open, allowing trial")
        }
        CircuitStatus::Closed => info!(operation = key, ?from, "Circuit breaker closed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confluence_clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn config() -> ResilienceConfig {
        ResilienceConfig {
            max_retry_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            timeout_ms: 1_000,
            circuit_breaker_threshold: 3,
            sampling_duration_ms: 60_000,
            minimum_throughput: 3,
            break_duration_ms: 30_000,
        }
    }

    fn pipeline() -> (Arc<ManualClock>, ResiliencePipeline) {
        let clock = ManualClock::new();
        let pipeline = ResiliencePipeline::new(clock.clone(), &config());
        (clock, pipeline)
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let (_, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let value = pipeline
            .execute("price:BTCUSDT", &cancel, || async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
        let state = pipeline.breaker_state("price:BTCUSDT").unwrap();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.success_count, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let (clock, pipeline) = pipeline();
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let value = pipeline
            .execute("op", &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(MarketError::upstream("503"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            clock.recorded_delays(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_exchange_unavailable() {
        let (_, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let result: MarketResult<()> = pipeline
            .execute("op", &cancel, || async { Err(MarketError::upstream("502 Bad Gateway")) })
            .await;
        match result {
            Err(MarketError::ExchangeUnavailable {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("502"));
            }
            other => panic!("expected ExchangeUnavailable, got {:?}", other),
        }
        // Third failure met the threshold
        assert!(pipeline.breaker_state("op").unwrap().is_open());
    }

    #[tokio::test]
    async fn test_open_breaker_fails_fast_without_calling() {
        let (clock, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let _ = pipeline
            .execute("op", &cancel, || async {
                Err::<(), _>(MarketError::upstream("down"))
            })
            .await;
        let delays_before = clock.recorded_delays().len();

        let calls = AtomicU32::new(0);
        let result = pipeline
            .execute("op", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(
            result,
            Err(MarketError::CircuitOpen { ref operation, retry_at: Some(_) }) if operation == "op"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(clock.recorded_delays().len(), delays_before);
    }

    #[tokio::test]
    async fn test_half_open_trial_drives_next_state() {
        let (clock, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let _ = pipeline
            .execute("op", &cancel, || async {
                Err::<(), _>(MarketError::upstream("down"))
            })
            .await;

        clock.advance(Duration::from_secs(31));
        let calls = AtomicU32::new(0);
        // Failed trial: reopens without retrying
        let result: MarketResult<()> = pipeline
            .execute("op", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(MarketError::upstream("still down")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(MarketError::ExchangeUnavailable { attempts: 1, .. })));
        assert!(pipeline.breaker_state("op").unwrap().is_open());

        clock.advance(Duration::from_secs(31));
        let value = pipeline
            .execute("op", &cancel, || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(
            pipeline.breaker_state("op").unwrap().status,
            CircuitStatus::Closed
        );
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried_or_counted() {
        let (_, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let result: MarketResult<()> = pipeline
                .execute("op", &cancel, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(MarketError::invalid("bad symbol")) }
                })
                .await;
            assert!(matches!(result, Err(MarketError::InvalidParameter(_))));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let state = pipeline.breaker_state("op").unwrap();
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.failure_count, 0);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_a_failure() {
        let (_, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let result: MarketResult<()> = pipeline
            .execute("op", &cancel, || {
                trigger.cancel();
                std::future::pending()
            })
            .await;
        assert_eq!(result, Err(MarketError::Cancelled));
        let state = pipeline.breaker_state("op").unwrap();
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.success_count, 0);
    }

    #[tokio::test]
    async fn test_dropped_trial_releases_half_open() {
        let (clock, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let _ = pipeline
            .execute("op", &cancel, || async {
                Err::<(), _>(MarketError::upstream("down"))
            })
            .await;
        clock.advance(Duration::from_secs(31));

        // Trial admitted, then the caller gives up by dropping the future
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            pipeline.execute("op", &cancel, || std::future::pending::<MarketResult<()>>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(
            pipeline.breaker_state("op").unwrap().status,
            CircuitStatus::HalfOpen
        );

        // The next caller gets the trial
        assert_eq!(pipeline.execute("op", &cancel, || async { Ok(5) }).await, Ok(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let (_, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let result: MarketResult<()> = pipeline
            .execute("slow", &cancel, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        match result {
            Err(MarketError::ExchangeUnavailable { last_error, .. }) => {
                assert!(last_error.contains("timed out"))
            }
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_keys_are_isolated_and_resettable() {
        let (_, pipeline) = pipeline();
        let cancel = CancellationToken::new();
        let _ = pipeline
            .execute("a", &cancel, || async {
                Err::<(), _>(MarketError::upstream("down"))
            })
            .await;
        assert!(pipeline.execute("b", &cancel, || async { Ok(1) }).await.is_ok());

        let snapshots = pipeline.breaker_snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].operation, "a");
        assert_eq!(snapshots[0].status, CircuitStatus::Open);
        assert_eq!(snapshots[1].status, CircuitStatus::Closed);

        assert!(pipeline.reset("a"));
        assert!(!pipeline.reset("missing"));
        assert!(pipeline.execute("a", &cancel, || async { Ok(2) }).await.is_ok());
    }
}
