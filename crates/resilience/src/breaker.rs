//! Circuit breaker state machine
//!
//! Transitions are pure functions of `(state, event, now)`: [`admit`] decides
//! whether a call may start and [`record`] folds its outcome back in. The
//! pipeline owns one state per operation key and swaps in the returned
//! value under a short lock.
//!
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────► Open
//!     ▲       (throughput >= min)      │
//!     │                                │ break_duration elapsed
//!     │ trial succeeds                 ▼
//!     └─────────────────────────── HalfOpen ──trial fails──► Open
//! ```
//!
//! [`admit`]: CircuitBreakerState::admit
//! [`record`]: CircuitBreakerState::record

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use confluence_core::Timestamp;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CircuitStatus {
    /// Calls pass through
    Closed,
    /// Calls fail fast until `next_attempt`
    Open,
    /// One trial call decides whether to close or reopen
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub sampling_duration: Duration,
    pub minimum_throughput: u32,
    pub break_duration: Duration,
}

/// Whether a call may proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected { retry_at: Option<Timestamp> },
}

/// How an admitted call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure(String),
    /// Aborted by the caller; never counted
    Cancelled,
}

/// Breaker state for one operation key
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerState {
    pub status: CircuitStatus,
    /// Failures inside the current sampling window
    pub failure_count: u32,
    /// Successes inside the current sampling window
    pub success_count: u32,
    pub last_exception: Option<String>,
    pub last_state_change: Timestamp,
    pub next_attempt: Option<Timestamp>,
    /// Outcomes in the sampling window, oldest first (`true` = success)
    window: VecDeque<(Timestamp, bool)>,
    trial_in_flight: bool,
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

fn after(now: Timestamp, d: Duration) -> Timestamp {
    now.checked_add_signed(to_chrono(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn before(now: Timestamp, d: Duration) -> Timestamp {
    now.checked_sub_signed(to_chrono(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl CircuitBreakerState {
    pub fn new(now: Timestamp) -> Self {
        Self {
            status: CircuitStatus::Closed,
            failure_count: 0,
            success_count: 0,
            last_exception: None,
            last_state_change: now,
            next_attempt: None,
            window: VecDeque::new(),
            trial_in_flight: false,
        }
    }

    /// Decide whether a call may start at `now`
    ///
    /// An Open breaker whose break has elapsed moves to HalfOpen and admits
    /// exactly one trial; further calls are rejected until the trial reports.
    pub fn admit(&self, now: Timestamp, config: &BreakerConfig) -> (Self, Admission) {
        match self.status {
            CircuitStatus::Closed => (self.clone(), Admission::Allowed),
            CircuitStatus::Open => match self.next_attempt {
                Some(at) if now < at => (
                    self.clone(),
                    Admission::Rejected { retry_at: Some(at) },
                ),
                _ => {
                    let mut next = self.transition(CircuitStatus::HalfOpen, now);
                    next.trial_in_flight = true;
                    (next, Admission::Allowed)
                }
            },
            CircuitStatus::HalfOpen if self.trial_in_flight => (
                self.clone(),
                Admission::Rejected {
                    retry_at: Some(after(now, config.break_duration)),
                },
            ),
            CircuitStatus::HalfOpen => {
                let mut next = self.clone();
                next.trial_in_flight = true;
                (next, Admission::Allowed)
            }
        }
    }

    /// Fold the outcome of an admitted call into the state
    pub fn record(&self, outcome: &CallOutcome, now: Timestamp, config: &BreakerConfig) -> Self {
        match (self.status, outcome) {
            (_, CallOutcome::Cancelled) => {
                let mut next = self.clone();
                next.trial_in_flight = false;
                next
            }
            (CircuitStatus::HalfOpen, CallOutcome::Success) => {
                self.transition(CircuitStatus::Closed, now)
            }
            (CircuitStatus::HalfOpen, CallOutcome::Failure(reason)) => {
                let mut next = self.transition(CircuitStatus::Open, now);
                next.last_exception = Some(reason.clone());
                next.next_attempt = Some(after(now, config.break_duration));
                next
            }
            (CircuitStatus::Closed, outcome) => {
                let mut next = self.clone();
                let success = matches!(outcome, CallOutcome::Success);
                if let CallOutcome::Failure(reason) = outcome {
                    next.last_exception = Some(reason.clone());
                }
                next.window.push_back((now, success));
                next.prune(now, config);

                if next.failure_count >= config.failure_threshold
                    && next.window.len() as u32 >= config.minimum_throughput
                {
                    let last_exception = next.last_exception.clone();
                    next = next.transition(CircuitStatus::Open, now);
                    next.last_exception = last_exception;
                    next.next_attempt = Some(after(now, config.break_duration));
                }
                next
            }
            // Late outcomes of calls admitted before the breaker opened
            (CircuitStatus::Open, _) => self.clone(),
        }
    }

    /// Force the breaker closed
    pub fn reset(&self, now: Timestamp) -> Self {
        self.transition(CircuitStatus::Closed, now)
    }

    pub fn is_open(&self) -> bool {
        self.status == CircuitStatus::Open
    }

    fn prune(&mut self, now: Timestamp, config: &BreakerConfig) {
        let horizon = before(now, config.sampling_duration);
        while let Some(&(at, _)) = self.window.front() {
            if at > horizon {
                break;
            }
            self.window.pop_front();
        }
        self.success_count = self.window.iter().filter(|(_, ok)| *ok).count() as u32;
        self.failure_count = self.window.len() as u32 - self.success_count;
    }

    /// New state with counters and the sampling window cleared
    fn transition(&self, status: CircuitStatus, now: Timestamp) -> Self {
        Self {
            status,
            last_exception: self.last_exception.clone(),
            ..Self::new(now)
        }
    }
}

/// Read-only view of one breaker for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub operation: String,
    pub status: CircuitStatus,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_exception: Option<String>,
    pub last_state_change: Timestamp,
    pub next_attempt: Option<Timestamp>,
}

impl BreakerSnapshot {
    pub fn of(operation: &str, state: &CircuitBreakerState) -> Self {
        Self {
            operation: operation.to_string(),
            status: state.status,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_exception: state.last_exception.clone(),
            last_state_change: state.last_state_change,
            next_attempt: state.next_attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            sampling_duration: Duration::from_secs(60),
            minimum_throughput: 3,
            break_duration: Duration::from_secs(30),
        }
    }

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn fail(state: CircuitBreakerState, at: i64) -> CircuitBreakerState {
        let (state, admission) = state.admit(t(at), &config());
        assert_eq!(admission, Admission::Allowed);
        state.record(&CallOutcome::Failure("boom".into()), t(at), &config())
    }

    #[test]
    fn test_opens_at_threshold() {
        let mut state = CircuitBreakerState::new(t(0));
        state = fail(state, 1);
        state = fail(state, 2);
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.failure_count, 2);
        state = fail(state, 3);
        assert_eq!(state.status, CircuitStatus::Open);
        assert_eq!(state.next_attempt, Some(t(33)));
        assert_eq!(state.last_exception.as_deref(), Some("boom"));
        assert_eq!(state.last_state_change, t(3));

        let (_, admission) = state.admit(t(10), &config());
        assert_eq!(admission, Admission::Rejected { retry_at: Some(t(33)) });
    }

    #[test]
    fn test_failures_outside_window_are_forgotten() {
        let mut state = CircuitBreakerState::new(t(0));
        state = fail(state, 0);
        state = fail(state, 1);
        state = fail(state, 100);
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.failure_count, 1);
    }

    #[test]
    fn test_minimum_throughput_gates_opening() {
        let cfg = BreakerConfig {
            failure_threshold: 1,
            minimum_throughput: 3,
            ..config()
        };
        let mut state = CircuitBreakerState::new(t(0));
        state = state.record(&CallOutcome::Failure("x".into()), t(1), &cfg);
        state = state.record(&CallOutcome::Failure("x".into()), t(2), &cfg);
        assert_eq!(state.status, CircuitStatus::Closed);
        state = state.record(&CallOutcome::Success, t(3), &cfg);
        // 2 failures >= 1, throughput 3 >= 3
        assert_eq!(state.status, CircuitStatus::Open);
    }

    #[test]
    fn test_half_open_allows_single_trial() {
        let mut state = CircuitBreakerState::new(t(0));
        for at in 1..=3 {
            state = fail(state, at);
        }
        let (state, admission) = state.admit(t(33), &config());
        assert_eq!(admission, Admission::Allowed);
        assert_eq!(state.status, CircuitStatus::HalfOpen);

        let (state, second) = state.admit(t(34), &config());
        assert!(matches!(second, Admission::Rejected { .. }));

        let closed = state.record(&CallOutcome::Success, t(35), &config());
        assert_eq!(closed.status, CircuitStatus::Closed);
        assert_eq!(closed.failure_count, 0);
        assert_eq!(closed.next_attempt, None);

        let reopened = state.record(&CallOutcome::Failure("again".into()), t(35), &config());
        assert_eq!(reopened.status, CircuitStatus::Open);
        assert_eq!(reopened.next_attempt, Some(t(65)));
        assert_eq!(reopened.last_exception.as_deref(), Some("again"));
    }

    #[test]
    fn test_cancelled_trial_is_released_uncounted() {
        let mut state = CircuitBreakerState::new(t(0));
        for at in 1..=3 {
            state = fail(state, at);
        }
        let (state, _) = state.admit(t(40), &config());
        let state = state.record(&CallOutcome::Cancelled, t(41), &config());
        assert_eq!(state.status, CircuitStatus::HalfOpen);
        let (_, admission) = state.admit(t(42), &config());
        assert_eq!(admission, Admission::Allowed);
    }

    #[test]
    fn test_cancelled_not_counted_when_closed() {
        let state = CircuitBreakerState::new(t(0));
        let state = state.record(&CallOutcome::Cancelled, t(1), &config());
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.success_count, 0);
    }

    #[test]
    fn test_reset() {
        let mut state = CircuitBreakerState::new(t(0));
        for at in 1..=3 {
            state = fail(state, at);
        }
        let state = state.reset(t(5));
        assert_eq!(state.status, CircuitStatus::Closed);
        assert_eq!(state.admit(t(6), &config()).1, Admission::Allowed);
    }
}
