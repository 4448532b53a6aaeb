//! Fault isolation for upstream I/O
//!
//! [`ResiliencePipeline`] wraps every exchange call in bounded retry with
//! exponential backoff, a per-attempt timeout, and a circuit breaker keyed by
//! operation. Breaker transitions live in [`CircuitBreakerState`] as pure
//! functions so they can be tested without a runtime.

mod breaker;
mod config;
mod pipeline;
mod retry;

pub use breaker::{
    Admission, BreakerConfig, BreakerSnapshot, CallOutcome, CircuitBreakerState, CircuitStatus,
};
pub use config::ResilienceConfig;
pub use pipeline::ResiliencePipeline;
pub use retry::RetryPolicy;
