//! Confluence Clock Infrastructure
//!
//! Provides the two time sources the platform runs on:
//!
//! - [`SystemClock`]: wall-clock time, real sleeps. Production.
//! - [`ManualClock`]: frozen time that moves only when advanced. Every
//!   `delay` advances it instantly, so retry backoff and cache expiry can be
//!   exercised without waiting.
//!
//! ## Usage
//!
//! ```ignore
//! use confluence_clock::{ManualClock, SystemClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::starting_at(Utc::now());
//! clock.advance(Duration::from_secs(30)); // jump forward
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use confluence_ports::Clock;
