//! Confluence Ports
//!
//! Port definitions (traits) for the Confluence market-data platform.
//! These define the boundaries between the computation core and the
//! infrastructure it talks to (exchanges, time).

mod clock;
mod exchange;

pub use clock::Clock;
pub use exchange::ExchangeDataSource;

// Re-export the cancellation signal so adapters don't need tokio-util directly
pub use tokio_util::sync::CancellationToken;
