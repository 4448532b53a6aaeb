use crate::values::Timestamp;
use thiserror::Error;

/// Error taxonomy shared by every layer of the platform
///
/// Configuration mistakes (`InvalidParameter`) and data shortages
/// (`InsufficientData`) are never retried. Only `UpstreamFailure` is
/// transient; once retries run out it surfaces as `ExchangeUnavailable`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Insufficient data: {required} samples required, {available} available")]
    InsufficientData { required: usize, available: usize },

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Exchange unavailable after {attempts} attempt(s): {last_error}")]
    ExchangeUnavailable { attempts: u32, last_error: String },

    #[error("Circuit open for '{operation}'")]
    CircuitOpen {
        operation: String,
        retry_at: Option<Timestamp>,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl MarketError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        MarketError::InvalidParameter(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        MarketError::DataIntegrity(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        MarketError::UpstreamFailure(msg.into())
    }

    pub fn insufficient(required: usize, available: usize) -> Self {
        MarketError::InsufficientData {
            required,
            available,
        }
    }

    /// Whether a retry policy may attempt the operation again
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketError::UpstreamFailure(_))
    }

    /// Whether the error came from the caller rather than the data or upstream
    pub fn is_caller_error(&self) -> bool {
        matches!(self, MarketError::InvalidParameter(_))
    }
}

pub type MarketResult<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_upstream_failure_is_transient() {
        assert!(MarketError::upstream("503").is_transient());
        assert!(!MarketError::invalid("period").is_transient());
        assert!(!MarketError::insufficient(20, 3).is_transient());
        assert!(!MarketError::integrity("low > high").is_transient());
        assert!(!MarketError::Cancelled.is_transient());
        assert!(
            !MarketError::CircuitOpen {
                operation: "klines".into(),
                retry_at: None
            }
            .is_transient()
        );
    }

    #[test]
    fn test_display_messages() {
        let err = MarketError::insufficient(20, 3);
        assert_eq!(
            err.to_string(),
            "Insufficient data: 20 samples required, 3 available"
        );

        let err = MarketError::ExchangeUnavailable {
            attempts: 3,
            last_error: "timeout".into(),
        };
        assert_eq!(
            err.to_string(),
            "Exchange unavailable after 3 attempt(s): timeout"
        );
    }
}
