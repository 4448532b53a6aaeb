use async_trait::async_trait;
use confluence_core::{Candle, MarketResult, PriceSample, Timestamp};

/// Port for reading market data from an exchange
///
/// Implementations perform network I/O and fail with
/// `MarketError::UpstreamFailure` for transient problems. Callers inside the
/// platform reach these methods only through the resilience pipeline.
#[async_trait]
pub trait ExchangeDataSource: Send + Sync {
    /// Latest traded price for `symbol`
    async fn current_price(&self, symbol: &str) -> MarketResult<PriceSample>;

    /// Time-ascending prices in `[start, end]`
    async fn historical_prices(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<Vec<PriceSample>>;

    /// Time-ascending candles at the source's base interval in `[start, end]`
    async fn historical_candles(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<Vec<Candle>>;

    /// Name used in logs and circuit-breaker keys
    fn name(&self) -> &str {
        "exchange"
    }
}
