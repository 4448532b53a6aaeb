use async_trait::async_trait;
use confluence_cache::{CacheEngine, CacheOptions};
use confluence_core::{Candle, MarketError, MarketResult, PriceSample, Timestamp};
use confluence_ports::{CancellationToken, Clock, ExchangeDataSource};
use confluence_resilience::{ResilienceConfig, ResiliencePipeline};
use std::collections::BTreeMap;
use std::future::Future;
use std::mem::size_of;
use std::sync::Arc;
use tracing::debug;

use super::diagnostics::MarketDataDiagnostics;
use crate::config::CacheSettings;

/// Exchange data behind retry, circuit breaking and a stale-while-revalidate
/// cache
///
/// Every upstream call runs inside the cache factory, so concurrent misses on
/// one key share a single fetch. Cached entries keep their factory and are
/// refreshed in the background once `background_refresh_threshold` of their
/// TTL has passed. The facade is itself an [`ExchangeDataSource`].
pub struct CachedMarketData<S> {
    source: Arc<S>,
    pipeline: Arc<ResiliencePipeline>,
    prices: CacheEngine<PriceSample>,
    price_history: CacheEngine<Arc<Vec<PriceSample>>>,
    candles: CacheEngine<Arc<Vec<Candle>>>,
    settings: CacheSettings,
    shutdown: CancellationToken,
}

impl<S> CachedMarketData<S>
where
    S: ExchangeDataSource + 'static,
{
    pub fn new(
        source: Arc<S>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
        resilience: &ResilienceConfig,
    ) -> Self {
        let pipeline = Arc::new(ResiliencePipeline::new(Arc::clone(&clock), resilience));
        Self::with_pipeline(source, clock, settings, pipeline)
    }

    pub fn with_pipeline(
        source: Arc<S>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
        pipeline: Arc<ResiliencePipeline>,
    ) -> Self {
        let engine_config = settings.engine_config();
        Self {
            source,
            pipeline,
            prices: CacheEngine::new(Arc::clone(&clock), engine_config),
            price_history: CacheEngine::with_weigher(
                Arc::clone(&clock),
                engine_config,
                |v: &Arc<Vec<PriceSample>>| v.len() * size_of::<PriceSample>(),
            ),
            candles: CacheEngine::with_weigher(clock, engine_config, |v: &Arc<Vec<Candle>>| {
                v.len() * size_of::<Candle>()
            }),
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that cancels every fetch this facade starts, including
    /// background refreshes
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn pipeline(&self) -> &Arc<ResiliencePipeline> {
        &self.pipeline
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Latest price; `cancel` abandons the wait (and the fetch, if this
    /// caller started it)
    pub async fn current_price_with(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> MarketResult<PriceSample> {
        let key = format!("price:{}", symbol);
        let options = self.settings.raw_options(self.settings.price_ttl(), symbol);
        let owned = symbol.to_string();
        self.fetch(&self.prices, &key, "price", symbol, &options, cancel, move |source| {
            let symbol = owned.clone();
            async move { source.current_price(&symbol).await }
        })
        .await
    }

    pub async fn price_history(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
        cancel: &CancellationToken,
    ) -> MarketResult<Arc<Vec<PriceSample>>> {
        let key = window_key("prices", symbol, start, end);
        let options = self.settings.raw_options(self.settings.candle_ttl(), symbol);
        let owned = symbol.to_string();
        self.fetch(&self.price_history, &key, "prices", symbol, &options, cancel, move |source| {
            let symbol = owned.clone();
            async move { source.historical_prices(&symbol, start, end).await.map(Arc::new) }
        })
        .await
    }

    pub async fn candle_history(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
        cancel: &CancellationToken,
    ) -> MarketResult<Arc<Vec<Candle>>> {
        let key = window_key("candles", symbol, start, end);
        let options = self.settings.raw_options(self.settings.candle_ttl(), symbol);
        let owned = symbol.to_string();
        self.fetch(&self.candles, &key, "candles", symbol, &options, cancel, move |source| {
            let symbol = owned.clone();
            async move { source.historical_candles(&symbol, start, end).await.map(Arc::new) }
        })
        .await
    }

    /// Drop every cached response for `symbol`
    pub fn invalidate(&self, symbol: &str) -> usize {
        let removed = self.prices.remove_by_tag(symbol)
            + self.price_history.remove_by_tag(symbol)
            + self.candles.remove_by_tag(symbol);
        debug!(symbol, removed, "Invalidated cached market data");
        removed
    }

    pub fn purge_expired(&self) -> usize {
        self.prices.purge_expired()
            + self.price_history.purge_expired()
            + self.candles.purge_expired()
    }

    pub fn diagnostics(&self) -> MarketDataDiagnostics {
        let caches = BTreeMap::from([
            ("prices".to_string(), self.prices.statistics()),
            ("price_history".to_string(), self.price_history.statistics()),
            ("candles".to_string(), self.candles.statistics()),
        ]);
        MarketDataDiagnostics::new(caches, self.pipeline.breaker_snapshots())
    }

    /// Serve `key` from `engine`, fetching through the pipeline on a miss
    ///
    /// The breaker key is `<source>:<operation>:<symbol>` so one failing
    /// symbol or endpoint never opens the circuit for another.
    #[allow(clippy::too_many_arguments)]
    async fn fetch<V, C, Fut>(
        &self,
        engine: &CacheEngine<V>,
        key: &str,
        operation: &str,
        symbol: &str,
        options: &CacheOptions,
        cancel: &CancellationToken,
        call: C,
    ) -> MarketResult<V>
    where
        V: Clone + Send + Sync + 'static,
        C: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MarketResult<V>> + Send + 'static,
    {
        let breaker_key = format!("{}:{}:{}", self.source.name(), operation, symbol);
        let source = Arc::clone(&self.source);
        let pipeline = Arc::clone(&self.pipeline);
        let shutdown = self.shutdown.clone();
        let call = Arc::new(call);
        let factory = move || {
            let source = Arc::clone(&source);
            let pipeline = Arc::clone(&pipeline);
            let shutdown = shutdown.clone();
            let breaker_key = breaker_key.clone();
            let call = Arc::clone(&call);
            async move {
                pipeline
                    .execute(&breaker_key, &shutdown, || call(Arc::clone(&source)))
                    .await
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MarketError::Cancelled),
            result = engine.get_or_set(key, factory, options) => result,
        }
    }
}

fn window_key(kind: &str, symbol: &str, start: Timestamp, end: Timestamp) -> String {
    format!(
        "{}:{}:{}:{}",
        kind,
        symbol,
        start.timestamp_millis(),
        end.timestamp_millis()
    )
}

#[async_trait]
impl<S> ExchangeDataSource for CachedMarketData<S>
where
    S: ExchangeDataSource + 'static,
{
    async fn current_price(&self, symbol: &str) -> MarketResult<PriceSample> {
        self.current_price_with(symbol, &self.shutdown).await
    }

    async fn historical_prices(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<Vec<PriceSample>> {
        self.price_history(symbol, start, end, &self.shutdown)
            .await
            .map(Arc::unwrap_or_clone)
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<Vec<Candle>> {
        self.candle_history(symbol, start, end, &self.shutdown)
            .await
            .map(Arc::unwrap_or_clone)
    }

    fn name(&self) -> &str {
        self.source.name()
    }
}
