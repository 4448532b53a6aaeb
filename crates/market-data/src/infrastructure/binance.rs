use async_trait::async_trait;
use chrono::DateTime;
use confluence_core::{Candle, MarketError, MarketResult, PriceSample, Timeframe, Timestamp};
use confluence_ports::{Clock, ExchangeDataSource};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::ExchangeConfig;

/// Kline intervals the exchange serves, in minutes
const SUPPORTED_INTERVALS: [u32; 13] = [1, 3, 5, 15, 30, 60, 120, 240, 360, 480, 720, 1440, 4320];
const WEEK_MINUTES: u32 = 7 * 1440;

/// Error codes the exchange uses for a bad request rather than an outage
const INVALID_SYMBOL: i32 = -1121;
const ILLEGAL_CHARS: i32 = -1100;
const BAD_PARAMETER: i32 = -1102;

pub fn is_supported_interval(tf: Timeframe) -> bool {
    SUPPORTED_INTERVALS.contains(&tf.minutes()) || tf.minutes() == WEEK_MINUTES
}

#[derive(Error, Debug)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {code} - {msg}")]
    Api { code: i32, msg: String },
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convert infrastructure RestError to the domain taxonomy
impl From<RestError> for MarketError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Api { code, msg }
                if matches!(code, INVALID_SYMBOL | ILLEGAL_CHARS | BAD_PARAMETER) =>
            {
                MarketError::InvalidParameter(msg)
            }
            RestError::Parse(msg) => MarketError::DataIntegrity(msg),
            other => MarketError::UpstreamFailure(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct ApiError {
    code: i32,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Public market-data endpoints of the Binance spot REST API
///
/// No API key is needed. Historical queries page through `/api/v3/klines`
/// at `request_limit` bars per request.
#[derive(Clone)]
pub struct BinanceRestSource {
    client: Client,
    base_url: String,
    interval: Timeframe,
    request_limit: u32,
    clock: Arc<dyn Clock>,
}

impl BinanceRestSource {
    pub fn new(config: &ExchangeConfig, clock: Arc<dyn Clock>) -> MarketResult<Self> {
        if !is_supported_interval(config.base_interval) {
            return Err(MarketError::invalid(format!(
                "unsupported kline interval {}",
                config.base_interval
            )));
        }
        if config.request_limit == 0 {
            return Err(MarketError::invalid("request_limit must be positive"));
        }
        Ok(Self {
            client: Client::new(),
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            interval: config.base_interval,
            request_limit: config.request_limit,
            clock,
        })
    }

    pub fn interval(&self) -> Timeframe {
        self.interval
    }

    /// Every kline opening in `[start, end]`, oldest first
    ///
    /// Rows that decode but break the candle invariants are skipped with a
    /// warning. A row that does not decode fails the whole window.
    async fn klines(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<Vec<Candle>> {
        if start > end {
            return Err(MarketError::invalid(format!(
                "window start {} is after end {}",
                start, end
            )));
        }
        let end_ms = end.timestamp_millis();
        let mut from_ms = start.timestamp_millis();
        let mut candles = Vec::new();

        loop {
            let path = klines_path(symbol, self.interval, from_ms, end_ms, self.request_limit);
            let rows: Vec<Vec<Value>> = self.get(&path).await?;
            let page_len = rows.len();
            let last_open_ms = collect_page(symbol, &rows, &mut candles)?;
            debug!(symbol, page_len, total = candles.len(), "Fetched klines page");

            let Some(last_open_ms) = last_open_ms else {
                break;
            };
            from_ms = last_open_ms + self.interval.as_millis();
            if page_len < self.request_limit as usize || from_ms > end_ms {
                break;
            }
        }
        Ok(candles)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await?;
        handle_response(resp).await
    }
}

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, RestError> {
    let status = resp.status();
    let text = resp.text().await?;
    decode_body(status.as_u16(), &text)
}

fn decode_body<T: DeserializeOwned>(status: u16, text: &str) -> Result<T, RestError> {
    if !(200..300).contains(&status) {
        if let Ok(err) = serde_json::from_str::<ApiError>(text) {
            if matches!(err.code, INVALID_SYMBOL | ILLEGAL_CHARS | BAD_PARAMETER) {
                debug!(code = err.code, msg = %err.msg, "Exchange rejected request");
            } else {
                error!(code = err.code, msg = %err.msg, "Exchange API error");
            }
            return Err(RestError::Api {
                code: err.code,
                msg: err.msg,
            });
        }
        return Err(RestError::Status {
            status,
            body: text.chars().take(200).collect(),
        });
    }
    serde_json::from_str(text).map_err(|e| RestError::Parse(e.to_string()))
}

fn klines_path(
    symbol: &str,
    interval: Timeframe,
    start_ms: i64,
    end_ms: i64,
    limit: u32,
) -> String {
    format!(
        "/api/v3/klines?symbol={}&interval={}&startTime={}&endTime={}&limit={}",
        symbol, interval, start_ms, end_ms, limit
    )
}

/// A decoded kline row, not yet checked against the candle invariants
#[derive(Debug)]
struct Kline {
    open_time: Timestamp,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Kline {
    fn into_candle(self) -> MarketResult<Candle> {
        Candle::new(self.open_time, self.open, self.high, self.low, self.close, self.volume)
    }
}

/// Append the valid candles of one klines page; returns the newest open
/// time on the page, dropped rows included
fn collect_page(
    symbol: &str,
    rows: &[Vec<Value>],
    candles: &mut Vec<Candle>,
) -> Result<Option<i64>, RestError> {
    let mut last_open_ms = None;
    for row in rows {
        let kline = parse_kline(row)?;
        last_open_ms = Some(kline.open_time.timestamp_millis());
        match kline.into_candle() {
            Ok(candle) => candles.push(candle),
            Err(e) => warn!(symbol, error = %e, "Dropping invalid kline"),
        }
    }
    Ok(last_open_ms)
}

/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`
fn parse_kline(row: &[Value]) -> Result<Kline, RestError> {
    if row.len() < 6 {
        return Err(RestError::Parse(format!(
            "kline has {} fields, expected at least 6",
            row.len()
        )));
    }
    let open_time = row[0]
        .as_i64()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| RestError::Parse(format!("bad kline open time {}", row[0])))?;
    let field = |i: usize| -> Result<f64, RestError> {
        row[i]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| RestError::Parse(format!("bad kline field {}: {}", i, row[i])))
    };
    Ok(Kline {
        open_time,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

fn parse_price(ticker: &TickerPrice) -> Result<f64, RestError> {
    ticker
        .price
        .parse()
        .map_err(|_| RestError::Parse(format!("bad ticker price '{}'", ticker.price)))
}

#[async_trait]
impl ExchangeDataSource for BinanceRestSource {
    async fn current_price(&self, symbol: &str) -> MarketResult<PriceSample> {
        let ticker: TickerPrice = self
            .get(&format!("/api/v3/ticker/price?symbol={}", symbol))
            .await?;
        PriceSample::new(symbol, parse_price(&ticker)?, self.clock.now())
    }

    async fn historical_prices(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<Vec<PriceSample>> {
        self.klines(symbol, start, end)
            .await?
            .iter()
            .map(|c| PriceSample::new(symbol, c.close(), c.timestamp()))
            .collect()
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> MarketResult<Vec<Candle>> {
        self.klines(symbol, start, end).await
    }

    fn name(&self) -> &str {
        "binance"
    }
}
