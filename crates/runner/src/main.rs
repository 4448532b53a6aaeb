mod report;

use anyhow::Context;
use confluence_clock::SystemClock;
use confluence_market_data::{
    BinanceRestSource, CachedMarketData, IndicatorService, PlatformConfig, load_config,
    load_default_config,
};
use confluence_ports::{CancellationToken, Clock, ExchangeDataSource};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn print_help() {
    eprintln!(
        r#"Confluence - indicator and multi-timeframe alignment report

USAGE:
    confluence [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Log level filter (default: confluence=info)
"#
    );
}

/// `Ok(None)` means help was printed
fn parse_args() -> anyhow::Result<Option<Option<String>>> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--config" | "-c" => {
                i += 1;
                let path = args
                    .get(i)
                    .context("--config requires a path argument")?;
                config_path = Some(path.clone());
            }
            arg => {
                print_help();
                anyhow::bail!("Unknown argument: {}", arg);
            }
        }
        i += 1;
    }
    Ok(Some(config_path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "confluence=info".into()))
        .init();

    let Some(config_path) = parse_args()? else {
        return Ok(());
    };
    let config = match config_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading configuration");
            load_config(&path).with_context(|| format!("loading {}", path))?
        }
        None => {
            tracing::info!("Using embedded default configuration");
            load_default_config()?
        }
    };
    config.validate()?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling in-flight requests");
            ctrl_c.cancel();
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let source = Arc::new(BinanceRestSource::new(&config.exchange, Arc::clone(&clock))?);
    let market = Arc::new(
        CachedMarketData::new(
            source,
            Arc::clone(&clock),
            config.cache.clone(),
            &config.resilience,
        )
        .with_shutdown(shutdown.clone()),
    );
    let service = IndicatorService::new(Arc::clone(&market), clock, &config);

    tracing::info!(
        exchange = market.name(),
        symbols = config.watch.symbols.len(),
        "Confluence started"
    );
    for symbol in &config.watch.symbols {
        if shutdown.is_cancelled() {
            break;
        }
        if let Err(e) = report_symbol(&service, &config, symbol, &shutdown).await {
            tracing::warn!(symbol = %symbol, error = %e, "Skipping symbol");
        }
    }

    let diagnostics = service.diagnostics();
    tracing::info!(
        hits = diagnostics.cache.hits,
        misses = diagnostics.cache.misses,
        open_breakers = diagnostics.open_breakers().count(),
        "Done"
    );
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    Ok(())
}

async fn report_symbol<S>(
    service: &IndicatorService<S>,
    config: &PlatformConfig,
    symbol: &str,
    shutdown: &CancellationToken,
) -> anyhow::Result<()>
where
    S: ExchangeDataSource + 'static,
{
    let kind = config.watch_indicator()?;
    let period = config.watch.period;

    let price = service.market().current_price(symbol).await?;
    println!("{}", report::price_line(&price));

    for &timeframe in &config.watch.timeframes {
        let result = service
            .indicator_with(symbol, kind, period, timeframe, shutdown)
            .await?;
        println!(
            "{}",
            report::indicator_line(kind, period, timeframe, &result)
        );
    }

    let alignment = service
        .alignment(symbol, kind, period, &config.watch.timeframes)
        .await?;
    println!("{}", report::alignment_line(&alignment));
    Ok(())
}
