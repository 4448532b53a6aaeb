pub mod cached_source;
pub mod diagnostics;
pub mod indicator_service;

pub use cached_source::CachedMarketData;
pub use diagnostics::MarketDataDiagnostics;
pub use indicator_service::IndicatorService;
