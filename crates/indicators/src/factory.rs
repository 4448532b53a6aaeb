use confluence_core::{IndicatorResult, MarketResult, PriceSeries};

use crate::algorithm::IndicatorAlgorithm;
use crate::bollinger::BollingerBands;
use crate::kind::{IndicatorDescriptor, IndicatorKind, NeutralReference};
use crate::macd::Macd;
use crate::moving_average::{ExponentialMovingAverage, SimpleMovingAverage};
use crate::oscillators::{StochasticOscillator, WilliamsR};
use crate::rsi::RelativeStrengthIndex;

/// A configured indicator of any supported kind
#[derive(Debug, Clone, PartialEq)]
pub enum Indicator {
    Sma(SimpleMovingAverage),
    Ema(ExponentialMovingAverage),
    Rsi(RelativeStrengthIndex),
    BollingerBands(BollingerBands),
    Stochastic(StochasticOscillator),
    Macd(Macd),
    WilliamsR(WilliamsR),
}

impl Indicator {
    fn algorithm(&self) -> &dyn IndicatorAlgorithm {
        match self {
            Indicator::Sma(a) => a,
            Indicator::Ema(a) => a,
            Indicator::Rsi(a) => a,
            Indicator::BollingerBands(a) => a,
            Indicator::Stochastic(a) => a,
            Indicator::Macd(a) => a,
            Indicator::WilliamsR(a) => a,
        }
    }
}

impl IndicatorAlgorithm for Indicator {
    fn kind(&self) -> IndicatorKind {
        self.algorithm().kind()
    }

    fn period(&self) -> usize {
        self.algorithm().period()
    }

    fn min_samples(&self) -> usize {
        self.algorithm().min_samples()
    }

    fn calculate(&self, series: &PriceSeries) -> MarketResult<IndicatorResult> {
        self.algorithm().calculate(series)
    }
}

/// Validates indicator requests and builds [`Indicator`]s
///
/// Stateless: all metadata is static, so a single value can be shared
/// freely between threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorFactory;

impl IndicatorFactory {
    /// Build an indicator; fails `InvalidParameter` when `period` is zero
    ///
    /// The recommended period range is not enforced here.
    pub fn create(&self, kind: IndicatorKind, period: usize) -> MarketResult<Indicator> {
        Ok(match kind {
            IndicatorKind::Sma => Indicator::Sma(SimpleMovingAverage::new(period)?),
            IndicatorKind::Ema => Indicator::Ema(ExponentialMovingAverage::new(period)?),
            IndicatorKind::Rsi => Indicator::Rsi(RelativeStrengthIndex::new(period)?),
            IndicatorKind::BollingerBands => {
                Indicator::BollingerBands(BollingerBands::new(period)?)
            }
            IndicatorKind::Stochastic => Indicator::Stochastic(StochasticOscillator::new(period)?),
            IndicatorKind::Macd => Indicator::Macd(Macd::new(period)?),
            IndicatorKind::WilliamsR => Indicator::WilliamsR(WilliamsR::new(period)?),
        })
    }

    /// Build from a short code such as `"RSI"`; unknown codes fail `InvalidParameter`
    pub fn create_from_code(&self, code: &str, period: usize) -> MarketResult<Indicator> {
        self.create(code.parse()?, period)
    }

    pub fn available_types(&self) -> &'static [IndicatorKind] {
        &IndicatorKind::ALL
    }

    pub fn describe(&self, kind: IndicatorKind) -> IndicatorDescriptor {
        kind.descriptor()
    }

    pub fn default_period_range(&self, kind: IndicatorKind) -> (usize, usize) {
        kind.default_period_range()
    }

    pub fn neutral_reference(&self, kind: IndicatorKind) -> NeutralReference {
        kind.neutral_reference()
    }
}
