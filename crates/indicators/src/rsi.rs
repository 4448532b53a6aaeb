use confluence_core::{IndicatorResult, MarketResult, PriceSeries};

use crate::algorithm::{IndicatorAlgorithm, validate_period, windowed_result};
use crate::kind::IndicatorKind;

/// Wilder's Relative Strength Index
///
/// The first average gain/loss is the plain mean of the first `period`
/// close-to-close changes; every later change is folded in with Wilder
/// smoothing `avg = (avg * (period - 1) + x) / period`. Needs `period + 1`
/// closes. A window with no losses reads 100, including a flat one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeStrengthIndex {
    period: usize,
}

impl RelativeStrengthIndex {
    pub fn new(period: usize) -> MarketResult<Self> {
        Ok(Self {
            period: validate_period(IndicatorKind::Rsi, period)?,
        })
    }
}

impl IndicatorAlgorithm for RelativeStrengthIndex {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    fn period(&self) -> usize {
        self.period
    }

    fn min_samples(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, series: &PriceSeries) -> MarketResult<IndicatorResult> {
        series.require(self.min_samples())?;
        let p = self.period as f64;

        let mut changes = series.closes().windows(2).map(|w| w[1] - w[0]);
        let (mut avg_gain, mut avg_loss) = (&mut changes)
            .take(self.period)
            .fold((0.0, 0.0), |(g, l), d| (g + d.max(0.0), l + (-d).max(0.0)));
        avg_gain /= p;
        avg_loss /= p;

        for d in changes {
            avg_gain = (avg_gain * (p - 1.0) + d.max(0.0)) / p;
            avg_loss = (avg_loss * (p - 1.0) + (-d).max(0.0)) / p;
        }

        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
        windowed_result(series, series.len(), rsi.clamp(0.0, 100.0))
    }
}
