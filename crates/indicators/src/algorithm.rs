use confluence_core::{IndicatorResult, MarketError, MarketResult, PriceSeries};

use crate::kind::IndicatorKind;

/// Capability shared by every indicator: one result from an ordered series
pub trait IndicatorAlgorithm: Send + Sync {
    fn kind(&self) -> IndicatorKind;

    /// Period the indicator was created with
    fn period(&self) -> usize;

    /// Fewest samples `calculate` accepts
    fn min_samples(&self) -> usize;

    /// Compute the indicator over `series`
    ///
    /// Fails with `InsufficientData` when `series` is shorter than
    /// [`min_samples`](IndicatorAlgorithm::min_samples).
    fn calculate(&self, series: &PriceSeries) -> MarketResult<IndicatorResult>;
}

pub(crate) fn validate_period(kind: IndicatorKind, period: usize) -> MarketResult<usize> {
    if period == 0 {
        return Err(MarketError::invalid(format!(
            "{} period must be positive",
            kind.short_code()
        )));
    }
    Ok(period)
}

/// Build a result whose window covers the trailing `window` samples
pub(crate) fn windowed_result(
    series: &PriceSeries,
    window: usize,
    value: f64,
) -> MarketResult<IndicatorResult> {
    let (start, end) = series
        .window_bounds(window)
        .ok_or_else(|| MarketError::insufficient(window, series.len()))?;
    let last_close = series
        .last_close()
        .ok_or_else(|| MarketError::insufficient(window, 0))?;
    Ok(IndicatorResult::new(value, start, end, last_close))
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// EMA over `values`, seeded with the SMA of the first `period` values
///
/// Returns one value per input from index `period - 1` onward, so the output
/// is `values.len() - period + 1` long (empty if there is not enough input).
pub(crate) fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut ema = mean(&values[..period]);
    out.push(ema);
    for &x in &values[period..] {
        ema = alpha * x + (1.0 - alpha) * ema;
        out.push(ema);
    }
    out
}
