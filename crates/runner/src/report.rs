use confluence_core::{AuxiliaryOutput, IndicatorResult, PriceSample, Timeframe};
use confluence_indicators::IndicatorKind;
use confluence_timeframe::{TimeframeAlignment, TrendDirection};

pub fn price_line(sample: &PriceSample) -> String {
    format!(
        "{:<10} price {:>14.4}  @ {}",
        sample.symbol(),
        sample.value(),
        sample.timestamp().format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn indicator_line(
    kind: IndicatorKind,
    period: usize,
    timeframe: Timeframe,
    result: &IndicatorResult,
) -> String {
    let mut line = format!(
        "  {}({}) {:>4}  {:>12.4}",
        kind, period, timeframe, result.value
    );
    match result.auxiliary {
        Some(AuxiliaryOutput::Bands { upper, lower, .. }) => {
            line.push_str(&format!("  bands [{:.4}, {:.4}]", lower, upper));
        }
        Some(AuxiliaryOutput::Macd { signal, histogram }) => {
            line.push_str(&format!("  signal {:.4} hist {:.4}", signal, histogram));
        }
        Some(AuxiliaryOutput::Stochastic { d }) => {
            line.push_str(&format!("  %D {:.2}", d));
        }
        None => {}
    }
    line
}

pub fn alignment_line(alignment: &TimeframeAlignment) -> String {
    let direction = match alignment.trend_direction {
        TrendDirection::Bullish => "bullish",
        TrendDirection::Bearish => "bearish",
        TrendDirection::Neutral => "neutral",
    };
    let strongest = alignment
        .strongest_timeframe
        .map_or_else(|| "-".to_string(), |tf| tf.to_string());
    format!(
        "  alignment {} score {:.2} confluence {:+.2}{} strongest {}",
        direction,
        alignment.alignment_score,
        alignment.confluence_strength,
        if alignment.is_strong_confluence {
            " (strong)"
        } else {
            ""
        },
        strongest
    )
}
