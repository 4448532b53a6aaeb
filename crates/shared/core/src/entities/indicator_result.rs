use serde::{Deserialize, Serialize};

use crate::values::Timestamp;

/// Secondary outputs some indicators produce alongside their primary value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AuxiliaryOutput {
    /// Bollinger upper/lower band; `bandwidth` is `(upper - lower) / middle`
    Bands {
        upper: f64,
        lower: f64,
        bandwidth: f64,
    },
    /// MACD signal line and histogram (`macd - signal`)
    Macd { signal: f64, histogram: f64 },
    /// Stochastic %D (smoothed %K)
    Stochastic { d: f64 },
}

/// One indicator value and the input window that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub value: f64,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Close of the last sample in the window
    pub last_close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<AuxiliaryOutput>,
}

impl IndicatorResult {
    pub fn new(value: f64, start_time: Timestamp, end_time: Timestamp, last_close: f64) -> Self {
        Self {
            value,
            start_time,
            end_time,
            last_close,
            auxiliary: None,
        }
    }

    pub fn with_auxiliary(mut self, auxiliary: AuxiliaryOutput) -> Self {
        self.auxiliary = Some(auxiliary);
        self
    }

    pub fn upper_band(&self) -> Option<f64> {
        match self.auxiliary {
            Some(AuxiliaryOutput::Bands { upper, .. }) => Some(upper),
            _ => None,
        }
    }

    pub fn lower_band(&self) -> Option<f64> {
        match self.auxiliary {
            Some(AuxiliaryOutput::Bands { lower, .. }) => Some(lower),
            _ => None,
        }
    }

    pub fn signal_line(&self) -> Option<f64> {
        match self.auxiliary {
            Some(AuxiliaryOutput::Macd { signal, .. }) => Some(signal),
            _ => None,
        }
    }
}
