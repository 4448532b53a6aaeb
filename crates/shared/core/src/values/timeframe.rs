use chrono::{DateTime, Duration};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Timestamp;
use crate::error::MarketError;

const MINUTES_PER_HOUR: u32 = 60;
const MINUTES_PER_DAY: u32 = 24 * MINUTES_PER_HOUR;
const MINUTES_PER_WEEK: u32 = 7 * MINUTES_PER_DAY;

const MILLIS_PER_WEEK: i64 = MINUTES_PER_WEEK as i64 * 60_000;
/// 1970-01-05T00:00Z, the first Monday after the epoch
const FIRST_MONDAY_MILLIS: i64 = 4 * MINUTES_PER_DAY as i64 * 60_000;

/// Bucket width used for resampling and alignment, in whole minutes
///
/// Buckets are aligned to the Unix epoch, so a 4h bucket always starts at
/// 00:00, 04:00, 08:00... UTC. Whole-week widths are the exception: they
/// start on Monday 00:00 UTC like exchange weekly bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe(u32);

impl Timeframe {
    pub const M1: Timeframe = Timeframe(1);
    pub const M5: Timeframe = Timeframe(5);
    pub const M15: Timeframe = Timeframe(15);
    pub const M30: Timeframe = Timeframe(30);
    pub const H1: Timeframe = Timeframe(MINUTES_PER_HOUR);
    pub const H4: Timeframe = Timeframe(4 * MINUTES_PER_HOUR);
    pub const D1: Timeframe = Timeframe(MINUTES_PER_DAY);
    pub const W1: Timeframe = Timeframe(MINUTES_PER_WEEK);

    /// Create a timeframe from a width in minutes
    pub fn from_minutes(minutes: u32) -> Result<Self, MarketError> {
        if minutes == 0 {
            return Err(MarketError::invalid("timeframe width must be positive"));
        }
        Ok(Timeframe(minutes))
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.0 as i64)
    }

    pub fn as_millis(&self) -> i64 {
        self.0 as i64 * 60_000
    }

    /// Start of the bucket covering `ts`
    ///
    /// Epoch-aligned, except that whole-week widths are anchored on Monday.
    pub fn bucket_start(&self, ts: Timestamp) -> Timestamp {
        let width = self.as_millis();
        let anchor = if width % MILLIS_PER_WEEK == 0 {
            FIRST_MONDAY_MILLIS
        } else {
            0
        };
        let offset = ts.timestamp_millis() - anchor;
        let start = offset.div_euclid(width) * width + anchor;
        DateTime::from_timestamp_millis(start).unwrap_or(ts)
    }

    /// Whether `other` is a whole multiple of this timeframe
    pub fn divides(&self, other: Timeframe) -> bool {
        other.0 % self.0 == 0
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        if m % MINUTES_PER_WEEK == 0 {
            write!(f, "{}w", m / MINUTES_PER_WEEK)
        } else if m % MINUTES_PER_DAY == 0 {
            write!(f, "{}d", m / MINUTES_PER_DAY)
        } else if m % MINUTES_PER_HOUR == 0 {
            write!(f, "{}h", m / MINUTES_PER_HOUR)
        } else {
            write!(f, "{}m", m)
        }
    }
}

impl FromStr for Timeframe {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unknown = || MarketError::invalid(format!("unknown timeframe '{}'", s));

        let split = s.len().checked_sub(1).ok_or_else(unknown)?;
        if !s.is_char_boundary(split) {
            return Err(unknown());
        }
        let (count, unit) = s.split_at(split);
        let count: u32 = count.parse().map_err(|_| unknown())?;
        let scale = match unit {
            "m" => 1,
            "h" => MINUTES_PER_HOUR,
            "d" => MINUTES_PER_DAY,
            "w" => MINUTES_PER_WEEK,
            _ => return Err(unknown()),
        };
        let minutes = count.checked_mul(scale).ok_or_else(unknown)?;
        Timeframe::from_minutes(minutes)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = MarketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}
