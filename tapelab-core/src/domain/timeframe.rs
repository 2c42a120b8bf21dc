//! Supported bar timeframes.
//!
//! Annualization assumes a 252-trading-day year over a continuous 24h market,
//! so `bars_per_year` for daily bars is exactly 252 and intraday frames scale
//! by their step.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    Daily,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown timeframe '{0}' (expected one of 1min,5min,15min,30min,1h,4h,daily)")]
pub struct ParseTimeframeError(pub String);

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::Daily,
    ];

    /// Bar step in seconds.
    pub fn step_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1800,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14_400,
            Timeframe::Daily => 86_400,
        }
    }

    /// Bars per 252-trading-day year, used to annualize per-bar variance.
    pub fn bars_per_year(&self) -> f64 {
        252.0 * 86_400.0 / self.step_secs() as f64
    }

    /// Align a timestamp down to the start of its bar.
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.step_secs();
        let secs = ts.timestamp().div_euclid(step) * step;
        Utc.timestamp_opt(secs, 0).single().unwrap_or(ts)
    }

    /// Start of the bar after the one containing `ts`.
    pub fn next_boundary(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        self.floor(ts) + chrono::Duration::seconds(self.step_secs())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1min",
            Timeframe::M5 => "5min",
            Timeframe::M15 => "15min",
            Timeframe::M30 => "30min",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::Daily => "daily",
        }
    }
}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1min" => Ok(Timeframe::M1),
            "5min" => Ok(Timeframe::M5),
            "15min" => Ok(Timeframe::M15),
            "30min" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "daily" => Ok(Timeframe::Daily),
            other => Err(ParseTimeframeError(other.to_string())),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ParseTimeframeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
