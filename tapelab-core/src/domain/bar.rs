//! Single OHLCV bar with validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Immutable OHLCV bar keyed by (symbol, timeframe, timestamp).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    /// Validate bar invariants: high >= max(open, close), low <= min(open, close),
    /// volume >= 0, all fields finite.
    pub fn validate(&self) -> Result<(), BarError> {
        if !self.open.is_finite()
            || !self.high.is_finite()
            || !self.low.is_finite()
            || !self.close.is_finite()
            || !self.volume.is_finite()
        {
            return Err(BarError::NonFinite);
        }
        if self.high < self.low {
            return Err(BarError::InvalidRange { high: self.high, low: self.low });
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(BarError::BodyOutsideRange);
        }
        if self.volume < 0.0 {
            return Err(BarError::NegativeVolume);
        }
        Ok(())
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Bar range (high - low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Position of the close within the bar range, in [0, 1].
    /// 0.5 for zero-range bars.
    pub fn close_position(&self) -> f64 {
        let range = self.range();
        if range <= 0.0 {
            0.5
        } else {
            (self.close - self.low) / range
        }
    }

    /// Signed volume delta proxy: volume weighted by the sign of the body.
    pub fn signed_delta(&self) -> f64 {
        if self.close > self.open {
            self.volume
        } else if self.close < self.open {
            -self.volume
        } else {
            0.0
        }
    }

    /// Log return relative to a previous close. NaN when either side is
    /// non-positive.
    pub fn log_return_from(&self, prev_close: f64) -> f64 {
        if prev_close > 0.0 && self.close > 0.0 {
            (self.close / prev_close).ln()
        } else {
            f64::NAN
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BarError {
    #[error("invalid bar range: high={high}, low={low}")]
    InvalidRange { high: f64, low: f64 },

    #[error("open/close outside [low, high]")]
    BodyOutsideRange,

    #[error("negative volume not allowed")]
    NegativeVolume,

    #[error("non-finite field in bar")]
    NonFinite,
}
