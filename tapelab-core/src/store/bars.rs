//! Bounded bar series with strict timestamp monotonicity.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::domain::{Bar, BarError};
use crate::store::ring::BoundedRing;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("bar rejected: {0}")]
    InvalidBar(#[from] BarError),

    #[error("non-monotonic timestamp: {incoming} <= last {last}")]
    NonMonotonic { incoming: DateTime<Utc>, last: DateTime<Utc> },
}

/// Append-only bounded series of validated bars for one (symbol, timeframe).
#[derive(Debug, Clone)]
pub struct BarSeries {
    bars: BoundedRing<Bar>,
}

impl BarSeries {
    pub fn new(capacity: usize) -> Self {
        Self { bars: BoundedRing::new(capacity) }
    }

    /// Validate and append. Rejects invalid bars and timestamps that do not
    /// strictly advance; on rejection the series is unchanged.
    pub fn push(&mut self, bar: Bar) -> Result<(), StoreError> {
        bar.validate()?;
        if let Some(last) = self.bars.back() {
            if bar.timestamp <= last.timestamp {
                warn!(
                    incoming = %bar.timestamp,
                    last = %last.timestamp,
                    "dropping non-monotonic bar"
                );
                return Err(StoreError::NonMonotonic {
                    incoming: bar.timestamp,
                    last: last.timestamp,
                });
            }
        }
        self.bars.push(bar);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.back().map(|b| b.timestamp)
    }

    /// Read-only snapshot, oldest-first.
    pub fn snapshot(&mut self) -> &[Bar] {
        self.bars.make_slice()
    }

    /// Clone of the most recent `n` bars, oldest-first.
    pub fn last_n(&self, n: usize) -> Vec<Bar> {
        self.bars.last_n(n)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}
