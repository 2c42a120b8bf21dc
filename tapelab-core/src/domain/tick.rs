//! Live tick snapshot with optional depth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One level of the order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DepthLevel {
    pub price: f64,
    pub size: f64,
}

/// Best-quote snapshot at tick time.
///
/// `bid <= ask` is checked by the store on ingestion; crossed quotes are
/// dropped with a warning rather than rejected as errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSnapshot {
    pub timestamp: DateTime<Utc>,
    pub last_price: f64,
    pub bid: f64,
    pub ask: f64,
    pub last_volume: f64,
    #[serde(default)]
    pub bid_depth: Vec<DepthLevel>,
    #[serde(default)]
    pub ask_depth: Vec<DepthLevel>,
}

impl TickSnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        last_price: f64,
        bid: f64,
        ask: f64,
        last_volume: f64,
    ) -> Self {
        Self {
            timestamp,
            last_price,
            bid,
            ask,
            last_volume,
            bid_depth: Vec::new(),
            ask_depth: Vec::new(),
        }
    }

    pub fn is_crossed(&self) -> bool {
        self.bid > self.ask
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Quoted spread relative to mid. NaN when the mid is non-positive.
    pub fn relative_spread(&self) -> f64 {
        let mid = self.mid();
        if mid > 0.0 {
            (self.ask - self.bid) / mid
        } else {
            f64::NAN
        }
    }

    /// Total resting size on each side of the book, best quote only when no
    /// depth was provided.
    pub fn book_sizes(&self) -> Option<(f64, f64)> {
        if self.bid_depth.is_empty() && self.ask_depth.is_empty() {
            return None;
        }
        let bid: f64 = self.bid_depth.iter().map(|l| l.size).sum();
        let ask: f64 = self.ask_depth.iter().map(|l| l.size).sum();
        Some((bid, ask))
    }
}
