//! Engine input events and evaluation outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, TickSnapshot, Timeframe, TradeSignal};

/// Inbound market event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    Tick {
        symbol: String,
        tick: TickSnapshot,
    },
    Bar {
        symbol: String,
        timeframe: Timeframe,
        bar: Bar,
    },
    /// Advisory: regime break detected upstream; adaptive thresholds for the
    /// symbol are refreshed on the next evaluation.
    MarketStateChange {
        symbol: String,
        at: DateTime<Utc>,
    },
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Tick { symbol, .. } => symbol,
            MarketEvent::Bar { symbol, .. } => symbol,
            MarketEvent::MarketStateChange { symbol, .. } => symbol,
        }
    }
}

/// Outcome of processing one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineOutcome {
    /// A sized signal was accepted and submitted downstream.
    Accepted {
        signal: TradeSignal,
        sizing_method: String,
    },
    /// Evaluation ran but produced no trade; the reason is preserved.
    Suppressed {
        symbol: String,
        timeframe: Timeframe,
        reason: String,
    },
    /// Input was rejected (bad bar, non-monotonic timestamp); slot unchanged.
    InputRejected {
        symbol: String,
        timeframe: Timeframe,
        reason: String,
    },
    /// Event absorbed without triggering an evaluation (tick inside a bar,
    /// state-change marker).
    Absorbed,
}

impl EngineOutcome {
    pub fn signal(&self) -> Option<&TradeSignal> {
        match self {
            EngineOutcome::Accepted { signal, .. } => Some(signal),
            _ => None,
        }
    }
}
