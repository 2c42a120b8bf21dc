//! Emitted trade signal record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{SignalId, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn sign(&self) -> f64 {
        match self {
            TradeAction::Buy => 1.0,
            TradeAction::Sell => -1.0,
        }
    }
}

/// Audit metadata attached to every emitted signal.
///
/// Carries the per-analyzer directions and scores plus the named facts the
/// composer used, so a decision can be reconstructed without re-running the
/// analyzers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub structure_direction: String,
    pub structure_score: f64,
    pub flow_direction: String,
    pub flow_score: f64,
    pub wyckoff_phase: String,
    pub vsa_signal: Option<String>,
    pub nearest_supply: Option<f64>,
    pub nearest_demand: Option<f64>,
    pub sl_reason: String,
    pub tp_reason: String,
    pub decision_mode: String,
}

/// Directional trade signal with attached risk parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub id: SignalId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Combined score in [0, 10].
    pub score: f64,
    /// Sizing multiplier in [0.5, 1.2].
    pub confidence_modifier: f64,
    /// Volume in lots; filled in by the risk evaluator, 0 until sized.
    #[serde(default)]
    pub volume: f64,
    pub metadata: SignalMetadata,
}

impl TradeSignal {
    /// Risk-parameter sanity: SL and TP on the correct sides of entry.
    pub fn levels_are_coherent(&self) -> bool {
        match self.action {
            TradeAction::Buy => self.stop_loss < self.entry && self.entry < self.take_profit,
            TradeAction::Sell => self.stop_loss > self.entry && self.entry > self.take_profit,
        }
    }

    /// Distance from entry to stop, always positive for coherent levels.
    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }
}
