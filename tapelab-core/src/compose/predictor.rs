//! Pluggable directional predictor capability.
//!
//! The core never trains models; it consumes a pre-trained predictor
//! through this seam. Features are a fixed, named record derived from the
//! two analyzer snapshots so any implementation sees the same inputs.

use serde::{Deserialize, Serialize};

use crate::flow::FlowSnapshot;
use crate::structure::StructureSnapshot;

/// Feature record handed to a predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorFeatures {
    pub structure_score: f64,
    pub structure_direction: f64,
    pub flow_score: f64,
    pub flow_direction: f64,
    pub wyckoff_bias: f64,
    pub wyckoff_confidence: f64,
    pub hurst: f64,
    pub delta_strength: f64,
    pub delta_consistency: f64,
    pub bid_ask_imbalance: f64,
    pub flow_divergence_score: f64,
    pub garch_volatility: f64,
    pub in_demand_zone: f64,
    pub in_supply_zone: f64,
}

impl PredictorFeatures {
    pub fn from_snapshots(ms: &StructureSnapshot, of: &FlowSnapshot) -> Self {
        Self {
            structure_score: ms.structure_score,
            structure_direction: ms.direction.sign() as f64,
            flow_score: of.flow_score,
            flow_direction: of.direction.sign() as f64,
            wyckoff_bias: ms.wyckoff_phase.bias() as f64,
            wyckoff_confidence: ms.wyckoff_confidence,
            hurst: ms.hurst.unwrap_or(0.5),
            delta_strength: of.delta.strength,
            delta_consistency: of.delta.consistency,
            bid_ask_imbalance: of.bid_ask_imbalance,
            flow_divergence_score: of.flow_divergence_score,
            garch_volatility: of.garch_volatility_forecast.unwrap_or(0.0),
            in_demand_zone: if ms.price_in_demand_zone { 1.0 } else { 0.0 },
            in_supply_zone: if ms.price_in_supply_zone { 1.0 } else { 0.0 },
        }
    }
}

/// A pre-trained up-probability predictor.
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    /// P(up) in [0, 1]. None when the predictor cannot score the input;
    /// the composer then emits no signal for this evaluation.
    fn predict(&self, features: &PredictorFeatures) -> Option<f64>;
}

/// Fixed-probability predictor for tests and wiring checks.
pub struct ConstantPredictor {
    pub p_up: f64,
}

impl Predictor for ConstantPredictor {
    fn name(&self) -> &str {
        "constant"
    }

    fn predict(&self, _features: &PredictorFeatures) -> Option<f64> {
        Some(self.p_up.clamp(0.0, 1.0))
    }
}
