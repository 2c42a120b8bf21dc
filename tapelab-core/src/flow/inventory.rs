//! Per-symbol inventory model.
//!
//! Position drifts toward the neutral level at `mean_reversion_rate` per
//! bar; the current displacement contributes a signed score adjustment that
//! leans the flow score against further accumulation on the loaded side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::InventoryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryModel {
    pub position: f64,
    pub neutral_level: f64,
    pub max_position: f64,
    pub risk_aversion: f64,
    pub mean_reversion_rate: f64,
    pub last_update: Option<DateTime<Utc>>,
}

impl InventoryModel {
    pub fn new(config: &InventoryConfig) -> Self {
        Self {
            position: config.neutral_level,
            neutral_level: config.neutral_level,
            max_position: config.max_position.max(f64::MIN_POSITIVE),
            risk_aversion: config.risk_aversion,
            mean_reversion_rate: config.mean_reversion_rate,
            last_update: None,
        }
    }

    /// Normalized displacement from neutral in [-1, 1].
    pub fn displacement(&self) -> f64 {
        ((self.position - self.neutral_level) / self.max_position).clamp(-1.0, 1.0)
    }

    /// Signed score adjustment added after score normalization.
    ///
    /// A loaded long inventory produces a negative adjustment (lean against
    /// more buying) and vice versa; magnitude is bounded by
    /// `risk_aversion * 10`.
    pub fn score_adjustment(&self) -> f64 {
        -self.displacement() * self.risk_aversion * 10.0
    }

    /// Record a fill: positive volume for buys, negative for sells.
    pub fn apply_fill(&mut self, signed_volume: f64, at: DateTime<Utc>) {
        self.position =
            (self.position + signed_volume).clamp(-self.max_position, self.max_position);
        self.last_update = Some(at);
    }

    /// One decay step toward neutral, called per completed bar.
    pub fn decay(&mut self, at: DateTime<Utc>) {
        self.position += self.mean_reversion_rate * (self.neutral_level - self.position);
        self.last_update = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn model() -> InventoryModel {
        InventoryModel::new(&InventoryConfig {
            max_position: 2.0,
            neutral_level: 0.0,
            risk_aversion: 0.1,
            mean_reversion_rate: 0.1,
        })
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn neutral_inventory_no_adjustment() {
        assert_eq!(model().score_adjustment(), 0.0);
    }

    #[test]
    fn long_inventory_leans_short() {
        let mut inv = model();
        inv.apply_fill(2.0, at());
        // displacement 1.0 -> adjustment -risk_aversion * 10
        assert!((inv.score_adjustment() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn short_inventory_leans_long() {
        let mut inv = model();
        inv.apply_fill(-1.0, at());
        assert!(inv.score_adjustment() > 0.0);
    }

    #[test]
    fn fills_clamp_to_max_position() {
        let mut inv = model();
        inv.apply_fill(10.0, at());
        assert_eq!(inv.position, 2.0);
    }

    #[test]
    fn decay_converges_to_neutral() {
        let mut inv = model();
        inv.apply_fill(2.0, at());
        for _ in 0..100 {
            inv.decay(at());
        }
        assert!(inv.position.abs() < 1e-3);
    }
}
