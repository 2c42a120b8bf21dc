//! Bayesian adaptive thresholds for delta, imbalance and absorption.
//!
//! Each metric keeps a normal-conjugate posterior over its typical
//! magnitude, fed from a capped observation buffer. On refresh the new
//! threshold blends the posterior estimate with the previous value, and the
//! delta threshold additionally scales linearly with current volatility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::numerics::rolling::{mean, std_dev};
use crate::store::ring::BoundedRing;

/// Normal-conjugate estimator with a bounded observation buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianEstimator {
    pub prior_mean: f64,
    pub prior_variance: f64,
    observations: BoundedRing<f64>,
}

impl BayesianEstimator {
    pub fn new(prior_mean: f64, prior_variance: f64, cap: usize) -> Self {
        Self {
            prior_mean,
            prior_variance: prior_variance.max(1e-12),
            observations: BoundedRing::new(cap.max(1)),
        }
    }

    pub fn observe(&mut self, value: f64) {
        if value.is_finite() {
            self.observations.push(value);
        }
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Posterior mean under a known-variance normal model: precision-weighted
    /// blend of the prior and the sample mean.
    pub fn posterior_mean(&self) -> f64 {
        let n = self.observations.len();
        if n == 0 {
            return self.prior_mean;
        }
        let values: Vec<f64> = self.observations.iter().copied().collect();
        let sample_mean = mean(&values);
        let sample_var = std_dev(&values).powi(2).max(1e-12);

        let prior_precision = 1.0 / self.prior_variance;
        let data_precision = n as f64 / sample_var;
        (prior_precision * self.prior_mean + data_precision * sample_mean)
            / (prior_precision + data_precision)
    }
}

/// The live threshold set for one slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicThresholds {
    pub delta: f64,
    pub imbalance: f64,
    pub absorption: f64,
    pub last_update: Option<DateTime<Utc>>,
    /// Volatility ratio applied to the delta threshold at the last refresh.
    pub vol_basis: f64,
}

impl DynamicThresholds {
    pub fn new(delta: f64, imbalance: f64, absorption: f64) -> Self {
        Self { delta, imbalance, absorption, last_update: None, vol_basis: 1.0 }
    }

    pub fn refresh_due(&self, now: DateTime<Utc>, interval_secs: i64) -> bool {
        match self.last_update {
            None => true,
            Some(t) => (now - t).num_seconds() >= interval_secs,
        }
    }

    /// Refresh from the posteriors.
    ///
    /// `blend` weights the posterior against the previous threshold;
    /// `vol_ratio` (current vs. baseline volatility, 1.0 = unchanged)
    /// linearly scales the delta threshold.
    pub fn refresh(
        &mut self,
        delta_posterior: f64,
        imbalance_posterior: f64,
        blend: f64,
        vol_ratio: f64,
        now: DateTime<Utc>,
    ) {
        let blend = blend.clamp(0.0, 1.0);
        let vol_ratio = if vol_ratio.is_finite() && vol_ratio > 0.0 { vol_ratio } else { 1.0 };

        self.delta = (blend * delta_posterior + (1.0 - blend) * self.delta) * vol_ratio;
        self.imbalance =
            (blend * imbalance_posterior + (1.0 - blend) * self.imbalance).clamp(0.05, 0.95);
        self.vol_basis = vol_ratio;
        self.last_update = Some(now);
        debug!(
            delta = self.delta,
            imbalance = self.imbalance,
            vol_ratio,
            "thresholds refreshed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn posterior_equals_prior_without_data() {
        let est = BayesianEstimator::new(500.0, 100.0, 50);
        assert_eq!(est.posterior_mean(), 500.0);
    }

    #[test]
    fn posterior_moves_toward_data() {
        let mut est = BayesianEstimator::new(500.0, 100.0, 100);
        for _ in 0..50 {
            est.observe(1000.0 + (est.observation_count() % 5) as f64);
        }
        let post = est.posterior_mean();
        assert!(post > 900.0, "posterior {post}");
    }

    #[test]
    fn buffer_caps_observations() {
        let mut est = BayesianEstimator::new(0.0, 1.0, 10);
        for i in 0..100 {
            est.observe(i as f64);
        }
        assert_eq!(est.observation_count(), 10);
    }

    #[test]
    fn nan_observations_ignored() {
        let mut est = BayesianEstimator::new(0.0, 1.0, 10);
        est.observe(f64::NAN);
        assert_eq!(est.observation_count(), 0);
    }

    #[test]
    fn refresh_cadence() {
        let mut thresholds = DynamicThresholds::new(500.0, 0.3, 1.5);
        assert!(thresholds.refresh_due(now(), 300));
        thresholds.refresh(600.0, 0.4, 0.8, 1.0, now());
        assert!(!thresholds.refresh_due(now() + chrono::Duration::seconds(100), 300));
        assert!(thresholds.refresh_due(now() + chrono::Duration::seconds(300), 300));
    }

    #[test]
    fn blend_weights_posterior() {
        let mut thresholds = DynamicThresholds::new(500.0, 0.3, 1.5);
        thresholds.refresh(1000.0, 0.5, 0.8, 1.0, now());
        // 0.8 * 1000 + 0.2 * 500 = 900
        assert!((thresholds.delta - 900.0).abs() < 1e-9);
        assert!((thresholds.imbalance - 0.46).abs() < 1e-9);
    }

    #[test]
    fn delta_threshold_scales_with_volatility() {
        let mut thresholds = DynamicThresholds::new(500.0, 0.3, 1.5);
        thresholds.refresh(500.0, 0.3, 1.0, 2.0, now());
        assert!((thresholds.delta - 1000.0).abs() < 1e-9);
        assert_eq!(thresholds.vol_basis, 2.0);
        // imbalance threshold is volatility-independent
        assert!((thresholds.imbalance - 0.3).abs() < 1e-9);
    }
}
