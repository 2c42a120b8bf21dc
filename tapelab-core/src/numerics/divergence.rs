//! Histogram binning and Jensen-Shannon divergence of flow distributions.
//!
//! Bin edges come from the baseline window's range; both windows are binned
//! on the same edges so the densities are comparable. Bins are left-closed,
//! right-open, with overflow going to the last bin. The divergence score is
//! the squared Jensen-Shannon distance in log base 2, bounded by [0, 1].

use serde::{Deserialize, Serialize};

const SMOOTHING_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub densities: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceBand {
    Normal,
    Diverging,
    StronglyDiverging,
    NoVariation,
}

impl DivergenceBand {
    /// Band the score: normal < t, diverging >= t, strongly >= 1.5 t.
    pub fn classify(score: f64, threshold: f64) -> Self {
        if score >= 1.5 * threshold {
            DivergenceBand::StronglyDiverging
        } else if score >= threshold {
            DivergenceBand::Diverging
        } else {
            DivergenceBand::Normal
        }
    }
}

/// Uniform bin edges over [min, max] of `reference` with `bins` bins.
/// None when the reference is empty or has no variation.
pub fn bin_edges(reference: &[f64], bins: usize) -> Option<Vec<f64>> {
    if reference.is_empty() || bins == 0 {
        return None;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in reference {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if !min.is_finite() || !max.is_finite() || max <= min {
        return None;
    }
    let width = (max - min) / bins as f64;
    Some((0..=bins).map(|i| min + width * i as f64).collect())
}

/// Histogram of `values` on `edges`, epsilon-smoothed and renormalized so the
/// densities sum to 1. Values below the first edge land in bin 0; values at
/// or above the last edge land in the final bin.
pub fn histogram(values: &[f64], edges: &[f64]) -> Histogram {
    let bins = edges.len().saturating_sub(1);
    let mut counts = vec![0.0f64; bins];
    let lo = edges[0];
    let width = (edges[bins] - lo) / bins as f64;
    for &v in values {
        if !v.is_finite() {
            continue;
        }
        let idx = if v <= lo {
            0
        } else {
            (((v - lo) / width).floor() as usize).min(bins - 1)
        };
        counts[idx] += 1.0;
    }

    let smoothed: Vec<f64> = counts.iter().map(|c| c + SMOOTHING_EPS).collect();
    let total: f64 = smoothed.iter().sum();
    Histogram {
        edges: edges.to_vec(),
        densities: smoothed.iter().map(|c| c / total).collect(),
    }
}

/// Jensen-Shannon divergence (base 2) between two densities on the same
/// edges. Symmetric, bounded by [0, 1]. This is the squared JS distance.
pub fn jensen_shannon_divergence(p: &Histogram, q: &Histogram) -> f64 {
    debug_assert_eq!(p.densities.len(), q.densities.len());
    let mut div = 0.0;
    for (pi, qi) in p.densities.iter().zip(&q.densities) {
        let mi = 0.5 * (pi + qi);
        if *pi > 0.0 {
            div += 0.5 * pi * (pi / mi).log2();
        }
        if *qi > 0.0 {
            div += 0.5 * qi * (qi / mi).log2();
        }
    }
    div.clamp(0.0, 1.0)
}

/// Full pipeline: bin `recent` and `baseline` on the baseline's range and
/// return (score, band). `NoVariation` when the baseline cannot define bins.
pub fn flow_divergence(
    recent: &[f64],
    baseline: &[f64],
    bins: usize,
    threshold: f64,
) -> (f64, DivergenceBand) {
    let edges = match bin_edges(baseline, bins) {
        Some(e) => e,
        None => return (0.0, DivergenceBand::NoVariation),
    };
    if recent.is_empty() {
        return (0.0, DivergenceBand::NoVariation);
    }
    let p = histogram(recent, &edges);
    let q = histogram(baseline, &edges);
    let score = jensen_shannon_divergence(&p, &q);
    (score, DivergenceBand::classify(score, threshold))
}
