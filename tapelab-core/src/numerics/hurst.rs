//! Hurst exponent via rescaled-range (R/S) analysis.
//!
//! H > 0.5 indicates long-memory trending behavior, H < 0.5 mean reversion.
//! Estimated as the slope of log(R/S) against log(n) over a ladder of
//! sub-series lengths.

use serde::{Deserialize, Serialize};

use crate::numerics::rolling::mean;

/// Minimum series length for a meaningful estimate.
pub const MIN_POINTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HurstRegime {
    Trending,
    MeanReverting,
    Random,
}

impl HurstRegime {
    /// Classify an exponent against the configured thresholds.
    pub fn classify(h: f64, upper: f64, lower: f64) -> Self {
        if h > upper {
            HurstRegime::Trending
        } else if h < lower {
            HurstRegime::MeanReverting
        } else {
            HurstRegime::Random
        }
    }
}

/// Rescaled range of one sub-series. None for degenerate (zero-deviation)
/// chunks.
fn rescaled_range(chunk: &[f64]) -> Option<f64> {
    let m = mean(chunk);
    let mut cum = 0.0;
    let mut max_dev = f64::MIN;
    let mut min_dev = f64::MAX;
    let mut sq_sum = 0.0;
    for &v in chunk {
        let dev = v - m;
        cum += dev;
        max_dev = max_dev.max(cum);
        min_dev = min_dev.min(cum);
        sq_sum += dev * dev;
    }
    let range = max_dev - min_dev;
    let std = (sq_sum / chunk.len() as f64).sqrt();
    (std > 0.0 && range > 0.0).then(|| range / std)
}

/// Estimate the Hurst exponent of a (return) series.
///
/// Returns None when fewer than `MIN_POINTS` finite values are available or
/// when every sub-series is degenerate.
pub fn hurst_exponent(series: &[f64]) -> Option<f64> {
    let values: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    let n = values.len();
    if n < MIN_POINTS {
        return None;
    }

    // Ladder of sub-series lengths: 10 .. n/2, geometric-ish spacing.
    let mut sizes = Vec::new();
    let mut size = 10usize;
    while size <= n / 2 {
        sizes.push(size);
        size = ((size as f64) * 1.5).ceil() as usize;
    }
    if sizes.len() < 3 {
        return None;
    }

    let mut log_n = Vec::with_capacity(sizes.len());
    let mut log_rs = Vec::with_capacity(sizes.len());
    for &sz in &sizes {
        let chunks = n / sz;
        let mut rs_values = Vec::with_capacity(chunks);
        for c in 0..chunks {
            if let Some(rs) = rescaled_range(&values[c * sz..(c + 1) * sz]) {
                rs_values.push(rs);
            }
        }
        if rs_values.is_empty() {
            continue;
        }
        log_n.push((sz as f64).ln());
        log_rs.push(mean(&rs_values).ln());
    }
    if log_n.len() < 3 {
        return None;
    }

    // OLS slope of log(R/S) on log(n).
    let mx = mean(&log_n);
    let my = mean(&log_rs);
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..log_n.len() {
        num += (log_n[i] - mx) * (log_rs[i] - my);
        den += (log_n[i] - mx).powi(2);
    }
    if den <= 0.0 {
        return None;
    }
    let h = num / den;
    h.is_finite().then_some(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn gaussian_steps(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let u1: f64 = rng.gen_range(1e-12..1.0);
                let u2: f64 = rng.gen_range(0.0..1.0);
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    #[test]
    fn short_series_is_none() {
        assert!(hurst_exponent(&[1.0; 50]).is_none());
    }

    #[test]
    fn random_walk_increments_near_half() {
        // i.i.d. increments of a random walk: H ≈ 0.5
        let steps = gaussian_steps(4000, 11);
        let h = hurst_exponent(&steps).expect("estimate");
        assert!((h - 0.5).abs() < 0.12, "H = {h}");
    }

    #[test]
    fn trending_series_above_half() {
        // Persistent series: x_t = 0.8 x_{t-1} + noise produces H > 0.5
        let noise = gaussian_steps(4000, 5);
        let mut x = vec![0.0f64; noise.len()];
        for i in 1..noise.len() {
            x[i] = 0.8 * x[i - 1] + noise[i];
        }
        let h = hurst_exponent(&x).expect("estimate");
        assert!(h > 0.55, "H = {h}");
    }

    #[test]
    fn classify_bands() {
        assert_eq!(HurstRegime::classify(0.6, 0.55, 0.45), HurstRegime::Trending);
        assert_eq!(HurstRegime::classify(0.4, 0.55, 0.45), HurstRegime::MeanReverting);
        assert_eq!(HurstRegime::classify(0.5, 0.55, 0.45), HurstRegime::Random);
    }

    #[test]
    fn constant_series_is_none() {
        assert!(hurst_exponent(&[5.0; 300]).is_none());
    }
}
