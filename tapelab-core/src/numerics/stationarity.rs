//! Stationarity tests: Augmented Dickey-Fuller and KPSS (level).
//!
//! p-values are piecewise-linear interpolations of the standard critical
//! value tables, which is plenty for thresholding at 0.05. Both tests are
//! null-safe: fewer than `MIN_POINTS` finite observations yields None.

use serde::{Deserialize, Serialize};

use crate::numerics::rolling::mean;

pub const MIN_POINTS: usize = 20;

/// Combined result of both tests on a close series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StationarityResult {
    pub adf_stat: f64,
    pub adf_pvalue: f64,
    pub kpss_stat: f64,
    pub kpss_pvalue: f64,
}

impl StationarityResult {
    /// ADF rejects the unit root AND KPSS fails to reject stationarity.
    pub fn is_stationary(&self, p_threshold: f64) -> bool {
        self.adf_pvalue < p_threshold && self.kpss_pvalue >= p_threshold
    }
}

/// Solve the normal equations (X'X) b = X'y by Gaussian elimination with
/// partial pivoting. Returns None for singular systems.
fn ols(x: &[Vec<f64>], y: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = x.len();
    let k = x[0].len();
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for row in 0..n {
        for i in 0..k {
            xty[i] += x[row][i] * y[row];
            for j in 0..k {
                xtx[i][j] += x[row][i] * x[row][j];
            }
        }
    }

    // Augment and eliminate.
    for i in 0..k {
        let pivot_row = (i..k).max_by(|&a, &b| {
            xtx[a][i].abs().partial_cmp(&xtx[b][i].abs()).unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if xtx[pivot_row][i].abs() < 1e-12 {
            return None;
        }
        xtx.swap(i, pivot_row);
        xty.swap(i, pivot_row);
        for r in (i + 1)..k {
            let factor = xtx[r][i] / xtx[i][i];
            for c in i..k {
                xtx[r][c] -= factor * xtx[i][c];
            }
            xty[r] -= factor * xty[i];
        }
    }
    let mut beta = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = xty[i];
        for j in (i + 1)..k {
            sum -= xtx[i][j] * beta[j];
        }
        beta[i] = sum / xtx[i][i];
    }

    let residuals: Vec<f64> = (0..n)
        .map(|row| y[row] - (0..k).map(|i| x[row][i] * beta[i]).sum::<f64>())
        .collect();
    Some((beta, residuals))
}

fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    if x <= points[0].0 {
        return points[0].1;
    }
    if x >= points[points.len() - 1].0 {
        return points[points.len() - 1].1;
    }
    for w in points.windows(2) {
        if x >= w[0].0 && x <= w[1].0 {
            let t = (x - w[0].0) / (w[1].0 - w[0].0);
            return w[0].1 + t * (w[1].1 - w[0].1);
        }
    }
    points[points.len() - 1].1
}

/// Dickey-Fuller t-stat to p-value, constant-only regression.
fn adf_pvalue(t: f64) -> f64 {
    const TABLE: [(f64, f64); 8] = [
        (-4.5, 0.0001),
        (-3.43, 0.01),
        (-3.12, 0.025),
        (-2.86, 0.05),
        (-2.57, 0.10),
        (-1.94, 0.30),
        (-0.60, 0.90),
        (1.00, 0.999),
    ];
    interpolate(&TABLE, t)
}

/// KPSS level statistic to p-value.
fn kpss_pvalue(stat: f64) -> f64 {
    const TABLE: [(f64, f64); 6] = [
        (0.0, 0.99),
        (0.347, 0.10),
        (0.463, 0.05),
        (0.574, 0.025),
        (0.739, 0.01),
        (2.0, 0.001),
    ];
    interpolate(&TABLE, stat)
}

/// Augmented Dickey-Fuller test with constant and automatic lag
/// floor((n-1)^(1/3)).
pub fn adf_test(series: &[f64]) -> Option<(f64, f64)> {
    let y: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    let n = y.len();
    if n < MIN_POINTS {
        return None;
    }

    let lags = ((n as f64 - 1.0).powf(1.0 / 3.0).floor() as usize).min(n / 4);
    let diffs: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();

    // Rows: t = lags .. diffs.len(); regressors: [1, y_{t-1}, dy_{t-1..t-lags}]
    let mut x_rows = Vec::new();
    let mut targets = Vec::new();
    for t in lags..diffs.len() {
        let mut row = Vec::with_capacity(2 + lags);
        row.push(1.0);
        row.push(y[t]);
        for l in 1..=lags {
            row.push(diffs[t - l]);
        }
        x_rows.push(row);
        targets.push(diffs[t]);
    }
    if x_rows.len() <= x_rows[0].len() + 2 {
        return None;
    }

    let (beta, residuals) = ols(&x_rows, &targets)?;
    let dof = x_rows.len() - x_rows[0].len();
    let sigma2 = residuals.iter().map(|e| e * e).sum::<f64>() / dof as f64;

    // Standard error of the y_{t-1} coefficient from (X'X)^{-1}[1][1];
    // recompute via the partitioned form: SE = sqrt(sigma2 * inv_diag).
    let inv_diag = inverse_diagonal(&x_rows, 1)?;
    let se = (sigma2 * inv_diag).sqrt();
    if se <= 0.0 || !se.is_finite() {
        return None;
    }
    let t_stat = beta[1] / se;
    Some((t_stat, adf_pvalue(t_stat)))
}

/// Diagonal element of (X'X)^{-1} at `index`, via solving (X'X) v = e_index.
fn inverse_diagonal(x: &[Vec<f64>], index: usize) -> Option<f64> {
    let k = x[0].len();
    let mut xtx = vec![vec![0.0; k]; k];
    for row in x {
        for i in 0..k {
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    let mut rhs = vec![0.0; k];
    rhs[index] = 1.0;

    for i in 0..k {
        let pivot_row = (i..k).max_by(|&a, &b| {
            xtx[a][i].abs().partial_cmp(&xtx[b][i].abs()).unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if xtx[pivot_row][i].abs() < 1e-12 {
            return None;
        }
        xtx.swap(i, pivot_row);
        rhs.swap(i, pivot_row);
        for r in (i + 1)..k {
            let factor = xtx[r][i] / xtx[i][i];
            for c in i..k {
                xtx[r][c] -= factor * xtx[i][c];
            }
            rhs[r] -= factor * rhs[i];
        }
    }
    let mut v = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = rhs[i];
        for j in (i + 1)..k {
            sum -= xtx[i][j] * v[j];
        }
        v[i] = sum / xtx[i][i];
    }
    Some(v[index])
}

/// KPSS level-stationarity test with Bartlett-kernel long-run variance,
/// lag = floor(4 (n/100)^(1/4)).
pub fn kpss_test(series: &[f64]) -> Option<(f64, f64)> {
    let y: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    let n = y.len();
    if n < MIN_POINTS {
        return None;
    }

    let m = mean(&y);
    let resid: Vec<f64> = y.iter().map(|v| v - m).collect();

    let mut partial = Vec::with_capacity(n);
    let mut cum = 0.0;
    for e in &resid {
        cum += e;
        partial.push(cum);
    }
    let eta = partial.iter().map(|s| s * s).sum::<f64>() / (n * n) as f64;

    let lag = (4.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    let mut lrv = resid.iter().map(|e| e * e).sum::<f64>() / n as f64;
    for l in 1..=lag {
        let weight = 1.0 - l as f64 / (lag as f64 + 1.0);
        let mut gamma = 0.0;
        for t in l..n {
            gamma += resid[t] * resid[t - l];
        }
        lrv += 2.0 * weight * gamma / n as f64;
    }
    if lrv <= 0.0 || !lrv.is_finite() {
        return None;
    }
    let stat = eta / lrv;
    Some((stat, kpss_pvalue(stat)))
}

/// Run both tests on a close series.
pub fn stationarity(series: &[f64]) -> Option<StationarityResult> {
    let (adf_stat, adf_p) = adf_test(series)?;
    let (kpss_stat, kpss_p) = kpss_test(series)?;
    Some(StationarityResult {
        adf_stat,
        adf_pvalue: adf_p,
        kpss_stat,
        kpss_pvalue: kpss_p,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise(n: usize, seed: u64) -> Vec<f64> {
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
    fn too_short_is_none() {
        assert!(adf_test(&[1.0; 10]).is_none());
        assert!(kpss_test(&[1.0; 10]).is_none());
    }

    #[test]
    fn white_noise_is_stationary() {
        let series = noise(500, 9);
        let result = stationarity(&series).expect("result");
        assert!(result.adf_pvalue < 0.05, "adf p = {}", result.adf_pvalue);
        assert!(result.kpss_pvalue >= 0.05, "kpss p = {}", result.kpss_pvalue);
        assert!(result.is_stationary(0.05));
    }

    #[test]
    fn random_walk_is_not_stationary() {
        let steps = noise(500, 21);
        let mut walk = vec![100.0f64];
        for s in steps {
            let next = walk.last().unwrap() + s;
            walk.push(next);
        }
        let result = stationarity(&walk).expect("result");
        // KPSS rejects level stationarity decisively for an integrated series
        assert!(result.kpss_pvalue < 0.05, "kpss p = {}", result.kpss_pvalue);
        assert!(!result.is_stationary(0.05));
    }

    #[test]
    fn pvalue_interpolation_monotonic() {
        assert!(adf_pvalue(-4.0) < adf_pvalue(-3.0));
        assert!(adf_pvalue(-3.0) < adf_pvalue(-2.0));
        assert!(kpss_pvalue(0.2) > kpss_pvalue(0.5));
        assert!(kpss_pvalue(0.5) > kpss_pvalue(1.0));
    }
}
