//! Rolling statistics and return transforms.

/// Arithmetic mean. 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator). 0.0 below 2 points.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Rolling mean over `window`; NaN until the window fills.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = sum / window as f64;
    for i in window..n {
        sum += values[i] - values[i - window];
        out[i] = sum / window as f64;
    }
    out
}

/// Rolling sample standard deviation over `window`; NaN until the window fills.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window < 2 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        out[i] = std_dev(&values[i + 1 - window..=i]);
    }
    out
}

/// Log returns of a close series: r[i] = ln(c[i] / c[i-1]).
///
/// First element is dropped (length n-1). Non-positive prices produce NaN.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 && w[1] > 0.0 {
                (w[1] / w[0]).ln()
            } else {
                f64::NAN
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn mean_and_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_approx(mean(&v), 5.0, DEFAULT_EPSILON);
        // sample std of the classic series
        assert_approx(std_dev(&v), (32.0f64 / 7.0).sqrt(), DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_mean_warmup_and_values() {
        let v = [1.0, 2.0, 3.0, 4.0];
        let rm = rolling_mean(&v, 2);
        assert!(rm[0].is_nan());
        assert_approx(rm[1], 1.5, DEFAULT_EPSILON);
        assert_approx(rm[3], 3.5, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_std_matches_scalar() {
        let v = [1.0, 2.0, 4.0, 8.0];
        let rs = rolling_std(&v, 3);
        assert!(rs[1].is_nan());
        assert_approx(rs[2], std_dev(&v[0..3]), DEFAULT_EPSILON);
        assert_approx(rs[3], std_dev(&v[1..4]), DEFAULT_EPSILON);
    }

    #[test]
    fn log_returns_basic() {
        let r = log_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert_approx(r[0], (1.1f64).ln(), DEFAULT_EPSILON);
        assert_approx(r[1], (0.9f64).ln(), DEFAULT_EPSILON);
    }

    #[test]
    fn log_returns_nan_on_nonpositive() {
        let r = log_returns(&[100.0, 0.0, 99.0]);
        assert!(r[0].is_nan());
        assert!(r[1].is_nan());
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[1.0]), 0.0);
        assert!(rolling_mean(&[1.0], 5).iter().all(|v| v.is_nan()));
    }
}
