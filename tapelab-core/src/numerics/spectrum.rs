//! Dominant-cycle detection from the power spectrum of a detrended series.
//!
//! Plain DFT over at most a few hundred points; no FFT crate, matching the
//! self-contained kernel style of the rest of this module. Reported power is
//! the dominant bin's share of total non-DC power, so the threshold is scale
//! free.

use serde::{Deserialize, Serialize};

use crate::numerics::rolling::rolling_mean;

pub const MIN_POINTS: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DominantCycle {
    /// Period in bars.
    pub period: f64,
    /// Share of total spectral power in [0, 1].
    pub power: f64,
}

/// Detrend by subtracting a trailing moving-average baseline; falls back to
/// first differencing when the window cannot fill.
fn detrend(series: &[f64], ma_window: usize) -> Vec<f64> {
    let n = series.len();
    if n > ma_window && ma_window >= 2 {
        let ma = rolling_mean(series, ma_window);
        // trailing MA leaves the first window-1 entries NaN; skip them
        (ma_window - 1..n).map(|i| series[i] - ma[i]).collect()
    } else {
        series.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// Detect the dominant cycle of `series`.
///
/// Returns None when the series is too short, degenerate, or when the
/// dominant bin's power share is below `power_threshold`.
pub fn dominant_cycle(series: &[f64], power_threshold: f64) -> Option<DominantCycle> {
    let values: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if values.len() < MIN_POINTS {
        return None;
    }

    let detrended = detrend(&values, values.len() / 4);
    let n = detrended.len();
    if n < MIN_POINTS / 2 {
        return None;
    }

    // One-sided power spectrum, excluding DC and Nyquist.
    let mut best_k = 0usize;
    let mut best_power = 0.0f64;
    let mut total_power = 0.0f64;
    for k in 1..n / 2 {
        let mut re = 0.0;
        let mut im = 0.0;
        let omega = -2.0 * std::f64::consts::PI * k as f64 / n as f64;
        for (t, &v) in detrended.iter().enumerate() {
            let phase = omega * t as f64;
            re += v * phase.cos();
            im += v * phase.sin();
        }
        let power = re * re + im * im;
        total_power += power;
        if power > best_power {
            best_power = power;
            best_k = k;
        }
    }
    if total_power <= 0.0 || best_k == 0 {
        return None;
    }

    let share = best_power / total_power;
    if share < power_threshold {
        return None;
    }
    Some(DominantCycle {
        period: n as f64 / best_k as f64,
        power: share,
    })
}
