//! Numerics kernel: pure functions over price/volume series.
//!
//! No hidden state: fit caches are explicit records passed in by the caller.
//! Kernels are NaN-tolerant and return NaN-padded vectors during warmup.

pub mod atr;
pub mod divergence;
pub mod garch;
pub mod hurst;
pub mod peaks;
pub mod rolling;
pub mod spectrum;
pub mod stationarity;

pub use atr::{atr, latest_atr, true_range, wilder_smooth};
pub use divergence::{
    bin_edges, flow_divergence, histogram, jensen_shannon_divergence, DivergenceBand, Histogram,
};
pub use garch::{fit_garch11, GarchCache, GarchError, GarchFit, GarchParams};
pub use hurst::{hurst_exponent, HurstRegime};
pub use peaks::{find_peaks, find_troughs, Peak};
pub use rolling::{log_returns, mean, rolling_mean, rolling_std, std_dev};
pub use spectrum::{dominant_cycle, DominantCycle};
pub use stationarity::{adf_test, kpss_test, stationarity, StationarityResult};

/// Shared tolerance for float comparison in kernel tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-9;

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "expected {expected}, got {actual} (eps {epsilon})"
    );
}
