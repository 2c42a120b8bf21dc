//! Position sizing: fixed-fractional and fractional Kelly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizingMethod {
    FixedFractional,
    Kelly,
}

impl SizingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizingMethod::FixedFractional => "Fixed Fractional",
            SizingMethod::Kelly => "Kelly",
        }
    }
}

/// Round down to the instrument's volume step.
pub fn round_to_step(volume: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return volume;
    }
    (volume / step).floor() * step
}

/// Lots from a bankroll fraction at risk and the stop distance.
///
/// `pip_value` is the account-currency value of one price unit per lot.
/// Returns 0 for degenerate inputs.
pub fn lots_for_risk(
    balance: f64,
    risk_fraction: f64,
    stop_distance: f64,
    pip_value: f64,
) -> f64 {
    if balance <= 0.0 || risk_fraction <= 0.0 || stop_distance <= 0.0 || pip_value <= 0.0 {
        return 0.0;
    }
    (balance * risk_fraction) / (stop_distance * pip_value)
}

/// Kelly fraction f* = W - (1 - W) / R, scaled by the configured fraction
/// and clamped to [0, 1]. None when R is unusable.
pub fn kelly_fraction(win_rate: f64, win_loss_ratio: f64, applied_fraction: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&win_rate) || win_loss_ratio <= 0.0 || !win_loss_ratio.is_finite() {
        return None;
    }
    let f_star = win_rate - (1.0 - win_rate) / win_loss_ratio;
    Some((applied_fraction * f_star.max(0.0)).clamp(0.0, 1.0))
}
