//! Volume Spread Analysis pattern rules.
//!
//! Fixed rule set over the last bar against its volume average and ATR.
//! Rules are checked in declaration order; the first match wins.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::numerics::rolling::mean;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VsaSignal {
    NoDemand,
    NoSupply,
    UpthrustPotential,
    StoppingVolume,
}

impl VsaSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            VsaSignal::NoDemand => "NoDemand",
            VsaSignal::NoSupply => "NoSupply",
            VsaSignal::UpthrustPotential => "UpthrustPotential",
            VsaSignal::StoppingVolume => "StoppingVolume",
        }
    }

    /// Directional implication: +1 bullish, -1 bearish.
    pub fn bias(&self) -> i8 {
        match self {
            VsaSignal::NoSupply | VsaSignal::StoppingVolume => 1,
            VsaSignal::NoDemand | VsaSignal::UpthrustPotential => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VsaRead {
    pub signal: VsaSignal,
    pub confidence: f64,
}

/// Detect a VSA pattern on the final bar.
///
/// `vol_factor_low`/`vol_factor_high` bound the volume ratio for the quiet
/// and climactic rules; `spread_factor` is the wide-spread multiple of ATR.
pub fn detect(
    bars: &[Bar],
    atr: f64,
    volume_avg_period: usize,
    vol_factor_low: f64,
    vol_factor_high: f64,
    spread_factor: f64,
) -> Option<VsaRead> {
    let n = bars.len();
    if n < volume_avg_period + 1 || atr <= 0.0 {
        return None;
    }
    let bar = &bars[n - 1];
    let prev = &bars[n - 2];

    let volumes: Vec<f64> = bars[n - 1 - volume_avg_period..n - 1].iter().map(|b| b.volume).collect();
    let avg_volume = mean(&volumes);
    if avg_volume <= 0.0 {
        return None;
    }

    let vol_ratio = bar.volume / avg_volume;
    let spread_ratio = bar.range() / atr;
    let close_pos = bar.close_position();

    // NoDemand: narrow quiet up-bar that still loses ground.
    if bar.is_bullish() && spread_ratio < 0.5 && vol_ratio < vol_factor_low && bar.close < prev.close
    {
        return Some(VsaRead { signal: VsaSignal::NoDemand, confidence: 0.7 });
    }
    // NoSupply: narrow quiet down-bar that still gains ground.
    if bar.is_bearish() && spread_ratio < 0.5 && vol_ratio < vol_factor_low && bar.close > prev.close
    {
        return Some(VsaRead { signal: VsaSignal::NoSupply, confidence: 0.7 });
    }
    // UpthrustPotential: heavy up-bar closing in its lower third.
    if bar.is_bullish() && close_pos < 0.33 && vol_ratio > vol_factor_high {
        return Some(VsaRead { signal: VsaSignal::UpthrustPotential, confidence: 0.6 });
    }
    // StoppingVolume: very wide climactic bar closing mid-range.
    if spread_ratio > spread_factor
        && vol_ratio > vol_factor_high
        && (0.33..=0.66).contains(&close_pos)
    {
        return Some(VsaRead { signal: VsaSignal::StoppingVolume, confidence: 0.65 });
    }
    None
}
