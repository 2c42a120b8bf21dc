//! Fibonacci retracement and harmonic pattern levels.
//!
//! The retracement grid spans the last significant swing (highest high to
//! lowest low over the lookback); a level is "active" when price sits within
//! a fraction of ATR of it. Harmonic detection checks the last four pivots
//! for AB=CD and Gartley ratio structures with a symmetric tolerance.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::numerics::peaks::{find_peaks, find_troughs};

pub const FIB_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];
const HARMONIC_TOLERANCE: f64 = 0.1;
const LEVEL_PROXIMITY_ATR: f64 = 0.25;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FibLevel {
    /// Retracement ratio, one of `FIB_RATIOS`.
    pub ratio: f64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarmonicPattern {
    AbEqualsCd,
    Gartley,
}

/// The retracement level price is currently pinned to, if any.
pub fn active_fib_level(bars: &[Bar], atr: f64) -> Option<FibLevel> {
    if bars.len() < 20 || atr <= 0.0 {
        return None;
    }
    let high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    if !(high > low) {
        return None;
    }

    // Retrace from the extreme reached last: find which came later.
    let high_idx = bars
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.high.partial_cmp(&b.1.high).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)?;
    let low_idx = bars
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.low.partial_cmp(&b.1.low).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)?;

    let swing = high - low;
    let close = bars.last()?.close;
    let mut best: Option<FibLevel> = None;
    for ratio in FIB_RATIOS {
        // Upswing retraces down from the high; downswing retraces up.
        let price = if high_idx > low_idx { high - swing * ratio } else { low + swing * ratio };
        let dist = (close - price).abs();
        if dist <= LEVEL_PROXIMITY_ATR * atr
            && best.map(|b| dist < (close - b.price).abs()).unwrap_or(true)
        {
            best = Some(FibLevel { ratio, price });
        }
    }
    best
}

/// Alternating pivot sequence (trough/peak) ordered by bar index.
fn alternating_pivots(bars: &[Bar], min_prominence: f64) -> Vec<(usize, f64)> {
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let mut pivots: Vec<(usize, f64)> = find_peaks(&highs, min_prominence)
        .into_iter()
        .map(|p| (p.index, p.value))
        .chain(find_troughs(&lows, min_prominence).into_iter().map(|p| (p.index, p.value)))
        .collect();
    pivots.sort_by_key(|(i, _)| *i);
    pivots
}

/// Check the trailing pivots for a harmonic structure.
///
/// Gartley needs five pivots (X, A, B, C, D); AB=CD needs four (A, B, C, D).
pub fn active_harmonic(bars: &[Bar], atr: f64) -> Option<HarmonicPattern> {
    if bars.len() < 30 || atr <= 0.0 {
        return None;
    }
    let pivots = alternating_pivots(bars, atr);
    let within = |value: f64, target: f64| (value - target).abs() <= HARMONIC_TOLERANCE * target;

    if pivots.len() >= 5 {
        let tail = &pivots[pivots.len() - 5..];
        let xa = (tail[1].1 - tail[0].1).abs();
        let ab = (tail[2].1 - tail[1].1).abs();
        let bc = (tail[3].1 - tail[2].1).abs();
        if xa > 0.0 && ab > 0.0 {
            // Gartley: B retraces ~0.618 of XA, C retraces 0.382..0.886 of AB.
            let bc_over_ab = bc / ab;
            if within(ab / xa, 0.618)
                && bc_over_ab >= 0.382 - HARMONIC_TOLERANCE
                && bc_over_ab <= 0.886 + HARMONIC_TOLERANCE
            {
                return Some(HarmonicPattern::Gartley);
            }
        }
    }

    if pivots.len() >= 4 {
        let tail = &pivots[pivots.len() - 4..];
        let ab = (tail[1].1 - tail[0].1).abs();
        let cd = (tail[3].1 - tail[2].1).abs();
        if ab > 0.0 && within(cd / ab, 1.0) {
            return Some(HarmonicPattern::AbEqualsCd);
        }
    }
    None
}
