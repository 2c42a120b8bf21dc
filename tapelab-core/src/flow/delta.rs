//! Signed trade-delta analysis.
//!
//! Per-bar delta is the bar volume signed by its body. Consistency measures
//! how often the recent window agrees with the cumulative sign; strength
//! normalizes the cumulative delta by its historical dispersion.

use serde::{Deserialize, Serialize};

use crate::numerics::rolling::std_dev;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeltaRead {
    /// Most recent signed delta.
    pub last: f64,
    /// Cumulative delta over the analysis window.
    pub cumulative: f64,
    /// Fraction of window bars agreeing with the cumulative sign, [0, 1].
    pub consistency: f64,
    /// |cumulative| normalized by dispersion, clamped to [0, 1].
    pub strength: f64,
    /// -1, 0 or +1.
    pub direction: i8,
}

/// Analyze the trailing `window` of a signed-delta history.
pub fn analyze(history: &[f64], window: usize) -> DeltaRead {
    let tail: Vec<f64> = history
        .iter()
        .rev()
        .take(window)
        .copied()
        .filter(|d| d.is_finite())
        .collect();
    if tail.is_empty() {
        return DeltaRead { last: 0.0, cumulative: 0.0, consistency: 0.0, strength: 0.0, direction: 0 };
    }

    let last = tail[0];
    let cumulative: f64 = tail.iter().sum();
    let direction = if cumulative > 0.0 {
        1
    } else if cumulative < 0.0 {
        -1
    } else {
        0
    };

    let agreeing = tail
        .iter()
        .filter(|d| (direction > 0 && **d > 0.0) || (direction < 0 && **d < 0.0))
        .count();
    let consistency = if direction == 0 { 0.0 } else { agreeing as f64 / tail.len() as f64 };

    // Normalize against the dispersion of the full history, not just the
    // window, so a quiet tape keeps strength low.
    let all: Vec<f64> = history.iter().copied().filter(|d| d.is_finite()).collect();
    let sd = std_dev(&all);
    let strength = if sd > 0.0 {
        (cumulative.abs() / (sd * (tail.len() as f64).sqrt())).clamp(0.0, 1.0)
    } else {
        0.0
    };

    DeltaRead { last, cumulative, consistency, strength, direction }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_is_neutral() {
        let read = analyze(&[], 20);
        assert_eq!(read.direction, 0);
        assert_eq!(read.strength, 0.0);
    }

    #[test]
    fn one_sided_buying_is_consistent() {
        let history: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let read = analyze(&history, 20);
        assert_eq!(read.direction, 1);
        assert_eq!(read.consistency, 1.0);
        assert!(read.strength > 0.5);
    }

    #[test]
    fn balanced_tape_is_weak() {
        let history: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 100.0 } else { -100.0 }).collect();
        let read = analyze(&history, 20);
        assert!(read.consistency <= 0.5);
        assert!(read.strength < 0.3);
    }

    #[test]
    fn selling_pressure_is_negative() {
        let history = vec![-500.0; 30];
        let read = analyze(&history, 20);
        assert_eq!(read.direction, -1);
        assert_eq!(read.consistency, 1.0);
        assert_eq!(read.cumulative, -10_000.0);
    }

    #[test]
    fn window_clamps_to_history() {
        let history = vec![10.0; 5];
        let read = analyze(&history, 100);
        assert_eq!(read.cumulative, 50.0);
    }
}
