//! Prominence-based peak detection for pivot extraction.
//!
//! A peak is a strict local maximum; its prominence is the height above the
//! higher of the two deepest valleys separating it from taller terrain,
//! matching the usual topographic definition.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub index: usize,
    pub value: f64,
    pub prominence: f64,
}

/// Find local maxima with prominence >= `min_prominence`.
///
/// Plateau peaks report their first index. NaN values break the series into
/// independent segments.
pub fn find_peaks(values: &[f64], min_prominence: f64) -> Vec<Peak> {
    let n = values.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }

    let mut i = 1;
    while i < n - 1 {
        let v = values[i];
        if v.is_nan() {
            i += 1;
            continue;
        }
        // strictly rising into i
        if !(values[i - 1] < v) {
            i += 1;
            continue;
        }
        // walk a plateau
        let start = i;
        let mut j = i;
        while j + 1 < n && values[j + 1] == v {
            j += 1;
        }
        if j + 1 < n && values[j + 1] < v {
            if let Some(prominence) = prominence_at(values, start, v) {
                if prominence >= min_prominence {
                    peaks.push(Peak { index: start, value: v, prominence });
                }
            }
        }
        i = j + 1;
    }
    peaks
}

/// Prominence of the peak at `index` with height `height`.
fn prominence_at(values: &[f64], index: usize, height: f64) -> Option<f64> {
    // Walk left until terrain exceeds the peak; track the minimum en route.
    let mut left_min = f64::INFINITY;
    let mut k = index;
    loop {
        if k == 0 {
            break;
        }
        k -= 1;
        let v = values[k];
        if v.is_nan() {
            break;
        }
        if v > height {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = f64::INFINITY;
    let mut k = index;
    loop {
        if k + 1 >= values.len() {
            break;
        }
        k += 1;
        let v = values[k];
        if v.is_nan() {
            break;
        }
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    let base = match (left_min.is_finite(), right_min.is_finite()) {
        (true, true) => left_min.max(right_min),
        (true, false) => left_min,
        (false, true) => right_min,
        (false, false) => return None,
    };
    Some(height - base)
}

/// Troughs: peaks of the negated series.
pub fn find_troughs(values: &[f64], min_prominence: f64) -> Vec<Peak> {
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    find_peaks(&negated, min_prominence)
        .into_iter()
        .map(|p| Peak { index: p.index, value: -p.value, prominence: p.prominence })
        .collect()
}
