//! Average True Range.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR uses Wilder smoothing (EMA with alpha = 1/period). Leading NaNs are
//! backfilled from the first valid value and the whole series is floored to a
//! small positive epsilon so downstream ratios never divide by zero.

use crate::domain::Bar;

/// Floor applied to every ATR value.
pub const ATR_EPSILON: f64 = 1e-10;

/// True Range series. TR[0] = high[0] - low[0] (no previous close).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let n = bars.len();
    let mut tr = vec![f64::NAN; n];
    if n == 0 {
        return tr;
    }

    let h = bars[0].high;
    let l = bars[0].low;
    if h.is_nan() || l.is_nan() {
        tr[0] = f64::NAN;
    } else {
        tr[0] = h - l;
    }

    for i in 1..n {
        let h = bars[i].high;
        let l = bars[i].low;
        let pc = bars[i - 1].close;
        if h.is_nan() || l.is_nan() || pc.is_nan() {
            tr[i] = f64::NAN;
        } else {
            tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
        }
    }

    tr
}

/// Wilder smoothing: seed with the mean of the first `period` valid values,
/// then prev + alpha * (value - prev) with alpha = 1/period.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    // First index with `period` consecutive non-NaN values.
    let seed_start = (0..n).find(|&i| {
        i + period <= n && values[i..i + period].iter().all(|v| !v.is_nan())
    });
    let seed_start = match seed_start {
        Some(s) => s,
        None => return result,
    };
    let seed_end = seed_start + period;

    let seed: f64 = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            // a hole after the seed leaves the remainder NaN
            return result;
        }
        let smoothed = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = smoothed;
        prev = smoothed;
    }

    result
}

/// ATR over `period` bars, same length as `bars`, with leading NaNs
/// backfilled and an epsilon floor.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let tr = true_range(bars);
    let mut smoothed = wilder_smooth(&tr, period);

    // Backfill the warmup prefix from the first valid value.
    if let Some(first_valid) = smoothed.iter().position(|v| !v.is_nan()) {
        let fill = smoothed[first_valid];
        for v in smoothed.iter_mut().take(first_valid) {
            *v = fill;
        }
    }

    for v in smoothed.iter_mut() {
        if !v.is_nan() {
            *v = v.max(ATR_EPSILON);
        }
    }
    smoothed
}

/// Latest ATR value, or None when the series never warmed up.
pub fn latest_atr(bars: &[Bar], period: usize) -> Option<f64> {
    let series = atr(bars, period);
    series.last().copied().filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::{assert_approx, DEFAULT_EPSILON};
    use chrono::{Duration, Utc};

    fn make_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let base = Utc::now();
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| {
                Bar::new(base + Duration::minutes(i as i64), open, high, low, close, 1000.0)
            })
            .collect()
    }

    #[test]
    fn true_range_includes_gaps() {
        let bars = make_bars(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // gap up: TR = max(7, 15, 8) = 15
        ]);
        let tr = true_range(&bars);
        assert_approx(tr[0], 5.0, DEFAULT_EPSILON);
        assert_approx(tr[1], 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn wilder_seed_and_recursion() {
        let values = [10.0, 8.0, 9.0, 6.0, 6.0];
        let s = wilder_smooth(&values, 3);
        assert!(s[0].is_nan());
        assert!(s[1].is_nan());
        assert_approx(s[2], 9.0, DEFAULT_EPSILON);
        // s[3] = (1/3)*6 + (2/3)*9 = 8
        assert_approx(s[3], 8.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_backfills_warmup() {
        let bars = make_bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0),
            (106.0, 107.0, 98.0, 99.0),
            (99.0, 103.0, 97.0, 101.0),
        ]);
        let a = atr(&bars, 3);
        // no NaNs anywhere once a seed exists
        assert!(a.iter().all(|v| !v.is_nan()));
        // prefix equals the first computed value
        assert_eq!(a[0], a[1]);
        assert_eq!(a[1], a[2]);
    }

    #[test]
    fn atr_floored_to_epsilon() {
        let bars = make_bars(&[(100.0, 100.0, 100.0, 100.0); 5]);
        let a = atr(&bars, 3);
        assert!(a.iter().all(|&v| v >= ATR_EPSILON));
    }

    #[test]
    fn latest_atr_none_when_insufficient() {
        let bars = make_bars(&[(100.0, 105.0, 95.0, 102.0)]);
        assert!(latest_atr(&bars, 14).is_none());
    }
}
