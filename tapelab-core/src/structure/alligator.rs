//! Alligator triplet: three shifted moving averages of median price.
//!
//! Jaw/teeth/lips default to periods 13/8/5 with forward shifts 8/5/3; the
//! value consulted at bar t is the average computed shift bars earlier. Line
//! separation relative to ATR decides whether the alligator is sleeping,
//! awakening, or feeding.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::numerics::rolling::rolling_mean;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlligatorState {
    Sleeping,
    Awakening,
    FeedingUp,
    FeedingDown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlligatorRead {
    pub jaw: f64,
    pub teeth: f64,
    pub lips: f64,
    pub state: AlligatorState,
    /// Mean slope of the three lines over the last bar, in price units.
    pub slope: f64,
}

fn median_prices(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| (b.high + b.low) / 2.0).collect()
}

/// Value of a forward-shifted MA at the final bar: the average computed
/// `shift` bars back. None during warmup.
fn shifted_last(ma: &[f64], shift: usize) -> Option<f64> {
    let n = ma.len();
    if n <= shift {
        return None;
    }
    let v = ma[n - 1 - shift];
    (!v.is_nan()).then_some(v)
}

/// Read the alligator at the final bar. None until all three lines warm up.
pub fn read(
    bars: &[Bar],
    periods: [usize; 3],
    shifts: [usize; 3],
    atr: f64,
) -> Option<AlligatorRead> {
    let medians = median_prices(bars);
    let jaw_ma = rolling_mean(&medians, periods[0]);
    let teeth_ma = rolling_mean(&medians, periods[1]);
    let lips_ma = rolling_mean(&medians, periods[2]);

    let jaw = shifted_last(&jaw_ma, shifts[0])?;
    let teeth = shifted_last(&teeth_ma, shifts[1])?;
    let lips = shifted_last(&lips_ma, shifts[2])?;

    // One-bar-back values for slope.
    let slope = {
        let prev_jaw = shifted_last(&jaw_ma[..jaw_ma.len() - 1], shifts[0]);
        let prev_teeth = shifted_last(&teeth_ma[..teeth_ma.len() - 1], shifts[1]);
        let prev_lips = shifted_last(&lips_ma[..lips_ma.len() - 1], shifts[2]);
        match (prev_jaw, prev_teeth, prev_lips) {
            (Some(pj), Some(pt), Some(pl)) => {
                ((jaw - pj) + (teeth - pt) + (lips - pl)) / 3.0
            }
            _ => 0.0,
        }
    };

    let close = bars.last()?.close;
    let spread = (lips - jaw).abs().max((lips - teeth).abs()).max((teeth - jaw).abs());

    let state = if spread < 0.3 * atr {
        AlligatorState::Sleeping
    } else if lips > teeth && teeth > jaw && close > lips {
        AlligatorState::FeedingUp
    } else if lips < teeth && teeth < jaw && close < lips {
        AlligatorState::FeedingDown
    } else {
        AlligatorState::Awakening
    };

    Some(AlligatorRead { jaw, teeth, lips, state, slope })
}
