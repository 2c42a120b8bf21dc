//! Wyckoff phase state machine.
//!
//! Seven internal states driven by bar/zone events; the public phase is the
//! five-phase view (spring folds into accumulation, upthrust into
//! distribution) and is only reported once the accumulated confidence score
//! clears the configured threshold.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Bar;
use crate::numerics::rolling::mean;
use crate::structure::zones::ZoneSet;

/// Internal FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WyckoffFsmState {
    Undefined,
    Accumulation,
    Spring,
    Markup,
    Distribution,
    Upthrust,
    Markdown,
}

/// Public five-phase view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WyckoffPhase {
    Undefined,
    Accumulation,
    Markup,
    Distribution,
    Markdown,
}

impl WyckoffPhase {
    /// Directional bias: +1 bullish, -1 bearish, 0 neutral.
    pub fn bias(&self) -> i8 {
        match self {
            WyckoffPhase::Accumulation | WyckoffPhase::Markup => 1,
            WyckoffPhase::Distribution | WyckoffPhase::Markdown => -1,
            WyckoffPhase::Undefined => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WyckoffPhase::Undefined => "undefined",
            WyckoffPhase::Accumulation => "accumulation",
            WyckoffPhase::Markup => "markup",
            WyckoffPhase::Distribution => "distribution",
            WyckoffPhase::Markdown => "markdown",
        }
    }
}

impl WyckoffFsmState {
    pub fn phase(&self) -> WyckoffPhase {
        match self {
            WyckoffFsmState::Undefined => WyckoffPhase::Undefined,
            WyckoffFsmState::Accumulation | WyckoffFsmState::Spring => WyckoffPhase::Accumulation,
            WyckoffFsmState::Markup => WyckoffPhase::Markup,
            WyckoffFsmState::Distribution | WyckoffFsmState::Upthrust => {
                WyckoffPhase::Distribution
            }
            WyckoffFsmState::Markdown => WyckoffPhase::Markdown,
        }
    }

    /// Directional bias of the underlying phase.
    pub fn bias(&self) -> i8 {
        self.phase().bias()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WyckoffEvent {
    VolumeSpike,
    SpringTest,
    UpthrustTest,
    SignOfStrength,
    SignOfWeakness,
}

impl WyckoffEvent {
    fn confidence(&self) -> f64 {
        match self {
            WyckoffEvent::VolumeSpike => 1.5,
            WyckoffEvent::SpringTest => 3.0,
            WyckoffEvent::UpthrustTest => 3.0,
            WyckoffEvent::SignOfStrength => 2.5,
            WyckoffEvent::SignOfWeakness => 2.5,
        }
    }
}

/// Per-slot Wyckoff state, mutated once per completed bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WyckoffState {
    pub state: WyckoffFsmState,
    pub last_event: Option<WyckoffEvent>,
    pub last_event_at: Option<DateTime<Utc>>,
    /// Accumulated event confidence with per-bar decay.
    pub score: f64,
    /// Named diagnostics for the metadata bag.
    pub details: BTreeMap<String, f64>,
}

impl Default for WyckoffState {
    fn default() -> Self {
        Self {
            state: WyckoffFsmState::Undefined,
            last_event: None,
            last_event_at: None,
            score: 0.0,
            details: BTreeMap::new(),
        }
    }
}

const SCORE_DECAY: f64 = 0.9;
const SCORE_CAP: f64 = 10.0;

impl WyckoffState {
    /// Public phase, gated on the confidence threshold.
    pub fn phase(&self, conf_threshold: f64) -> WyckoffPhase {
        if self.score >= conf_threshold {
            self.state.phase()
        } else {
            WyckoffPhase::Undefined
        }
    }

    /// Confidence in [0, 1] for scoring.
    pub fn confidence(&self) -> f64 {
        (self.score / SCORE_CAP).clamp(0.0, 1.0)
    }

    /// Advance the FSM on a completed bar.
    pub fn step(&mut self, bars: &[Bar], zones: &ZoneSet, vol_spike_factor: f64) {
        let n = bars.len();
        if n < 3 {
            return;
        }
        let bar = &bars[n - 1];
        let prev = &bars[n - 2];

        let avg_window = 20.min(n - 1);
        let avg_volume = mean(
            &bars[n - 1 - avg_window..n - 1].iter().map(|b| b.volume).collect::<Vec<_>>(),
        );
        let volume_spike = avg_volume > 0.0 && bar.volume >= vol_spike_factor * avg_volume;

        let in_demand = zones.price_in_demand(bar.close) || zones.price_in_demand(bar.low);
        let in_supply = zones.price_in_supply(bar.close) || zones.price_in_supply(bar.high);

        // Spring: low pierces a demand zone, close recovers above it.
        let spring = zones
            .demand
            .iter()
            .filter(|z| !z.invalidated)
            .any(|z| bar.low < z.price_low && bar.close > z.price_high);
        // Upthrust: high pierces a supply zone, close falls back below it.
        let upthrust = zones
            .supply
            .iter()
            .filter(|z| !z.invalidated)
            .any(|z| bar.high > z.price_high && bar.close < z.price_low);

        let strong_up =
            bar.close > prev.high && bar.close_position() > 0.66 && volume_spike;
        let strong_down =
            bar.close < prev.low && bar.close_position() < 0.33 && volume_spike;

        let event = if spring {
            Some(WyckoffEvent::SpringTest)
        } else if upthrust {
            Some(WyckoffEvent::UpthrustTest)
        } else if strong_up {
            Some(WyckoffEvent::SignOfStrength)
        } else if strong_down {
            Some(WyckoffEvent::SignOfWeakness)
        } else if volume_spike {
            Some(WyckoffEvent::VolumeSpike)
        } else {
            None
        };

        self.score *= SCORE_DECAY;

        if let Some(event) = event {
            let next = self.transition(event, in_demand, in_supply);
            if next != self.state {
                debug!(from = ?self.state, to = ?next, ?event, "wyckoff transition");
            }
            self.state = next;
            self.score = (self.score + event.confidence()).min(SCORE_CAP);
            self.last_event = Some(event);
            self.last_event_at = Some(bar.timestamp);
        }

        self.details.insert("score".into(), self.score);
        self.details.insert("volume_ratio".into(), if avg_volume > 0.0 {
            bar.volume / avg_volume
        } else {
            0.0
        });
    }

    fn transition(
        &self,
        event: WyckoffEvent,
        in_demand: bool,
        in_supply: bool,
    ) -> WyckoffFsmState {
        use WyckoffEvent as E;
        use WyckoffFsmState as S;

        match (self.state, event) {
            // Entering a campaign from nothing: a volume spike near a zone
            // marks the side being absorbed.
            (S::Undefined | S::Markup, E::VolumeSpike) if in_supply => S::Distribution,
            (S::Undefined | S::Markdown, E::VolumeSpike) if in_demand => S::Accumulation,

            (_, E::SpringTest) => S::Spring,
            (_, E::UpthrustTest) => S::Upthrust,

            (S::Spring | S::Accumulation, E::SignOfStrength) => S::Markup,
            (S::Upthrust | S::Distribution, E::SignOfWeakness) => S::Markdown,

            // Strength/weakness away from a campaign still tilts the state.
            (S::Undefined, E::SignOfStrength) => S::Markup,
            (S::Undefined, E::SignOfWeakness) => S::Markdown,
            (S::Markdown, E::SignOfStrength) => S::Accumulation,
            (S::Markup, E::SignOfWeakness) => S::Distribution,

            (current, _) => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::zones::{Zone, ZoneKind};
    use chrono::{Duration, TimeZone};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::hours(i);
        Bar::new(ts, open, high, low, close, volume)
    }

    fn demand_zone(low: f64, high: f64) -> ZoneSet {
        ZoneSet {
            supply: vec![],
            demand: vec![Zone {
                kind: ZoneKind::Demand,
                price_low: low,
                price_high: high,
                strength: 3,
                last_touch: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                invalidated: false,
            }],
        }
    }

    fn quiet_bars(n: i64) -> Vec<Bar> {
        (0..n).map(|i| bar(i, 100.0, 100.5, 99.5, 100.0, 1000.0)).collect()
    }

    #[test]
    fn starts_undefined_with_zero_score() {
        let state = WyckoffState::default();
        assert_eq!(state.state, WyckoffFsmState::Undefined);
        assert_eq!(state.phase(7.0), WyckoffPhase::Undefined);
    }

    #[test]
    fn spring_then_strength_reaches_markup() {
        let mut state = WyckoffState::default();
        let zones = demand_zone(98.0, 99.0);

        let mut bars = quiet_bars(20);
        // Spring: low pierces 98, close recovers above 99.
        bars.push(bar(20, 99.2, 99.6, 97.5, 99.4, 1200.0));
        state.step(&bars, &zones, 2.0);
        assert_eq!(state.state, WyckoffFsmState::Spring);
        assert_eq!(state.last_event, Some(WyckoffEvent::SpringTest));

        // Sign of strength: close above previous high on spiked volume.
        bars.push(bar(21, 99.5, 101.0, 99.4, 100.9, 5000.0));
        state.step(&bars, &zones, 2.0);
        assert_eq!(state.state, WyckoffFsmState::Markup);
        assert!(state.score > 0.0);
    }

    #[test]
    fn phase_gated_by_confidence_threshold() {
        let mut state = WyckoffState::default();
        state.state = WyckoffFsmState::Markup;
        state.score = 5.0;
        assert_eq!(state.phase(7.0), WyckoffPhase::Undefined);
        state.score = 7.5;
        assert_eq!(state.phase(7.0), WyckoffPhase::Markup);
    }

    #[test]
    fn spring_folds_into_accumulation_phase() {
        let mut state = WyckoffState::default();
        state.state = WyckoffFsmState::Spring;
        state.score = 8.0;
        assert_eq!(state.phase(7.0), WyckoffPhase::Accumulation);
        assert_eq!(state.state.bias(), 1);
    }

    #[test]
    fn score_decays_without_events() {
        let mut state = WyckoffState::default();
        state.score = 8.0;
        let bars = quiet_bars(30);
        let zones = ZoneSet::default();
        state.step(&bars, &zones, 10.0); // spike factor out of reach
        assert!(state.score < 8.0);
        assert!(state.last_event.is_none());
    }

    #[test]
    fn volume_spike_in_demand_starts_accumulation() {
        let mut state = WyckoffState::default();
        let zones = demand_zone(99.4, 100.2);
        let mut bars = quiet_bars(20);
        bars.push(bar(20, 100.0, 100.4, 99.6, 100.0, 4000.0));
        state.step(&bars, &zones, 2.0);
        assert_eq!(state.state, WyckoffFsmState::Accumulation);
    }

    #[test]
    fn weakness_from_distribution_marks_down() {
        let mut state = WyckoffState::default();
        state.state = WyckoffFsmState::Distribution;
        let zones = ZoneSet::default();
        let mut bars = quiet_bars(20);
        // close below previous low, weak close, spiked volume
        bars.push(bar(20, 99.8, 99.9, 98.0, 98.2, 5000.0));
        state.step(&bars, &zones, 2.0);
        assert_eq!(state.state, WyckoffFsmState::Markdown);
        assert_eq!(state.state.bias(), -1);
    }
}
