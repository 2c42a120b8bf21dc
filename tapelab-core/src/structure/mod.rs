//! Market structure analyzer.
//!
//! Reads a frozen bar snapshot and produces a `StructureSnapshot`: trend
//! direction, regime tags, Wyckoff phase, supply/demand context, cycle and
//! stationarity diagnostics, and a weighted 0-10 structure score. The only
//! mutable input is the slot's Wyckoff state, advanced once per completed
//! bar.

pub mod alligator;
pub mod levels;
pub mod wyckoff;
pub mod zones;

use serde::{Deserialize, Serialize};

use crate::config::StructureConfig;
use crate::domain::Bar;
use crate::error::AnalysisError;
use crate::numerics::hurst::{hurst_exponent, HurstRegime};
use crate::numerics::rolling::{log_returns, mean};
use crate::numerics::spectrum::{dominant_cycle, DominantCycle};
use crate::numerics::stationarity::{stationarity, StationarityResult};
use crate::numerics::{atr as atr_series, true_range};

pub use alligator::{AlligatorRead, AlligatorState};
pub use levels::{active_fib_level, active_harmonic, FibLevel, HarmonicPattern};
pub use wyckoff::{WyckoffEvent, WyckoffFsmState, WyckoffPhase, WyckoffState};
pub use zones::{detect_zones, Zone, ZoneKind, ZoneSet};

/// Minimum bars before the analyzer reports a valid snapshot.
pub const MIN_BARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Uptrend,
    Downtrend,
    Sideways,
}

impl TrendDirection {
    pub fn sign(&self) -> i8 {
        match self {
            TrendDirection::Uptrend => 1,
            TrendDirection::Downtrend => -1,
            TrendDirection::Sideways => 0,
        }
    }
}

/// Output of one market-structure pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub valid: bool,
    pub reason: Option<String>,
    pub direction: TrendDirection,
    /// Weighted composite in [0, 10].
    pub structure_score: f64,
    pub hurst: Option<f64>,
    pub hurst_regime: HurstRegime,
    /// Elevated current ATR relative to its own history.
    pub volatile_regime: bool,
    pub wyckoff_phase: WyckoffPhase,
    pub wyckoff_confidence: f64,
    pub wyckoff_last_event: Option<WyckoffEvent>,
    pub price_in_demand_zone: bool,
    pub price_in_supply_zone: bool,
    pub nearest_supply: Option<Zone>,
    pub nearest_demand: Option<Zone>,
    pub zones: ZoneSet,
    pub dominant_cycle: Option<DominantCycle>,
    pub stationarity: Option<StationarityResult>,
    pub is_stationary: Option<bool>,
    pub active_fib_level: Option<FibLevel>,
    pub active_harmonic: Option<HarmonicPattern>,
    pub alligator: Option<AlligatorRead>,
    pub atr: f64,
}

impl StructureSnapshot {
    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            direction: TrendDirection::Sideways,
            structure_score: 0.0,
            hurst: None,
            hurst_regime: HurstRegime::Random,
            volatile_regime: false,
            wyckoff_phase: WyckoffPhase::Undefined,
            wyckoff_confidence: 0.0,
            wyckoff_last_event: None,
            price_in_demand_zone: false,
            price_in_supply_zone: false,
            nearest_supply: None,
            nearest_demand: None,
            zones: ZoneSet::default(),
            dominant_cycle: None,
            stationarity: None,
            is_stationary: None,
            active_fib_level: None,
            active_harmonic: None,
            alligator: None,
            atr: 0.0,
        }
    }
}

pub struct MarketStructureAnalyzer {
    config: StructureConfig,
}

impl MarketStructureAnalyzer {
    pub fn new(config: StructureConfig) -> Self {
        Self { config }
    }

    /// Analyze a frozen snapshot, advancing the slot's Wyckoff FSM.
    pub fn analyze(&self, bars: &[Bar], wyckoff: &mut WyckoffState) -> StructureSnapshot {
        if bars.len() < MIN_BARS {
            return StructureSnapshot::invalid(
                AnalysisError::InputInvalid(format!(
                    "insufficient history: {} bars < {MIN_BARS}",
                    bars.len()
                ))
                .to_string(),
            );
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        if closes.iter().any(|c| !c.is_finite()) {
            return StructureSnapshot::invalid(
                AnalysisError::NumericsFatal("non-finite close in series".into()).to_string(),
            );
        }

        let cfg = &self.config;
        let atr_values = atr_series(bars, cfg.atr_period);
        let atr = match atr_values.last().copied().filter(|v| v.is_finite() && *v > 0.0) {
            Some(a) => a,
            None => {
                return StructureSnapshot::invalid(
                    AnalysisError::InputInvalid("ATR unavailable".into()).to_string(),
                )
            }
        };
        let close = closes[closes.len() - 1];

        // Volatile regime: current true range pressure well above its mean.
        let tr = true_range(bars);
        let finite_tr: Vec<f64> = tr.iter().copied().filter(|v| v.is_finite()).collect();
        let volatile_regime = !finite_tr.is_empty() && atr > 1.5 * mean(&finite_tr);

        let zones = detect_zones(
            bars,
            atr,
            cfg.sd_pivot_prominence_atr_factor,
            cfg.sd_zone_cluster_eps_atr_factor,
            cfg.sd_zone_invalidation_atr_factor,
        );
        wyckoff.step(bars, &zones, cfg.wyckoff_vol_spike_factor);

        let alligator = alligator::read(bars, cfg.alligator_periods, cfg.alligator_shifts, atr);
        let trend = trend_vote(&closes, alligator.as_ref());

        let returns = log_returns(&closes);
        let hurst = hurst_exponent(&returns);
        let hurst_regime = hurst
            .map(|h| HurstRegime::classify(h, cfg.hurst_upper, cfg.hurst_lower))
            .unwrap_or(HurstRegime::Random);

        let cycle = dominant_cycle(&closes, cfg.fft_dominant_cycle_threshold);
        let cycle_bias = cycle.as_ref().map(|c| {
            let window = (c.period / 2.0).round().max(2.0) as usize;
            let tail = &closes[closes.len().saturating_sub(window)..];
            if close > mean(tail) {
                1i8
            } else {
                -1i8
            }
        });

        let stat = stationarity(&closes);
        let is_stationary = stat.map(|s| s.is_stationary(cfg.stationarity_pvalue));

        let wyckoff_phase = wyckoff.phase(cfg.wyckoff_phase_conf_threshold);
        let direction = final_direction(trend, wyckoff.state.bias(), cycle_bias);

        // Component values in [0, 1] for the weighted score.
        let w = &cfg.structure_weights;
        let trend_value = trend.1;
        let alligator_value = match alligator.map(|a| a.state) {
            Some(AlligatorState::FeedingUp) | Some(AlligatorState::FeedingDown) => 1.0,
            Some(AlligatorState::Awakening) => 0.4,
            _ => 0.0,
        };
        let wyckoff_value = wyckoff.confidence();
        let zone_value = zone_proximity(&zones, close, atr);
        let cycle_value = cycle.as_ref().map(|c| c.power.clamp(0.0, 1.0)).unwrap_or(0.0);
        let hurst_value = hurst.map(|h| ((h - 0.5).abs() * 2.0).clamp(0.0, 1.0)).unwrap_or(0.0);

        let structure_score = weighted_score(&[
            (w.trend, trend_value),
            (w.alligator, alligator_value),
            (w.wyckoff, wyckoff_value),
            (w.zones, zone_value),
            (w.cycle, cycle_value),
            (w.hurst, hurst_value),
        ]);

        StructureSnapshot {
            valid: true,
            reason: None,
            direction,
            structure_score,
            hurst,
            hurst_regime,
            volatile_regime,
            wyckoff_phase,
            wyckoff_confidence: wyckoff.confidence(),
            wyckoff_last_event: wyckoff.last_event,
            price_in_demand_zone: zones.price_in_demand(close),
            price_in_supply_zone: zones.price_in_supply(close),
            nearest_supply: zones.nearest_supply(close).cloned(),
            nearest_demand: zones.nearest_demand(close).cloned(),
            dominant_cycle: cycle,
            stationarity: stat,
            is_stationary,
            active_fib_level: active_fib_level(bars, atr),
            active_harmonic: active_harmonic(bars, atr),
            alligator,
            atr,
            zones,
        }
    }
}

/// Weighted-sum score normalized by the positive weights and scaled to
/// [0, 10].
pub fn weighted_score(components: &[(f64, f64)]) -> f64 {
    let weight_sum: f64 = components.iter().map(|(w, _)| w.max(0.0)).sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }
    let raw: f64 = components
        .iter()
        .map(|(w, v)| w.max(0.0) * v.clamp(0.0, 1.0))
        .sum();
    (raw / weight_sum * 10.0).clamp(0.0, 10.0)
}

/// Trend vote from alligator alignment, line slope, and close-vs-lines.
/// Returns (direction, strength in [0, 1]).
fn trend_vote(closes: &[f64], alligator: Option<&AlligatorRead>) -> (TrendDirection, f64) {
    let close = closes[closes.len() - 1];
    let mut votes = 0i8;
    let mut total = 0i8;

    if let Some(a) = alligator {
        total += 3;
        votes += match a.state {
            AlligatorState::FeedingUp => 1,
            AlligatorState::FeedingDown => -1,
            _ => 0,
        };
        votes += if a.slope > 0.0 {
            1
        } else if a.slope < 0.0 {
            -1
        } else {
            0
        };
        let above_all = close > a.jaw && close > a.teeth && close > a.lips;
        let below_all = close < a.jaw && close < a.teeth && close < a.lips;
        votes += if above_all {
            1
        } else if below_all {
            -1
        } else {
            0
        };
    } else {
        // Fallback without alligator warmup: slope of a short mean.
        total += 1;
        let tail = &closes[closes.len().saturating_sub(10)..];
        let head = &closes[closes.len().saturating_sub(20)..closes.len().saturating_sub(10)];
        if !head.is_empty() {
            votes += if mean(tail) > mean(head) { 1 } else { -1 };
        }
    }

    let strength = if total > 0 { (votes.abs() as f64) / total as f64 } else { 0.0 };
    let direction = if votes >= 2 || (total == 1 && votes == 1) {
        TrendDirection::Uptrend
    } else if votes <= -2 || (total == 1 && votes == -1) {
        TrendDirection::Downtrend
    } else {
        TrendDirection::Sideways
    };
    (direction, strength)
}

/// Majority vote of trend, Wyckoff bias, and cycle-half bias.
fn final_direction(
    trend: (TrendDirection, f64),
    wyckoff_bias: i8,
    cycle_bias: Option<i8>,
) -> TrendDirection {
    let mut up = 0;
    let mut down = 0;
    match trend.0.sign() {
        1 => up += 1,
        -1 => down += 1,
        _ => {}
    }
    match wyckoff_bias {
        1 => up += 1,
        -1 => down += 1,
        _ => {}
    }
    if let Some(bias) = cycle_bias {
        match bias {
            1 => up += 1,
            -1 => down += 1,
            _ => {}
        }
    }
    if up > down {
        TrendDirection::Uptrend
    } else if down > up {
        TrendDirection::Downtrend
    } else {
        TrendDirection::Sideways
    }
}

/// Zone proximity factor: 1 inside a zone, decaying linearly to 0 at five
/// ATRs from the nearest live zone edge.
fn zone_proximity(zones: &ZoneSet, close: f64, atr: f64) -> f64 {
    if zones.price_in_supply(close) || zones.price_in_demand(close) {
        return 1.0;
    }
    let mut best = f64::INFINITY;
    if let Some(z) = zones.nearest_supply(close) {
        best = best.min((z.price_low - close).abs());
    }
    if let Some(z) = zones.nearest_demand(close) {
        best = best.min((close - z.price_high).abs());
    }
    if !best.is_finite() || atr <= 0.0 {
        return 0.0;
    }
    (1.0 - best / (5.0 * atr)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from_closes(closes: &[f64], volume: f64) -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Bar::new(base + Duration::hours(i as i64), c, c + 0.5, c - 0.5, c, volume)
            })
            .collect()
    }

    fn analyzer() -> MarketStructureAnalyzer {
        MarketStructureAnalyzer::new(StructureConfig::default())
    }

    #[test]
    fn insufficient_history_is_invalid() {
        let bars = bars_from_closes(&[100.0; 10], 1000.0);
        let mut wyckoff = WyckoffState::default();
        let snap = analyzer().analyze(&bars, &mut wyckoff);
        assert!(!snap.valid);
        assert!(snap.reason.as_deref().unwrap().contains("insufficient"));
    }

    #[test]
    fn nan_close_is_invalid_and_leaves_wyckoff_untouched() {
        let mut closes = vec![100.0; 80];
        closes[40] = f64::NAN;
        let bars = bars_from_closes(&closes, 1000.0);
        let mut wyckoff = WyckoffState::default();
        wyckoff.score = 3.0;
        let snap = analyzer().analyze(&bars, &mut wyckoff);
        assert!(!snap.valid);
        assert_eq!(wyckoff.score, 3.0);
    }

    #[test]
    fn uptrend_detected_on_rally() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + 0.5 * i as f64).collect();
        let bars = bars_from_closes(&closes, 1000.0);
        let mut wyckoff = WyckoffState::default();
        let snap = analyzer().analyze(&bars, &mut wyckoff);
        assert!(snap.valid);
        assert_eq!(snap.direction, TrendDirection::Uptrend);
        assert!(snap.structure_score > 0.0);
        assert!(snap.atr > 0.0);
    }

    #[test]
    fn downtrend_detected_on_selloff() {
        let closes: Vec<f64> = (0..120).map(|i| 200.0 - 0.5 * i as f64).collect();
        let bars = bars_from_closes(&closes, 1000.0);
        let mut wyckoff = WyckoffState::default();
        let snap = analyzer().analyze(&bars, &mut wyckoff);
        assert_eq!(snap.direction, TrendDirection::Downtrend);
    }

    #[test]
    fn score_stays_in_bounds() {
        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 + (i as f64 * 0.35).sin() * 4.0 + 0.1 * i as f64)
            .collect();
        let bars = bars_from_closes(&closes, 1000.0);
        let mut wyckoff = WyckoffState::default();
        let snap = analyzer().analyze(&bars, &mut wyckoff);
        assert!(snap.valid);
        assert!((0.0..=10.0).contains(&snap.structure_score));
    }

    #[test]
    fn weighted_score_normalizes_by_positive_weights() {
        let score = weighted_score(&[(1.0, 1.0), (1.0, 0.0)]);
        assert!((score - 5.0).abs() < 1e-9);
        // zero-weight components are ignored
        let score = weighted_score(&[(1.0, 1.0), (0.0, 0.0)]);
        assert!((score - 10.0).abs() < 1e-9);
        assert_eq!(weighted_score(&[]), 0.0);
    }

    #[test]
    fn weighted_score_clamps_values() {
        let score = weighted_score(&[(1.0, 5.0)]);
        assert!((score - 10.0).abs() < 1e-9);
        let score = weighted_score(&[(1.0, -2.0)]);
        assert_eq!(score, 0.0);
    }
}
