//! Order flow analyzer.
//!
//! Consumes the frozen bar snapshot plus the live tick, and owns the
//! mutable per-slot flow state: delta history, adaptive thresholds,
//! Bayesian estimators, inventory, market-impact rings and the GARCH cache.
//! One `analyze` call per completed bar keeps update semantics at-most-once.

pub mod delta;
pub mod impact;
pub mod inventory;
pub mod thresholds;
pub mod vsa;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FlowConfig;
use crate::domain::{Bar, TickSnapshot};
use crate::error::AnalysisError;
use crate::numerics::divergence::{flow_divergence, DivergenceBand};
use crate::numerics::garch::{fit_garch11, GarchCache};
use crate::numerics::rolling::{log_returns, mean};
use crate::numerics::atr as atr_series;
use crate::store::ring::BoundedRing;
use crate::structure::weighted_score;

pub use delta::DeltaRead;
pub use impact::{ImpactRead, MarketImpactState};
pub use inventory::InventoryModel;
pub use thresholds::{BayesianEstimator, DynamicThresholds};
pub use vsa::{VsaRead, VsaSignal};

pub const MIN_BARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    Up,
    Down,
    Neutral,
}

impl FlowDirection {
    pub fn sign(&self) -> i8 {
        match self {
            FlowDirection::Up => 1,
            FlowDirection::Down => -1,
            FlowDirection::Neutral => 0,
        }
    }
}

/// Mutable per-(symbol, timeframe) flow state.
#[derive(Debug, Clone)]
pub struct FlowSlotState {
    pub delta_history: BoundedRing<f64>,
    pub thresholds: DynamicThresholds,
    pub delta_estimator: BayesianEstimator,
    pub imbalance_estimator: BayesianEstimator,
    pub inventory: InventoryModel,
    pub impact: MarketImpactState,
    pub garch: GarchCache,
}

impl FlowSlotState {
    pub fn new(config: &FlowConfig, delta_capacity: usize) -> Self {
        Self {
            delta_history: BoundedRing::new(delta_capacity.max(2)),
            thresholds: DynamicThresholds::new(0.0, 0.3, config.absorption_ratio),
            delta_estimator: BayesianEstimator::new(0.0, 1e6, config.bayes_observation_cap),
            imbalance_estimator: BayesianEstimator::new(0.3, 0.05, config.bayes_observation_cap),
            inventory: InventoryModel::new(&config.inventory),
            impact: MarketImpactState::default(),
            garch: GarchCache::default(),
        }
    }
}

/// Detected absorption on the last bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AbsorptionRead {
    /// +1 buyers absorbing (bullish), -1 sellers absorbing.
    pub direction: i8,
    pub volume_ratio: f64,
}

/// Raw component values in [0, 1] entering the weighted score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FlowComponents {
    pub delta: f64,
    pub bid_ask: f64,
    pub liquidity: f64,
    pub volume_profile: f64,
    pub absorption: f64,
    pub effort_result: f64,
    pub institutional: f64,
    pub intensity: f64,
}

/// Output of one order-flow pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub valid: bool,
    pub reason: Option<String>,
    pub direction: FlowDirection,
    /// Weighted composite in [0, 10], inventory-adjusted.
    pub flow_score: f64,
    pub components: FlowComponents,
    /// Annualized volatility forecast as a fraction, when the fit is live.
    pub garch_volatility_forecast: Option<f64>,
    pub vsa: Option<VsaRead>,
    pub flow_divergence_score: f64,
    pub flow_divergence: DivergenceBand,
    pub delta: DeltaRead,
    pub bid_ask_imbalance: f64,
    pub imbalance_significant: bool,
    pub absorption: Option<AbsorptionRead>,
    pub inventory_adjustment: f64,
    pub thresholds: DynamicThresholds,
    pub impact: ImpactRead,
}

impl FlowSnapshot {
    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            direction: FlowDirection::Neutral,
            flow_score: 0.0,
            components: FlowComponents::default(),
            garch_volatility_forecast: None,
            vsa: None,
            flow_divergence_score: 0.0,
            flow_divergence: DivergenceBand::NoVariation,
            delta: DeltaRead { last: 0.0, cumulative: 0.0, consistency: 0.0, strength: 0.0, direction: 0 },
            bid_ask_imbalance: 0.0,
            imbalance_significant: false,
            absorption: None,
            inventory_adjustment: 0.0,
            thresholds: DynamicThresholds::new(0.0, 0.3, 1.5),
            impact: ImpactRead::default(),
        }
    }
}

pub struct OrderFlowAnalyzer {
    config: FlowConfig,
    garch_min_data: usize,
    garch_retrain_interval: i64,
}

impl OrderFlowAnalyzer {
    pub fn new(config: FlowConfig, garch_min_data: usize, garch_retrain_interval: i64) -> Self {
        Self { config, garch_min_data, garch_retrain_interval }
    }

    /// Analyze a frozen snapshot at `analysis_time`, advancing the slot's
    /// flow state exactly once for the newest completed bar.
    pub fn analyze(
        &self,
        bars: &[Bar],
        tick: Option<&TickSnapshot>,
        state: &mut FlowSlotState,
        bars_per_year: f64,
        analysis_time: DateTime<Utc>,
    ) -> FlowSnapshot {
        if bars.len() < MIN_BARS {
            return FlowSnapshot::invalid(
                AnalysisError::InputInvalid(format!(
                    "insufficient history: {} bars < {MIN_BARS}",
                    bars.len()
                ))
                .to_string(),
            );
        }
        if bars
            .iter()
            .any(|b| !b.close.is_finite() || !b.volume.is_finite())
        {
            return FlowSnapshot::invalid(
                AnalysisError::NumericsFatal("non-finite bar field in series".into()).to_string(),
            );
        }

        let cfg = &self.config;
        let atr_values = atr_series(bars, 14);
        let atr = match atr_values.last().copied().filter(|v| v.is_finite() && *v > 0.0) {
            Some(a) => a,
            None => {
                return FlowSnapshot::invalid(
                    AnalysisError::InputInvalid("ATR unavailable".into()).to_string(),
                )
            }
        };
        let bar = &bars[bars.len() - 1];

        // ── per-bar state updates ───────────────────────────────────────
        state.delta_history.push(bar.signed_delta());
        let relative_spread = tick.map(|t| t.relative_spread()).unwrap_or(f64::NAN);
        state.impact.record(bar.volume, relative_spread);
        state.inventory.decay(bar.timestamp);

        // ── GARCH forecast (cached, refit on cadence) ───────────────────
        let garch_forecast = self.garch_forecast(bars, state, bars_per_year, analysis_time);

        // ── reads ───────────────────────────────────────────────────────
        let history: Vec<f64> = state.delta_history.iter().copied().collect();
        let delta_read = delta::analyze(&history, cfg.delta_window);

        let (bid_ask_imbalance, book_sizes) = match tick.and_then(|t| t.book_sizes()) {
            Some((bid, ask)) if bid + ask > 0.0 => ((bid - ask) / (bid + ask), Some((bid, ask))),
            _ => (0.0, None),
        };

        let avg_volume = {
            let window = cfg.vsa_volume_avg_period.min(bars.len() - 1);
            let volumes: Vec<f64> =
                bars[bars.len() - 1 - window..bars.len() - 1].iter().map(|b| b.volume).collect();
            mean(&volumes)
        };

        let absorption = detect_absorption(bar, atr, avg_volume, cfg.absorption_ratio);

        let vsa_read = vsa::detect(
            bars,
            atr,
            cfg.vsa_volume_avg_period,
            cfg.vsa_vol_factor_low,
            cfg.vsa_vol_factor_high,
            cfg.vsa_spread_factor,
        );

        let (divergence_score, divergence_band) = {
            let recent: Vec<f64> = history
                .iter()
                .rev()
                .take(cfg.flow_divergence_window)
                .copied()
                .collect();
            let baseline: Vec<f64> = history
                .iter()
                .rev()
                .take(cfg.flow_divergence_baseline_window)
                .copied()
                .collect();
            flow_divergence(
                &recent,
                &baseline,
                cfg.flow_divergence_bins,
                cfg.flow_divergence_threshold,
            )
        };

        // ── adaptive thresholds ─────────────────────────────────────────
        state.delta_estimator.observe(bar.signed_delta().abs());
        if book_sizes.is_some() {
            state.imbalance_estimator.observe(bid_ask_imbalance.abs());
        }
        if state.thresholds.refresh_due(analysis_time, cfg.threshold_update_interval) {
            let unconditional_vol = state.garch.fit.as_ref().map(|fit| {
                (fit.params.unconditional_variance() * bars_per_year).sqrt() / 100.0
            });
            let vol_ratio = volatility_ratio(garch_forecast, unconditional_vol, &atr_values, atr)
                * cfg.volatility_multiplier;
            state.thresholds.refresh(
                state.delta_estimator.posterior_mean(),
                state.imbalance_estimator.posterior_mean(),
                cfg.bayes_update_blend_factor,
                vol_ratio,
                analysis_time,
            );
        }
        let imbalance_significant =
            book_sizes.is_some() && bid_ask_imbalance.abs() > state.thresholds.imbalance;

        // ── components and score ────────────────────────────────────────
        let impact_read = state.impact.read();

        let effort_result = effort_result_anomaly(bar, atr, avg_volume);
        let volume_profile = volume_concentration(bars, atr);

        let components = FlowComponents {
            delta: (0.5 * delta_read.consistency + 0.5 * delta_read.strength).clamp(0.0, 1.0),
            bid_ask: if imbalance_significant { bid_ask_imbalance.abs() } else { 0.0 },
            liquidity: impact_read.liquidity,
            volume_profile,
            absorption: absorption.map(|_| 1.0).unwrap_or(0.0),
            effort_result,
            institutional: impact_read.institutional,
            intensity: impact_read.intensity,
        };

        let w = &cfg.flow_weights;
        let base_score = weighted_score(&[
            (w.delta, components.delta),
            (w.bid_ask, components.bid_ask),
            (w.liquidity, components.liquidity),
            (w.volume_profile, components.volume_profile),
            (w.absorption, components.absorption),
            (w.effort_result, components.effort_result),
            (w.institutional, components.institutional),
            (w.intensity, components.intensity),
        ]);
        let inventory_adjustment = state.inventory.score_adjustment();
        let flow_score = (base_score + inventory_adjustment).clamp(0.0, 10.0);

        let direction = dominant_direction(
            &delta_read,
            bid_ask_imbalance,
            imbalance_significant,
            absorption.as_ref(),
            impact_read.institutional,
        );
        debug!(?direction, flow_score, "flow pass complete");

        FlowSnapshot {
            valid: true,
            reason: None,
            direction,
            flow_score,
            components,
            garch_volatility_forecast: garch_forecast,
            vsa: vsa_read,
            flow_divergence_score: divergence_score,
            flow_divergence: divergence_band,
            delta: delta_read,
            bid_ask_imbalance,
            imbalance_significant,
            absorption,
            inventory_adjustment,
            thresholds: state.thresholds.clone(),
            impact: impact_read,
        }
    }

    /// Cached 1-step annualized volatility forecast; refits on cadence.
    /// Any failure invalidates the cache and yields None.
    fn garch_forecast(
        &self,
        bars: &[Bar],
        state: &mut FlowSlotState,
        bars_per_year: f64,
        analysis_time: DateTime<Utc>,
    ) -> Option<f64> {
        if state.garch.refit_due(analysis_time, self.garch_retrain_interval) {
            let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
            let returns_pct: Vec<f64> = log_returns(&closes).iter().map(|r| 100.0 * r).collect();
            match fit_garch11(&returns_pct, self.garch_min_data) {
                Ok(fit) => {
                    state.garch.fit = Some(fit);
                    state.garch.last_fit_at = Some(analysis_time);
                }
                Err(err) => {
                    let err = AnalysisError::from(err);
                    debug!(%err, "garch fit unavailable");
                    state.garch.invalidate();
                    state.garch.last_fit_at = Some(analysis_time);
                    return None;
                }
            }
        }
        let fit = state.garch.fit.as_ref()?;
        match fit.forecast_annualized_vol(bars_per_year) {
            Ok(vol) => {
                state.garch.last_forecast = Some(vol);
                state.garch.last_forecast_at = Some(analysis_time);
                Some(vol)
            }
            Err(_) => {
                state.garch.invalidate();
                None
            }
        }
    }
}

/// Current volatility relative to baseline.
///
/// Prefers the GARCH forecast against the fit's unconditional level; falls
/// back to the current ATR against its own series mean. 1.0 when neither
/// basis is available.
fn volatility_ratio(
    garch_forecast: Option<f64>,
    unconditional_vol: Option<f64>,
    atr_values: &[f64],
    current_atr: f64,
) -> f64 {
    if let (Some(forecast), Some(uncond)) = (garch_forecast, unconditional_vol) {
        if uncond > 0.0 && forecast.is_finite() {
            return (forecast / uncond).clamp(0.1, 10.0);
        }
    }
    let finite: Vec<f64> = atr_values.iter().copied().filter(|v| v.is_finite()).collect();
    let baseline = mean(&finite);
    if baseline > 0.0 && current_atr > 0.0 {
        (current_atr / baseline).clamp(0.1, 10.0)
    } else {
        1.0
    }
}

/// High volume into a narrow range; direction from close vs. bar midpoint.
fn detect_absorption(
    bar: &Bar,
    atr: f64,
    avg_volume: f64,
    absorption_ratio: f64,
) -> Option<AbsorptionRead> {
    if avg_volume <= 0.0 || atr <= 0.0 {
        return None;
    }
    let narrow = bar.range() / atr < 0.5;
    let heavy = bar.volume > absorption_ratio * avg_volume;
    if !(narrow && heavy) {
        return None;
    }
    let mid = (bar.high + bar.low) / 2.0;
    let direction = if bar.close >= mid { 1 } else { -1 };
    Some(AbsorptionRead { direction, volume_ratio: bar.volume / avg_volume })
}

/// Effort (volume) without result (price travel): returns a [0, 1] anomaly
/// value, nonzero only when effort is elevated and the result lags it.
fn effort_result_anomaly(bar: &Bar, atr: f64, avg_volume: f64) -> f64 {
    if avg_volume <= 0.0 || atr <= 0.0 {
        return 0.0;
    }
    let effort = bar.volume / avg_volume;
    if effort <= 1.5 {
        return 0.0;
    }
    let result = (bar.close - bar.open).abs() / atr;
    (1.0 - (result / effort)).clamp(0.0, 1.0)
}

/// Share of recent volume transacted within half an ATR of the current
/// close: a crude point-of-control proximity measure.
fn volume_concentration(bars: &[Bar], atr: f64) -> f64 {
    let window = 30.min(bars.len());
    let tail = &bars[bars.len() - window..];
    let total: f64 = tail.iter().map(|b| b.volume).sum();
    if total <= 0.0 || atr <= 0.0 {
        return 0.0;
    }
    let close = bars[bars.len() - 1].close;
    let near: f64 = tail
        .iter()
        .filter(|b| (b.close - close).abs() <= 0.5 * atr)
        .map(|b| b.volume)
        .sum();
    (near / total).clamp(0.0, 1.0)
}

/// Majority vote over the signed dominant components.
fn dominant_direction(
    delta: &DeltaRead,
    bid_ask: f64,
    imbalance_significant: bool,
    absorption: Option<&AbsorptionRead>,
    institutional: f64,
) -> FlowDirection {
    let mut up = 0;
    let mut down = 0;
    match delta.direction {
        1 => up += 1,
        -1 => down += 1,
        _ => {}
    }
    if imbalance_significant {
        if bid_ask > 0.0 {
            up += 1;
        } else if bid_ask < 0.0 {
            down += 1;
        }
    }
    if let Some(a) = absorption {
        if a.direction > 0 {
            up += 1;
        } else {
            down += 1;
        }
    }
    if institutional > 0.0 {
        match delta.direction {
            1 => up += 1,
            -1 => down += 1,
            _ => {}
        }
    }
    if up > down {
        FlowDirection::Up
    } else if down > up {
        FlowDirection::Down
    } else {
        FlowDirection::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    /// Bars with uniform bodies; body sign decides the delta sign.
    fn bars_with_bias(n: usize, body: f64, volume: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let open = 100.0 + i as f64 * body;
                let close = open + body;
                let high = open.max(close) + 0.3;
                let low = open.min(close) - 0.3;
                Bar::new(base_time() + Duration::minutes(i as i64), open, high, low, close, volume)
            })
            .collect()
    }

    fn analyzer() -> OrderFlowAnalyzer {
        OrderFlowAnalyzer::new(FlowConfig::default(), 252, 86_400)
    }

    fn run_series(bars: &[Bar], state: &mut FlowSlotState) -> FlowSnapshot {
        let analyzer = analyzer();
        let mut snapshot = FlowSnapshot::invalid("never ran");
        for i in MIN_BARS..=bars.len() {
            snapshot = analyzer.analyze(
                &bars[..i],
                None,
                state,
                252.0,
                bars[i - 1].timestamp,
            );
        }
        snapshot
    }

    #[test]
    fn insufficient_history_is_invalid() {
        let bars = bars_with_bias(5, 0.2, 1000.0);
        let mut state = FlowSlotState::new(&FlowConfig::default(), 100);
        let snap = analyzer().analyze(&bars, None, &mut state, 252.0, base_time());
        assert!(!snap.valid);
    }

    #[test]
    fn steady_buying_reads_up() {
        let bars = bars_with_bias(60, 0.2, 1000.0);
        let mut state = FlowSlotState::new(&FlowConfig::default(), 100);
        let snap = run_series(&bars, &mut state);
        assert!(snap.valid);
        assert_eq!(snap.direction, FlowDirection::Up);
        assert_eq!(snap.delta.direction, 1);
        assert!(snap.flow_score >= 0.0 && snap.flow_score <= 10.0);
    }

    #[test]
    fn steady_selling_reads_down() {
        let bars = bars_with_bias(60, -0.2, 1000.0);
        let mut state = FlowSlotState::new(&FlowConfig::default(), 100);
        let snap = run_series(&bars, &mut state);
        assert_eq!(snap.direction, FlowDirection::Down);
    }

    #[test]
    fn garch_null_below_min_data() {
        // 60 bars of returns << 252 minimum: forecast must be None
        let bars = bars_with_bias(60, 0.1, 1000.0);
        let mut state = FlowSlotState::new(&FlowConfig::default(), 100);
        let snap = run_series(&bars, &mut state);
        assert!(snap.garch_volatility_forecast.is_none());
        assert!(state.garch.fit.is_none());
    }

    #[test]
    fn imbalance_from_tick_depth() {
        use crate::domain::DepthLevel;
        let bars = bars_with_bias(60, 0.2, 1000.0);
        let mut state = FlowSlotState::new(&FlowConfig::default(), 100);
        let mut tick = TickSnapshot::new(
            bars.last().unwrap().timestamp,
            bars.last().unwrap().close,
            bars.last().unwrap().close - 0.01,
            bars.last().unwrap().close + 0.01,
            5.0,
        );
        tick.bid_depth = vec![DepthLevel { price: 100.0, size: 90.0 }];
        tick.ask_depth = vec![DepthLevel { price: 100.1, size: 10.0 }];
        let snap = analyzer().analyze(&bars, Some(&tick), &mut state, 252.0, base_time());
        assert!((snap.bid_ask_imbalance - 0.8).abs() < 1e-9);
    }

    #[test]
    fn absorption_detected_on_heavy_narrow_bar() {
        let mut bars = bars_with_bias(60, 0.2, 1000.0);
        let last_ts = bars.last().unwrap().timestamp + Duration::minutes(1);
        let prev_close = bars.last().unwrap().close;
        // narrow range, heavy volume, close in the upper half
        bars.push(Bar::new(
            last_ts,
            prev_close,
            prev_close + 0.15,
            prev_close - 0.05,
            prev_close + 0.12,
            5000.0,
        ));
        let mut state = FlowSlotState::new(&FlowConfig::default(), 100);
        let snap = run_series(&bars, &mut state);
        let absorption = snap.absorption.expect("absorption");
        assert_eq!(absorption.direction, 1);
        assert!(absorption.volume_ratio > 1.5);
    }

    #[test]
    fn long_inventory_drags_score_down() {
        let bars = bars_with_bias(60, 0.2, 1000.0);
        let mut neutral_state = FlowSlotState::new(&FlowConfig::default(), 100);
        let neutral = run_series(&bars, &mut neutral_state);

        let mut loaded_state = FlowSlotState::new(&FlowConfig::default(), 100);
        loaded_state.inventory.apply_fill(10.0, base_time());
        let loaded = run_series(&bars, &mut loaded_state);

        assert!(loaded.flow_score < neutral.flow_score);
        assert!(loaded.inventory_adjustment < 0.0);
    }

    #[test]
    fn divergence_normal_on_homogeneous_tape() {
        let bars = bars_with_bias(120, 0.2, 1000.0);
        let mut state = FlowSlotState::new(&FlowConfig::default(), 500);
        let snap = run_series(&bars, &mut state);
        assert!(matches!(
            snap.flow_divergence,
            DivergenceBand::Normal | DivergenceBand::NoVariation
        ));
    }
}
