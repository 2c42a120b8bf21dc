//! Engine configuration.
//!
//! Every recognized option is enumerated here in closed records; unknown
//! keys are rejected at load (`deny_unknown_fields`). Defaults follow the
//! reference parameterization, validation runs once at load and a bad
//! configuration is fatal at init.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Timeframe;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("toml parse error: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Timeframes to maintain per symbol.
    pub timeframes: Vec<Timeframe>,
    /// Seed for deterministic signal-id derivation.
    pub seed: u64,
    /// Bar ring length: max required lookback across analyzers.
    pub lookback_bars: usize,
    /// Delta history ring length.
    pub delta_history: usize,
    pub garch: GarchConfig,
    pub structure: StructureConfig,
    pub flow: FlowConfig,
    pub composer: ComposerConfig,
    pub risk: RiskConfig,
    pub data: DataConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![Timeframe::M5, Timeframe::H1],
            seed: 0,
            lookback_bars: 500,
            delta_history: 1000,
            garch: GarchConfig::default(),
            structure: StructureConfig::default(),
            flow: FlowConfig::default(),
            composer: ComposerConfig::default(),
            risk: RiskConfig::default(),
            data: DataConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GarchConfig {
    pub p: usize,
    pub q: usize,
    /// Seconds between refits.
    pub retrain_interval: i64,
    /// Minimum finite returns required for a fit.
    pub min_data: usize,
    pub vol_model: String,
    pub dist: String,
}

impl Default for GarchConfig {
    fn default() -> Self {
        Self {
            p: 1,
            q: 1,
            retrain_interval: 86_400,
            min_data: 252,
            vol_model: "garch".into(),
            dist: "normal".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StructureConfig {
    pub atr_period: usize,
    /// Alligator periods (jaw, teeth, lips) and forward shifts.
    pub alligator_periods: [usize; 3],
    pub alligator_shifts: [usize; 3],
    pub hurst_upper: f64,
    pub hurst_lower: f64,
    pub stationarity_pvalue: f64,
    pub fft_dominant_cycle_threshold: f64,
    pub sd_pivot_prominence_atr_factor: f64,
    pub sd_zone_cluster_eps_atr_factor: f64,
    pub sd_zone_invalidation_atr_factor: f64,
    pub wyckoff_vol_spike_factor: f64,
    pub wyckoff_phase_conf_threshold: f64,
    pub structure_weights: StructureWeights,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            alligator_periods: [13, 8, 5],
            alligator_shifts: [8, 5, 3],
            hurst_upper: 0.55,
            hurst_lower: 0.45,
            stationarity_pvalue: 0.05,
            fft_dominant_cycle_threshold: 0.1,
            sd_pivot_prominence_atr_factor: 1.0,
            sd_zone_cluster_eps_atr_factor: 0.5,
            sd_zone_invalidation_atr_factor: 1.0,
            wyckoff_vol_spike_factor: 2.0,
            wyckoff_phase_conf_threshold: 7.0,
            structure_weights: StructureWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StructureWeights {
    pub trend: f64,
    pub alligator: f64,
    pub wyckoff: f64,
    pub zones: f64,
    pub cycle: f64,
    pub hurst: f64,
}

impl Default for StructureWeights {
    fn default() -> Self {
        Self { trend: 1.0, alligator: 1.0, wyckoff: 1.0, zones: 0.75, cycle: 0.5, hurst: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FlowConfig {
    pub delta_window: usize,
    pub flow_divergence_window: usize,
    pub flow_divergence_baseline_window: usize,
    pub flow_divergence_bins: usize,
    pub flow_divergence_threshold: f64,
    pub vsa_volume_avg_period: usize,
    pub vsa_vol_factor_high: f64,
    pub vsa_vol_factor_low: f64,
    pub vsa_spread_factor: f64,
    pub absorption_ratio: f64,
    /// Seconds between dynamic-threshold refreshes.
    pub threshold_update_interval: i64,
    pub bayes_update_blend_factor: f64,
    pub bayes_observation_cap: usize,
    pub volatility_multiplier: f64,
    pub flow_weights: FlowWeights,
    pub inventory: InventoryConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            delta_window: 20,
            flow_divergence_window: 30,
            flow_divergence_baseline_window: 200,
            flow_divergence_bins: 10,
            flow_divergence_threshold: 0.1,
            vsa_volume_avg_period: 20,
            vsa_vol_factor_high: 2.0,
            vsa_vol_factor_low: 0.5,
            vsa_spread_factor: 1.5,
            absorption_ratio: 1.5,
            threshold_update_interval: 300,
            bayes_update_blend_factor: 0.8,
            bayes_observation_cap: 100,
            volatility_multiplier: 1.0,
            flow_weights: FlowWeights::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FlowWeights {
    pub delta: f64,
    pub bid_ask: f64,
    pub liquidity: f64,
    pub volume_profile: f64,
    pub absorption: f64,
    pub effort_result: f64,
    pub institutional: f64,
    pub intensity: f64,
}

impl Default for FlowWeights {
    fn default() -> Self {
        Self {
            delta: 1.0,
            bid_ask: 1.0,
            liquidity: 0.5,
            volume_profile: 0.5,
            absorption: 1.0,
            effort_result: 0.75,
            institutional: 1.0,
            intensity: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InventoryConfig {
    pub max_position: f64,
    pub neutral_level: f64,
    pub risk_aversion: f64,
    pub mean_reversion_rate: f64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self { max_position: 1.0, neutral_level: 0.0, risk_aversion: 0.1, mean_reversion_rate: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    Rule,
    Predictor,
    Confluence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ComposerConfig {
    pub mode: DecisionMode,
    pub structure_weight: f64,
    pub flow_weight: f64,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    /// Added to both thresholds under a volatile regime.
    pub volatile_threshold_bump: f64,
    pub ml_probability_threshold: f64,
    pub sl_buffer_atr: f64,
    pub atr_multiple_for_sl: f64,
    /// TP fallback distance when `risk_reward_ratio` is disabled (0).
    pub atr_multiple_for_tp: f64,
    pub risk_reward_ratio: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            mode: DecisionMode::Rule,
            structure_weight: 0.6,
            flow_weight: 0.4,
            buy_threshold: 7.0,
            sell_threshold: 7.0,
            volatile_threshold_bump: 0.5,
            ml_probability_threshold: 0.65,
            sl_buffer_atr: 0.2,
            atr_multiple_for_sl: 2.0,
            atr_multiple_for_tp: 3.0,
            risk_reward_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RiskConfig {
    /// Rolling drawdown limit as a fraction of peak equity.
    pub max_drawdown: f64,
    /// Daily loss cap as a fraction of the day's opening balance.
    pub max_daily_loss: f64,
    /// Daily profit cap; 0 disables.
    pub max_daily_profit: f64,
    pub risk_per_trade: f64,
    pub max_trades_per_day: u32,
    pub max_consecutive_losses: u32,
    pub max_position_size: f64,
    pub min_volume: f64,
    pub volume_step: f64,
    /// Account-currency value of a 1.0 price move per lot.
    pub pip_value: f64,
    pub max_correlation_exposure: f64,
    pub use_kelly_sizing: bool,
    pub kelly_fraction: f64,
    pub min_trades_for_kelly: usize,
    pub kelly_lookback_trades: usize,
    pub dynamic_risk_enabled: bool,
    pub risk_level: f64,
    pub trade_cooldown_minutes: i64,
    pub loss_cooldown_multiplier: f64,
    pub use_var_check: bool,
    pub var_confidence_level: f64,
    pub max_portfolio_var_ratio: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown: 0.04,
            max_daily_loss: 0.02,
            max_daily_profit: 0.0,
            risk_per_trade: 0.01,
            max_trades_per_day: 10,
            max_consecutive_losses: 3,
            max_position_size: 10.0,
            min_volume: 0.01,
            volume_step: 0.01,
            pip_value: 100_000.0,
            max_correlation_exposure: 2.0,
            use_kelly_sizing: false,
            kelly_fraction: 0.5,
            min_trades_for_kelly: 50,
            kelly_lookback_trades: 100,
            dynamic_risk_enabled: false,
            risk_level: 1.0,
            trade_cooldown_minutes: 30,
            loss_cooldown_multiplier: 2.0,
            use_var_check: false,
            var_confidence_level: 0.99,
            max_portfolio_var_ratio: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DataConfig {
    /// Reject a history load when the gap fraction exceeds this percentage.
    pub gap_repair_max_perc: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { gap_repair_max_perc: 50.0 }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation, run once at load.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeframes.is_empty() {
            return Err(ConfigError::Invalid("timeframes must not be empty".into()));
        }
        if self.lookback_bars < 50 {
            return Err(ConfigError::Invalid("lookback_bars must be >= 50".into()));
        }
        if self.garch.p != 1 || self.garch.q != 1 {
            return Err(ConfigError::Invalid(
                format!("only GARCH(1,1) is supported, got ({},{})", self.garch.p, self.garch.q),
            ));
        }
        if self.garch.vol_model != "garch" {
            return Err(ConfigError::Invalid(format!(
                "unsupported vol_model '{}'",
                self.garch.vol_model
            )));
        }
        if self.garch.dist != "normal" {
            return Err(ConfigError::Invalid(format!("unsupported dist '{}'", self.garch.dist)));
        }
        if !(0.0..1.0).contains(&self.risk.max_drawdown) || self.risk.max_drawdown == 0.0 {
            return Err(ConfigError::Invalid("max_drawdown must be in (0, 1)".into()));
        }
        if self.risk.risk_per_trade <= 0.0 || self.risk.risk_per_trade >= 1.0 {
            return Err(ConfigError::Invalid("risk_per_trade must be in (0, 1)".into()));
        }
        if self.risk.volume_step <= 0.0 || self.risk.min_volume <= 0.0 {
            return Err(ConfigError::Invalid("volume_step and min_volume must be > 0".into()));
        }
        if self.risk.min_volume > self.risk.max_position_size {
            return Err(ConfigError::Invalid("min_volume exceeds max_position_size".into()));
        }
        if !(0.0..=1.0).contains(&self.risk.kelly_fraction) {
            return Err(ConfigError::Invalid("kelly_fraction must be in [0, 1]".into()));
        }
        if !(0.5..1.0).contains(&self.risk.var_confidence_level) {
            return Err(ConfigError::Invalid("var_confidence_level must be in [0.5, 1)".into()));
        }
        if self.composer.atr_multiple_for_sl <= 0.0
            || self.composer.atr_multiple_for_tp <= 0.0
            || self.composer.risk_reward_ratio < 0.0
        {
            return Err(ConfigError::Invalid(
                "ATR multiples must be > 0 and risk_reward_ratio >= 0".into(),
            ));
        }
        if self.composer.structure_weight < 0.0 || self.composer.flow_weight < 0.0 {
            return Err(ConfigError::Invalid("composer weights must be >= 0".into()));
        }
        if self.composer.structure_weight + self.composer.flow_weight <= 0.0 {
            return Err(ConfigError::Invalid("composer weights must not both be zero".into()));
        }
        if !(0.0..=10.0).contains(&self.composer.buy_threshold)
            || !(0.0..=10.0).contains(&self.composer.sell_threshold)
        {
            return Err(ConfigError::Invalid("signal thresholds must be in [0, 10]".into()));
        }
        if !(0.5..1.0).contains(&self.composer.ml_probability_threshold) {
            return Err(ConfigError::Invalid(
                "ml_probability_threshold must be in [0.5, 1)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.flow.bayes_update_blend_factor) {
            return Err(ConfigError::Invalid(
                "bayes_update_blend_factor must be in [0, 1]".into(),
            ));
        }
        let sw = &self.structure.structure_weights;
        let structure_sum =
            sw.trend + sw.alligator + sw.wyckoff + sw.zones + sw.cycle + sw.hurst;
        let fw = &self.flow.flow_weights;
        let flow_sum = fw.delta
            + fw.bid_ask
            + fw.liquidity
            + fw.volume_profile
            + fw.absorption
            + fw.effort_result
            + fw.institutional
            + fw.intensity;
        for (name, w) in [
            ("structure_weights", structure_sum),
            ("flow_weights", flow_sum),
        ] {
            if w <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must sum to > 0")));
            }
        }
        if [sw.trend, sw.alligator, sw.wyckoff, sw.zones, sw.cycle, sw.hurst]
            .iter()
            .chain(&[
                fw.delta,
                fw.bid_ask,
                fw.liquidity,
                fw.volume_profile,
                fw.absorption,
                fw.effort_result,
                fw.institutional,
                fw.intensity,
            ])
            .any(|w| *w < 0.0 || !w.is_finite())
        {
            return Err(ConfigError::Invalid("component weights must be finite and >= 0".into()));
        }
        if self.data.gap_repair_max_perc < 0.0 || self.data.gap_repair_max_perc > 100.0 {
            return Err(ConfigError::Invalid("gap_repair_max_perc must be in [0, 100]".into()));
        }
        Ok(())
    }
}

impl Default for DecisionMode {
    fn default() -> Self {
        DecisionMode::Rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_minimal_toml() {
        let cfg = EngineConfig::from_toml(
            r#"
timeframes = ["5min", "1h"]

[risk]
max_drawdown = 0.05
use_kelly_sizing = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.timeframes, vec![Timeframe::M5, Timeframe::H1]);
        assert_eq!(cfg.risk.max_drawdown, 0.05);
        assert!(cfg.risk.use_kelly_sizing);
        // untouched sections keep defaults
        assert_eq!(cfg.garch.min_data, 252);
        assert_eq!(cfg.composer.buy_threshold, 7.0);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = EngineConfig::from_toml("not_a_real_option = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let err = EngineConfig::from_toml("[risk]\nmystery = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unsupported_garch_order() {
        let err = EngineConfig::from_toml("[garch]\np = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_timeframe_string() {
        assert!(EngineConfig::from_toml(r#"timeframes = ["7min"]"#).is_err());
    }

    #[test]
    fn rejects_out_of_range_drawdown() {
        let err = EngineConfig::from_toml("[risk]\nmax_drawdown = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_weight() {
        let err = EngineConfig::from_toml("[flow.flow_weights]\ndelta = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
