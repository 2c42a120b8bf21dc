//! Signal composer: fuses the two analyses into a scored decision.
//!
//! Three decision modes share the same SL/TP construction and emit either a
//! `TradeSignal` or a suppression reason string for the audit trail.

pub mod confluence;
pub mod levels;
pub mod predictor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ComposerConfig, DecisionMode};
use crate::domain::{SignalId, SignalMetadata, Timeframe, TradeAction, TradeSignal};
use crate::flow::{FlowDirection, FlowSnapshot};
use crate::structure::{StructureSnapshot, TrendDirection};

pub use confluence::{ConfluenceGraph, PathDecision};
pub use levels::{build_levels, confidence_modifier, RiskLevels};
pub use predictor::{ConstantPredictor, Predictor, PredictorFeatures};

/// Outcome of one composition pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComposeOutcome {
    Signal(TradeSignal),
    /// No trade; the reason is preserved verbatim for the audit log.
    Suppressed { reason: String },
}

impl ComposeOutcome {
    pub fn signal(&self) -> Option<&TradeSignal> {
        match self {
            ComposeOutcome::Signal(s) => Some(s),
            ComposeOutcome::Suppressed { .. } => None,
        }
    }
}

/// Identity of the evaluation, provided by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct ComposeContext<'a> {
    pub symbol: &'a str,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub seed: u64,
    pub sequence: u64,
}

pub struct SignalComposer {
    config: ComposerConfig,
    predictor: Option<Box<dyn Predictor>>,
}

impl SignalComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config, predictor: None }
    }

    pub fn with_predictor(config: ComposerConfig, predictor: Box<dyn Predictor>) -> Self {
        Self { config, predictor: Some(predictor) }
    }

    /// Fuse the two snapshots at the current price.
    pub fn compose(
        &self,
        ms: &StructureSnapshot,
        of: &FlowSnapshot,
        ctx: &ComposeContext<'_>,
    ) -> ComposeOutcome {
        if !ms.valid {
            return suppressed(format!(
                "structure analysis invalid: {}",
                ms.reason.as_deref().unwrap_or("unknown")
            ));
        }
        if !of.valid {
            return suppressed(format!(
                "flow analysis invalid: {}",
                of.reason.as_deref().unwrap_or("unknown")
            ));
        }

        let decision = match self.config.mode {
            DecisionMode::Rule => self.rule_decision(ms, of),
            DecisionMode::Predictor => self.predictor_decision(ms, of),
            DecisionMode::Confluence => self.confluence_decision(ms, of),
        };

        let (action, score) = match decision {
            Ok(pair) => pair,
            Err(reason) => return suppressed(reason),
        };

        let levels = match levels::build_levels(action, ctx.price, ms.atr, &ms.zones, &self.config)
        {
            Some(l) => l,
            None => return suppressed("no coherent SL/TP levels".to_string()),
        };

        let signal = TradeSignal {
            id: SignalId::derive(ctx.seed, ctx.symbol, ctx.timeframe, ctx.timestamp, ctx.sequence),
            symbol: ctx.symbol.to_string(),
            timeframe: ctx.timeframe,
            timestamp: ctx.timestamp,
            action,
            entry: ctx.price,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            score,
            confidence_modifier: levels::confidence_modifier(score),
            volume: 0.0,
            metadata: SignalMetadata {
                structure_direction: format!("{:?}", ms.direction).to_lowercase(),
                structure_score: ms.structure_score,
                flow_direction: format!("{:?}", of.direction).to_lowercase(),
                flow_score: of.flow_score,
                wyckoff_phase: ms.wyckoff_phase.as_str().to_string(),
                vsa_signal: of.vsa.map(|v| v.signal.as_str().to_string()),
                nearest_supply: ms.nearest_supply.as_ref().map(|z| z.price_low),
                nearest_demand: ms.nearest_demand.as_ref().map(|z| z.price_high),
                sl_reason: levels.sl_reason,
                tp_reason: levels.tp_reason,
                decision_mode: format!("{:?}", self.config.mode).to_lowercase(),
            },
        };
        info!(
            symbol = ctx.symbol,
            timeframe = %ctx.timeframe,
            action = ?signal.action,
            score = signal.score,
            "signal composed"
        );
        ComposeOutcome::Signal(signal)
    }

    /// Default mode: weighted score fusion gated on directional agreement.
    fn rule_decision(
        &self,
        ms: &StructureSnapshot,
        of: &FlowSnapshot,
    ) -> Result<(TradeAction, f64), String> {
        let cfg = &self.config;
        let weight_sum = cfg.structure_weight + cfg.flow_weight;
        let combined =
            (cfg.structure_weight * ms.structure_score + cfg.flow_weight * of.flow_score)
                / weight_sum;
        let combined = combined.clamp(0.0, 10.0);

        // Volatile regimes demand a higher bar.
        let bump = if ms.volatile_regime { cfg.volatile_threshold_bump } else { 0.0 };
        let buy_threshold = (cfg.buy_threshold + bump).min(10.0);
        let sell_threshold = (cfg.sell_threshold + bump).min(10.0);

        let up_agreement =
            ms.direction == TrendDirection::Uptrend && of.direction == FlowDirection::Up;
        let down_agreement =
            ms.direction == TrendDirection::Downtrend && of.direction == FlowDirection::Down;

        if up_agreement {
            if combined >= buy_threshold {
                return Ok((TradeAction::Buy, combined));
            }
            return Err(format!("Score < {buy_threshold:.1} (combined {combined:.2})"));
        }
        if down_agreement {
            if combined >= sell_threshold {
                return Ok((TradeAction::Sell, combined));
            }
            return Err(format!("Score < {sell_threshold:.1} (combined {combined:.2})"));
        }
        Err(format!(
            "no directional agreement (structure {:?}, flow {:?})",
            ms.direction, of.direction
        ))
    }

    /// Predictor mode: emit on P(up) clearing the probability threshold.
    fn predictor_decision(
        &self,
        ms: &StructureSnapshot,
        of: &FlowSnapshot,
    ) -> Result<(TradeAction, f64), String> {
        let predictor = self
            .predictor
            .as_ref()
            .ok_or_else(|| "predictor mode selected but no predictor installed".to_string())?;
        let features = PredictorFeatures::from_snapshots(ms, of);
        let p_up = predictor
            .predict(&features)
            .ok_or_else(|| format!("predictor '{}' declined to score", predictor.name()))?;
        if !(0.0..=1.0).contains(&p_up) {
            return Err(format!("predictor '{}' returned {p_up}", predictor.name()));
        }

        let threshold = self.config.ml_probability_threshold;
        if p_up > threshold {
            Ok((TradeAction::Buy, (10.0 * p_up).clamp(0.0, 10.0)))
        } else if 1.0 - p_up > threshold {
            Ok((TradeAction::Sell, (10.0 * (1.0 - p_up)).clamp(0.0, 10.0)))
        } else {
            Err(format!("P(up) {p_up:.3} inside neutral band"))
        }
    }

    /// Confluence mode: strongest path over the fact graph.
    fn confluence_decision(
        &self,
        ms: &StructureSnapshot,
        of: &FlowSnapshot,
    ) -> Result<(TradeAction, f64), String> {
        let decision = ConfluenceGraph::from_snapshots(ms, of).strongest_path();
        let score = (decision.magnitude * 10.0).clamp(0.0, 10.0);
        match decision.sign {
            1 if score >= self.config.buy_threshold => Ok((TradeAction::Buy, score)),
            -1 if score >= self.config.sell_threshold => Ok((TradeAction::Sell, score)),
            0 => Err("no confluence path".to_string()),
            _ => Err(format!("Score < {:.1} (path {score:.2})", self.config.buy_threshold)),
        }
    }
}

fn suppressed(reason: String) -> ComposeOutcome {
    ComposeOutcome::Suppressed { reason }
}
