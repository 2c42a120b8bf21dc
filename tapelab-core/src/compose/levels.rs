//! Stop-loss / take-profit construction.
//!
//! Levels anchor to supply/demand zones when live zones exist on the right
//! side of the entry, with an ATR-buffer offset; otherwise they fall back to
//! ATR multiples and the configured risk:reward. Every choice records an
//! audit reason string.

use serde::{Deserialize, Serialize};

use crate::config::ComposerConfig;
use crate::domain::TradeAction;
use crate::structure::ZoneSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLevels {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub sl_reason: String,
    pub tp_reason: String,
}

/// Sizing multiplier from the combined score: clamp(0.5 + 0.7 * score/10).
pub fn confidence_modifier(score: f64) -> f64 {
    (0.5 + 0.7 * score / 10.0).clamp(0.5, 1.2)
}

/// Build SL/TP for an entry at `entry` with the current `atr`.
///
/// Returns None when no coherent level pair can be constructed (degenerate
/// ATR).
pub fn build_levels(
    action: TradeAction,
    entry: f64,
    atr: f64,
    zones: &ZoneSet,
    config: &ComposerConfig,
) -> Option<RiskLevels> {
    if atr <= 0.0 || !atr.is_finite() || entry <= 0.0 {
        return None;
    }
    let buffer = config.sl_buffer_atr * atr;
    let atr_stop = config.atr_multiple_for_sl * atr;

    match action {
        TradeAction::Buy => {
            let (stop_loss, sl_reason) = match zones
                .nearest_demand(entry)
                .filter(|z| z.price_low - buffer < entry)
            {
                Some(zone) => (
                    zone.price_low - buffer,
                    format!("demand zone low {:.5} - {:.1} ATR buffer", zone.price_low, config.sl_buffer_atr),
                ),
                None => (
                    entry - atr_stop,
                    format!("no demand zone; entry - {:.1} ATR", config.atr_multiple_for_sl),
                ),
            };
            let risk = entry - stop_loss;
            if risk <= 0.0 {
                return None;
            }
            let (take_profit, tp_reason) = match zones
                .nearest_supply(entry)
                .filter(|z| z.price_low - buffer > entry)
            {
                Some(zone) => (
                    zone.price_low - buffer,
                    format!("below supply zone low {:.5}", zone.price_low),
                ),
                None if config.risk_reward_ratio > 0.0 => (
                    entry + risk * config.risk_reward_ratio,
                    format!("no supply zone; {:.1}R target", config.risk_reward_ratio),
                ),
                None => (
                    entry + config.atr_multiple_for_tp * atr,
                    format!("no supply zone; entry + {:.1} ATR", config.atr_multiple_for_tp),
                ),
            };
            if take_profit <= entry {
                return None;
            }
            Some(RiskLevels { stop_loss, take_profit, sl_reason, tp_reason })
        }
        TradeAction::Sell => {
            let (stop_loss, sl_reason) = match zones
                .nearest_supply(entry)
                .filter(|z| z.price_high + buffer > entry)
            {
                Some(zone) => (
                    zone.price_high + buffer,
                    format!("supply zone high {:.5} + {:.1} ATR buffer", zone.price_high, config.sl_buffer_atr),
                ),
                None => (
                    entry + atr_stop,
                    format!("no supply zone; entry + {:.1} ATR", config.atr_multiple_for_sl),
                ),
            };
            let risk = stop_loss - entry;
            if risk <= 0.0 {
                return None;
            }
            let (take_profit, tp_reason) = match zones
                .nearest_demand(entry)
                .filter(|z| z.price_high + buffer < entry)
            {
                Some(zone) => (
                    zone.price_high + buffer,
                    format!("above demand zone high {:.5}", zone.price_high),
                ),
                None if config.risk_reward_ratio > 0.0 => (
                    entry - risk * config.risk_reward_ratio,
                    format!("no demand zone; {:.1}R target", config.risk_reward_ratio),
                ),
                None => (
                    entry - config.atr_multiple_for_tp * atr,
                    format!("no demand zone; entry - {:.1} ATR", config.atr_multiple_for_tp),
                ),
            };
            if take_profit >= entry {
                return None;
            }
            Some(RiskLevels { stop_loss, take_profit, sl_reason, tp_reason })
        }
    }
}
