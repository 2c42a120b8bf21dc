//! Risk evaluator: ordered gates, then sizing.
//!
//! Gate order matches the audit contract: rolling drawdown, daily caps,
//! trade/loss-streak caps, portfolio VaR, cooldowns. A rejection is data
//! (a verdict with the specific reason), never an error.

pub mod correlation;
pub mod sizing;
pub mod state;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RiskConfig;
use crate::domain::{AccountStatus, TradeSignal};

pub use correlation::{correlation_factor, CorrelationMatrix};
pub use sizing::{kelly_fraction, lots_for_risk, round_to_step, SizingMethod};
pub use state::{ClosedTrade, RiskState};

/// Result of a risk evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Verdict {
    Accepted {
        signal: TradeSignal,
        sizing_method: String,
        /// Effective bankroll fraction at risk after all multipliers.
        risk_fraction: f64,
    },
    Rejected {
        reason: String,
    },
}

impl Verdict {
    pub fn accepted(&self) -> Option<&TradeSignal> {
        match self {
            Verdict::Accepted { signal, .. } => Some(signal),
            Verdict::Rejected { .. } => None,
        }
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Verdict::Rejected { reason } => Some(reason),
            Verdict::Accepted { .. } => None,
        }
    }
}

pub struct RiskEvaluator {
    config: RiskConfig,
}

impl RiskEvaluator {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Evaluate a composed signal against account state.
    ///
    /// `volatility_ratio` is current-vs-baseline volatility (GARCH forecast
    /// preferred, ATR fallback); None means no basis, treated as 1.0.
    pub fn evaluate(
        &self,
        signal: &TradeSignal,
        account: &AccountStatus,
        state: &mut RiskState,
        correlations: &CorrelationMatrix,
        volatility_ratio: Option<f64>,
        now: DateTime<Utc>,
    ) -> Verdict {
        let cfg = &self.config;
        state.update_equity(account.equity, now);
        state.current_balance = account.balance;

        // 1. rolling drawdown
        if state.drawdown() >= cfg.max_drawdown {
            return reject(format!(
                "Max Rolling Drawdown breached: {:.2}% >= {:.2}%",
                state.drawdown() * 100.0,
                cfg.max_drawdown * 100.0
            ));
        }

        // 2. daily loss / profit caps
        if state.daily_start_balance > 0.0 {
            let daily_loss_cap = cfg.max_daily_loss * state.daily_start_balance;
            if state.daily_pnl <= -daily_loss_cap {
                return reject(format!(
                    "daily loss cap hit: {:.2} <= -{:.2}",
                    state.daily_pnl, daily_loss_cap
                ));
            }
            if cfg.max_daily_profit > 0.0 {
                let profit_cap = cfg.max_daily_profit * state.daily_start_balance;
                if state.daily_pnl >= profit_cap {
                    return reject(format!(
                        "daily profit cap hit: {:.2} >= {:.2}",
                        state.daily_pnl, profit_cap
                    ));
                }
            }
        }

        // 3. trade count and loss streak
        if state.daily_trades >= cfg.max_trades_per_day {
            return reject(format!("max trades per day reached ({})", cfg.max_trades_per_day));
        }
        if state.consecutive_losses >= cfg.max_consecutive_losses {
            return reject(format!(
                "max consecutive losses reached ({})",
                state.consecutive_losses
            ));
        }

        // 4. portfolio VaR (optional)
        if cfg.use_var_check {
            let var = correlations.portfolio_var(&state.open_positions, cfg.var_confidence_level);
            let cap = cfg.max_portfolio_var_ratio * account.balance;
            if var > cap {
                return reject(format!("portfolio VaR {var:.2} exceeds cap {cap:.2}"));
            }
        }

        // 5. per-symbol cooldown
        if state.in_cooldown(&signal.symbol, now) {
            return reject(format!("{} in trade cooldown", signal.symbol));
        }

        // ── sizing ──────────────────────────────────────────────────────
        let stop_distance = signal.stop_distance();
        if stop_distance <= 0.0 {
            return reject("zero stop distance".to_string());
        }

        let (base_fraction, method) = self.base_fraction(state);
        let dynamic_factor = if cfg.dynamic_risk_enabled {
            1.0 / (1.0 + 0.25 * state.consecutive_losses as f64)
        } else {
            1.0
        };
        let exposure =
            correlations.exposure(&signal.symbol, &state.open_positions, account.balance);
        let corr_factor = correlation_factor(exposure, cfg.max_correlation_exposure);
        let vol_factor = volatility_ratio
            .filter(|r| r.is_finite() && *r > 0.0)
            .map(|r| (1.0 / r).clamp(0.25, 2.0))
            .unwrap_or(1.0);

        let risk_fraction = base_fraction
            * dynamic_factor
            * cfg.risk_level
            * corr_factor
            * vol_factor
            * signal.confidence_modifier;

        let raw_volume =
            lots_for_risk(account.balance, risk_fraction, stop_distance, cfg.pip_value);
        let volume = round_to_step(raw_volume, cfg.volume_step).min(cfg.max_position_size);
        if volume < cfg.min_volume {
            return reject(format!(
                "sized volume {volume:.4} below minimum {:.4}",
                cfg.min_volume
            ));
        }

        debug!(
            symbol = %signal.symbol,
            method = method.as_str(),
            risk_fraction,
            volume,
            corr_factor,
            vol_factor,
            "signal sized"
        );

        let mut sized = signal.clone();
        sized.volume = volume;
        state.record_signal_accepted(now);
        state.set_cooldown(
            &signal.symbol,
            now + Duration::minutes(cfg.trade_cooldown_minutes),
        );
        info!(symbol = %signal.symbol, volume, "signal accepted");
        Verdict::Accepted {
            signal: sized,
            sizing_method: method.as_str().to_string(),
            risk_fraction,
        }
    }

    /// Base bankroll fraction and the method that produced it. Kelly only
    /// engages with sufficient closed-trade history and usable statistics.
    fn base_fraction(&self, state: &RiskState) -> (f64, SizingMethod) {
        let cfg = &self.config;
        if cfg.use_kelly_sizing && state.closed_trade_count() >= cfg.min_trades_for_kelly {
            let stats = state
                .rolling_win_rate(cfg.kelly_lookback_trades)
                .zip(state.rolling_win_loss_ratio(cfg.kelly_lookback_trades));
            if let Some((win_rate, ratio)) = stats {
                if let Some(f) = kelly_fraction(win_rate, ratio, cfg.kelly_fraction) {
                    if f > 0.0 {
                        return (f, SizingMethod::Kelly);
                    }
                }
            }
        }
        (cfg.risk_per_trade, SizingMethod::FixedFractional)
    }

    /// Feed back a closed trade; a loss extends the symbol's cooldown by
    /// the loss multiplier.
    pub fn on_trade_closed(
        &self,
        state: &mut RiskState,
        symbol: &str,
        pnl: f64,
        at: DateTime<Utc>,
    ) {
        state.record_closed_trade(pnl, at);
        if pnl < 0.0 {
            let minutes = (self.config.trade_cooldown_minutes as f64
                * self.config.loss_cooldown_multiplier) as i64;
            state.set_cooldown(symbol, at + Duration::minutes(minutes));
            debug!(symbol, pnl, minutes, "loss cooldown applied");
        }
    }
}

fn reject(reason: String) -> Verdict {
    debug!(%reason, "signal rejected");
    Verdict::Rejected { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComposerConfig;
    use crate::domain::{SignalId, SignalMetadata, Timeframe, TradeAction};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn signal(entry: f64, stop: f64) -> TradeSignal {
        TradeSignal {
            id: SignalId::derive(0, "EURUSD", Timeframe::M5, at(1, 10), 0),
            symbol: "EURUSD".into(),
            timeframe: Timeframe::M5,
            timestamp: at(1, 10),
            action: TradeAction::Buy,
            entry,
            stop_loss: stop,
            take_profit: entry + (entry - stop) * ComposerConfig::default().risk_reward_ratio,
            score: 8.0,
            confidence_modifier: 1.0,
            volume: 0.0,
            metadata: SignalMetadata::default(),
        }
    }

    fn account(balance: f64, equity: f64) -> AccountStatus {
        AccountStatus { balance, equity, margin_free: balance, currency: "USD".into() }
    }

    fn evaluator(config: RiskConfig) -> RiskEvaluator {
        RiskEvaluator::new(config)
    }

    #[test]
    fn drawdown_gate_trips_past_threshold() {
        let eval = evaluator(RiskConfig::default());
        let mut state = RiskState::new(100_000.0);
        let correlations = CorrelationMatrix::default();

        // equity path: 98k, 97k, 96.5k, all under the 4% line from 100k
        for (i, equity) in [98_000.0, 97_000.0, 96_500.0].iter().enumerate() {
            let verdict = eval.evaluate(
                &signal(1.0850, 1.0800),
                &account(*equity, *equity),
                &mut state,
                &correlations,
                None,
                at(1, i as u32 + 1),
            );
            assert!(verdict.accepted().is_some(), "equity {equity} should pass");
        }

        // one more -600: drawdown 4.1% >= 4%
        let verdict = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(95_900.0, 95_900.0),
            &mut state,
            &correlations,
            None,
            at(1, 10),
        );
        let reason = verdict.rejection_reason().expect("rejection");
        assert!(reason.contains("Max Rolling Drawdown breached"), "{reason}");
    }

    #[test]
    fn kelly_disabled_below_history_floor() {
        let mut config = RiskConfig::default();
        config.use_kelly_sizing = true;
        config.min_trades_for_kelly = 50;
        let eval = evaluator(config);
        let mut state = RiskState::new(100_000.0);
        // 30 closed trades < 50
        for i in 0..30 {
            state.record_closed_trade(if i % 2 == 0 { 100.0 } else { -50.0 }, at(1, 1));
        }
        let verdict = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(100_000.0, 100_000.0),
            &mut state,
            &CorrelationMatrix::default(),
            None,
            at(2, 10),
        );
        match verdict {
            Verdict::Accepted { sizing_method, .. } => {
                assert_eq!(sizing_method, "Fixed Fractional");
            }
            Verdict::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        }
    }

    #[test]
    fn kelly_engages_with_history() {
        let mut config = RiskConfig::default();
        config.use_kelly_sizing = true;
        config.min_trades_for_kelly = 50;
        let eval = evaluator(config);
        let mut state = RiskState::new(100_000.0);
        // 60 trades, 60% winners at 2:1
        for i in 0..60 {
            state.record_closed_trade(if i % 5 < 3 { 200.0 } else { -100.0 }, at(1, 1));
        }
        state.consecutive_losses = 0;
        // account tracks the grown balance so the drawdown gate stays quiet
        let balance = state.current_balance;
        let verdict = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(balance, balance),
            &mut state,
            &CorrelationMatrix::default(),
            None,
            at(2, 10),
        );
        match verdict {
            Verdict::Accepted { sizing_method, risk_fraction, .. } => {
                assert_eq!(sizing_method, "Kelly");
                assert!(risk_fraction > 0.0);
            }
            Verdict::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        }
    }

    #[test]
    fn volume_respects_step_and_bounds() {
        let eval = evaluator(RiskConfig::default());
        let mut state = RiskState::new(100_000.0);
        let verdict = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(100_000.0, 100_000.0),
            &mut state,
            &CorrelationMatrix::default(),
            None,
            at(1, 10),
        );
        let sized = verdict.accepted().expect("accepted");
        let cfg = RiskConfig::default();
        let steps = sized.volume / cfg.volume_step;
        assert!((steps - steps.round()).abs() < 1e-9, "volume on step grid");
        assert!(sized.volume >= cfg.min_volume);
        assert!(sized.volume <= cfg.max_position_size);
    }

    #[test]
    fn cooldown_blocks_immediate_reentry() {
        let eval = evaluator(RiskConfig::default());
        let mut state = RiskState::new(100_000.0);
        let correlations = CorrelationMatrix::default();
        let first = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(100_000.0, 100_000.0),
            &mut state,
            &correlations,
            None,
            at(1, 10),
        );
        assert!(first.accepted().is_some());

        let second = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(100_000.0, 100_000.0),
            &mut state,
            &correlations,
            None,
            at(1, 10) + Duration::minutes(5),
        );
        assert!(second.rejection_reason().unwrap().contains("cooldown"));
    }

    #[test]
    fn loss_extends_cooldown() {
        let config = RiskConfig::default();
        let eval = evaluator(config.clone());
        let mut state = RiskState::new(100_000.0);
        eval.on_trade_closed(&mut state, "EURUSD", -250.0, at(1, 10));
        // base 30 min * 2.0 multiplier = 60 min
        assert!(state.in_cooldown("EURUSD", at(1, 10) + Duration::minutes(59)));
        assert!(!state.in_cooldown("EURUSD", at(1, 11)));
    }

    #[test]
    fn max_trades_per_day_gate() {
        let mut config = RiskConfig::default();
        config.max_trades_per_day = 1;
        config.trade_cooldown_minutes = 0;
        let eval = evaluator(config);
        let mut state = RiskState::new(100_000.0);
        let correlations = CorrelationMatrix::default();
        assert!(eval
            .evaluate(
                &signal(1.0850, 1.0800),
                &account(100_000.0, 100_000.0),
                &mut state,
                &correlations,
                None,
                at(1, 10),
            )
            .accepted()
            .is_some());
        let verdict = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(100_000.0, 100_000.0),
            &mut state,
            &correlations,
            None,
            at(1, 11),
        );
        assert!(verdict.rejection_reason().unwrap().contains("max trades per day"));
    }

    #[test]
    fn consecutive_loss_gate() {
        let mut config = RiskConfig::default();
        config.max_consecutive_losses = 2;
        let eval = evaluator(config);
        let mut state = RiskState::new(100_000.0);
        state.consecutive_losses = 2;
        let verdict = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(100_000.0, 100_000.0),
            &mut state,
            &CorrelationMatrix::default(),
            None,
            at(1, 10),
        );
        assert!(verdict.rejection_reason().unwrap().contains("consecutive losses"));
    }

    #[test]
    fn high_volatility_shrinks_size() {
        let eval = evaluator(RiskConfig::default());
        let correlations = CorrelationMatrix::default();

        let mut calm_state = RiskState::new(100_000.0);
        let calm = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(100_000.0, 100_000.0),
            &mut calm_state,
            &correlations,
            Some(1.0),
            at(1, 10),
        );
        let mut hot_state = RiskState::new(100_000.0);
        let hot = eval.evaluate(
            &signal(1.0850, 1.0800),
            &account(100_000.0, 100_000.0),
            &mut hot_state,
            &correlations,
            Some(2.0),
            at(1, 10),
        );
        let calm_vol = calm.accepted().unwrap().volume;
        let hot_vol = hot.accepted().unwrap().volume;
        assert!(hot_vol < calm_vol, "hot {hot_vol} < calm {calm_vol}");
    }
}
