//! Account-level risk state: equity curve, daily counters, cooldowns and
//! rolling trade statistics.
//!
//! Single-writer: all mutation goes through the risk evaluator. Daily
//! counters roll at UTC midnight based on event time, never wall clock.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::OpenPosition;
use crate::store::ring::BoundedRing;

const EQUITY_HISTORY: usize = 10_000;
const CLOSED_TRADES: usize = 1_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub pnl: f64,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RiskState {
    pub current_balance: f64,
    pub equity: f64,
    pub peak_equity: f64,
    /// Balance at the first event of the current UTC day.
    pub daily_start_balance: f64,
    pub daily_pnl: f64,
    pub daily_trades: u32,
    pub consecutive_losses: u32,
    pub open_positions: HashMap<String, OpenPosition>,
    pub cooldown_until: HashMap<String, DateTime<Utc>>,
    current_day: Option<NaiveDate>,
    closed_trades: BoundedRing<ClosedTrade>,
    equity_history: BoundedRing<f64>,
}

impl RiskState {
    pub fn new(initial_balance: f64) -> Self {
        let mut equity_history = BoundedRing::new(EQUITY_HISTORY);
        equity_history.push(initial_balance);
        Self {
            current_balance: initial_balance,
            equity: initial_balance,
            peak_equity: initial_balance,
            daily_start_balance: initial_balance,
            daily_pnl: 0.0,
            daily_trades: 0,
            consecutive_losses: 0,
            open_positions: HashMap::new(),
            cooldown_until: HashMap::new(),
            current_day: None,
            closed_trades: BoundedRing::new(CLOSED_TRADES),
            equity_history,
        }
    }

    /// Roll the daily counters when `at` lands on a new UTC day.
    pub fn roll_day(&mut self, at: DateTime<Utc>) {
        let day = at.date_naive();
        if self.current_day != Some(day) {
            if self.current_day.is_some() {
                debug!(year = day.year(), ordinal = day.ordinal(), "daily counters reset");
            }
            self.current_day = Some(day);
            self.daily_start_balance = self.current_balance;
            self.daily_pnl = 0.0;
            self.daily_trades = 0;
        }
    }

    /// Mark-to-market update; peak equity never decreases.
    pub fn update_equity(&mut self, equity: f64, at: DateTime<Utc>) {
        self.roll_day(at);
        self.equity = equity;
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        self.equity_history.push(equity);
    }

    /// Rolling drawdown from the equity peak, in [0, 1].
    pub fn drawdown(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - self.equity) / self.peak_equity).max(0.0)
    }

    /// Record a closed trade: balance, daily P&L, loss streak and the
    /// rolling trade window.
    pub fn record_closed_trade(&mut self, pnl: f64, at: DateTime<Utc>) {
        self.roll_day(at);
        self.current_balance += pnl;
        self.daily_pnl += pnl;
        if pnl < 0.0 {
            self.consecutive_losses += 1;
        } else if pnl > 0.0 {
            self.consecutive_losses = 0;
        }
        self.closed_trades.push(ClosedTrade { pnl, closed_at: at });
        self.update_equity(self.current_balance, at);
    }

    pub fn record_signal_accepted(&mut self, at: DateTime<Utc>) {
        self.roll_day(at);
        self.daily_trades += 1;
    }

    pub fn set_cooldown(&mut self, symbol: &str, until: DateTime<Utc>) {
        self.cooldown_until.insert(symbol.to_string(), until);
    }

    pub fn in_cooldown(&self, symbol: &str, at: DateTime<Utc>) -> bool {
        self.cooldown_until.get(symbol).map(|until| at < *until).unwrap_or(false)
    }

    pub fn closed_trade_count(&self) -> usize {
        self.closed_trades.len()
    }

    /// Win rate over the last `lookback` closed trades. None without trades.
    pub fn rolling_win_rate(&self, lookback: usize) -> Option<f64> {
        let trades = self.closed_trades.last_n(lookback);
        if trades.is_empty() {
            return None;
        }
        let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
        Some(wins as f64 / trades.len() as f64)
    }

    /// Mean win over mean |loss| over the last `lookback` closed trades.
    /// None until both a win and a loss exist in the window.
    pub fn rolling_win_loss_ratio(&self, lookback: usize) -> Option<f64> {
        let trades = self.closed_trades.last_n(lookback);
        let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
        let losses: Vec<f64> =
            trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl.abs()).collect();
        if wins.is_empty() || losses.is_empty() {
            return None;
        }
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        (avg_loss > 0.0).then(|| avg_win / avg_loss)
    }

    /// Gross wins over gross losses in the last `lookback` closed trades.
    /// None without any losses (the ratio is undefined, not infinite).
    pub fn rolling_profit_factor(&self, lookback: usize) -> Option<f64> {
        let trades = self.closed_trades.last_n(lookback);
        let gross_win: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
        let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| -t.pnl).sum();
        (gross_loss > 0.0).then(|| gross_win / gross_loss)
    }

    pub fn equity_history(&self) -> Vec<f64> {
        self.equity_history.iter().copied().collect()
    }
}
