//! Account, position and fill contracts shared with the execution adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SignalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// An open position as reported by the execution adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticket: u64,
    pub symbol: String,
    pub side: PositionSide,
    pub volume: f64,
    pub entry_price: f64,
    /// Dollar risk to the stop, used for correlation exposure budgeting.
    pub risk_amount: f64,
    pub opened_at: DateTime<Utc>,
}

/// Account snapshot returned by `ExecutionClient::account_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatus {
    pub balance: f64,
    pub equity: f64,
    pub margin_free: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStatus {
    Filled,
    Partial,
    Rejected,
}

/// Execution feedback delivered through `on_fill`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub ticket: u64,
    /// Id of the originating signal, when the adapter can attribute it.
    pub signal_id: Option<SignalId>,
    pub symbol: String,
    pub side: PositionSide,
    pub volume: f64,
    pub price: f64,
    /// Realized P&L for closing fills.
    pub pnl: Option<f64>,
    pub status: FillStatus,
    pub timestamp: DateTime<Utc>,
}

impl FillEvent {
    pub fn is_closing(&self) -> bool {
        self.pnl.is_some()
    }
}
