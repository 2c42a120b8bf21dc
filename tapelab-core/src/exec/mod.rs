//! Execution adapter contract.
//!
//! The core never talks to a broker directly: it invokes this trait and the
//! adapter reports back through `on_fill`. `submit` must be idempotent by
//! signal id; failures surface as `ExecutionError` and are never retried at
//! the core level.

use std::sync::Mutex;

use thiserror::Error;

use crate::domain::{AccountStatus, OpenPosition, TradeSignal};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("submit failed: {0}")]
    SubmitFailed(String),
    #[error("unknown ticket {0}")]
    UnknownTicket(u64),
    #[error("stale quote: {0}")]
    StaleQuote(String),
    #[error("adapter unavailable: {0}")]
    Unavailable(String),
}

/// Outbound operations the core invokes on the brokerage adapter.
pub trait ExecutionClient: Send + Sync {
    /// Submit a sized signal. Idempotent by `signal.id`.
    fn submit(&self, signal: &TradeSignal) -> Result<(), ExecutionError>;

    fn modify(
        &self,
        ticket: u64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), ExecutionError>;

    fn cancel(&self, ticket: u64) -> Result<(), ExecutionError>;

    fn positions(&self) -> Result<Vec<OpenPosition>, ExecutionError>;

    fn account_status(&self) -> Result<AccountStatus, ExecutionError>;
}

/// In-memory client for tests and replays: records submissions, serves a
/// fixed account snapshot, deduplicates by signal id.
pub struct RecordingClient {
    submitted: Mutex<Vec<TradeSignal>>,
    account: Mutex<AccountStatus>,
}

impl RecordingClient {
    pub fn new(balance: f64) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            account: Mutex::new(AccountStatus {
                balance,
                equity: balance,
                margin_free: balance,
                currency: "USD".into(),
            }),
        }
    }

    pub fn set_equity(&self, balance: f64, equity: f64) {
        let mut account = self.account.lock().expect("account lock");
        account.balance = balance;
        account.equity = equity;
    }

    pub fn submissions(&self) -> Vec<TradeSignal> {
        self.submitted.lock().expect("submissions lock").clone()
    }
}

impl ExecutionClient for RecordingClient {
    fn submit(&self, signal: &TradeSignal) -> Result<(), ExecutionError> {
        let mut submitted = self.submitted.lock().expect("submissions lock");
        if submitted.iter().any(|s| s.id == signal.id) {
            return Ok(()); // idempotent resubmission
        }
        submitted.push(signal.clone());
        Ok(())
    }

    fn modify(
        &self,
        _ticket: u64,
        _stop_loss: Option<f64>,
        _take_profit: Option<f64>,
    ) -> Result<(), ExecutionError> {
        Ok(())
    }

    fn cancel(&self, _ticket: u64) -> Result<(), ExecutionError> {
        Ok(())
    }

    fn positions(&self) -> Result<Vec<OpenPosition>, ExecutionError> {
        Ok(Vec::new())
    }

    fn account_status(&self) -> Result<AccountStatus, ExecutionError> {
        Ok(self.account.lock().expect("account lock").clone())
    }
}
