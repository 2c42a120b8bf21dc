//! Error taxonomy for the analytical core.
//!
//! Analyzers never panic on bad market input: they return an invalid
//! snapshot whose reason string is classified here, and leave slot state
//! untouched. The orchestrator threads every surfaced failure through this
//! taxonomy: transient numerics fall back, fatal numerics skip the tick,
//! risk-gate rejections become suppressions with the specific reason, and
//! corruption terminates the process with a diagnostic snapshot.

use thiserror::Error;

use crate::exec::ExecutionError;
use crate::numerics::garch::GarchError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Bad bar, non-monotonic timestamp, missing prerequisite input.
    /// Slot state is unchanged.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Solver non-convergence, non-positive variance. Caller falls back to
    /// the ATR-based path.
    #[error("transient numerics failure: {0}")]
    NumericsTransient(String),

    /// NaN/inf in a critical series. The current tick is skipped; slot
    /// remains healthy.
    #[error("fatal numerics failure: {0}")]
    NumericsFatal(String),

    /// Drawdown, daily-loss, VaR or cooldown gate fired. Carried back to
    /// the caller as a suppression with the specific reason.
    #[error("risk rejected: {0}")]
    RiskReject(String),

    /// Submit failed or quote stale, surfaced from the execution contract.
    #[error("execution error: {0}")]
    ExecutionExternal(String),

    /// Ring invariant broken. The process terminates with a diagnostic.
    #[error("state corruption: {0}")]
    Corruption(String),
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        AnalysisError::InputInvalid(err.to_string())
    }
}

impl From<GarchError> for AnalysisError {
    fn from(err: GarchError) -> Self {
        AnalysisError::NumericsTransient(err.to_string())
    }
}

impl From<ExecutionError> for AnalysisError {
    fn from(err: ExecutionError) -> Self {
        AnalysisError::ExecutionExternal(err.to_string())
    }
}
