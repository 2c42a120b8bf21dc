//! GARCH(1,1) with Normal innovations.
//!
//! Fits percent log-returns (100 * ln r) by maximum likelihood using
//! projected gradient ascent with a backtracking line search. The iteration
//! cap doubles as the analyzer deadline: a fit either converges inside the
//! budget or reports non-convergence, never partial state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::numerics::rolling::mean;

const MAX_ITERATIONS: usize = 500;
const CONVERGENCE_TOLERANCE: f64 = 1e-9;
const MIN_OMEGA: f64 = 1e-8;
const MAX_PERSISTENCE: f64 = 0.999;
const GRADIENT_STEP: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum GarchError {
    #[error("insufficient data: {got} finite returns < {need}")]
    InsufficientData { got: usize, need: usize },
    #[error("convergence failed after {0} iterations")]
    ConvergenceFailed(usize),
    #[error("non-positive variance in forecast")]
    NonPositiveVariance,
    #[error("numerical instability in likelihood")]
    NumericalInstability,
}

/// Fitted GARCH(1,1) parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GarchParams {
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    pub log_likelihood: f64,
}

impl GarchParams {
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    /// Long-run variance omega / (1 - alpha - beta).
    pub fn unconditional_variance(&self) -> f64 {
        self.omega / (1.0 - self.persistence()).max(1e-9)
    }
}

/// A completed fit: parameters plus the terminal conditional variance and
/// terminal return needed for the 1-step forecast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GarchFit {
    pub params: GarchParams,
    pub last_variance: f64,
    pub last_return: f64,
    pub n_observations: usize,
}

impl GarchFit {
    /// 1-step-ahead conditional variance (percent^2 units).
    pub fn forecast_variance(&self) -> Result<f64, GarchError> {
        let v = self.params.omega
            + self.params.alpha * self.last_return.powi(2)
            + self.params.beta * self.last_variance;
        if v > 0.0 && v.is_finite() {
            Ok(v)
        } else {
            Err(GarchError::NonPositiveVariance)
        }
    }

    /// Annualized volatility as a fraction (not percent), using the
    /// timeframe's bars-per-year scaling.
    pub fn forecast_annualized_vol(&self, bars_per_year: f64) -> Result<f64, GarchError> {
        let var = self.forecast_variance()?;
        Ok((var * bars_per_year).sqrt() / 100.0)
    }
}

/// Per-slot fit cache. Owned by the slot, passed explicitly into the flow
/// analyzer; the kernel itself is stateless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GarchCache {
    pub fit: Option<GarchFit>,
    pub last_fit_at: Option<DateTime<Utc>>,
    pub last_forecast: Option<f64>,
    pub last_forecast_at: Option<DateTime<Utc>>,
}

impl GarchCache {
    /// Whether a refit is due at `now` given the retrain interval.
    pub fn refit_due(&self, now: DateTime<Utc>, retrain_interval_secs: i64) -> bool {
        match self.last_fit_at {
            None => true,
            Some(t) => (now - t).num_seconds() >= retrain_interval_secs,
        }
    }

    pub fn invalidate(&mut self) {
        self.fit = None;
        self.last_forecast = None;
        self.last_forecast_at = None;
    }
}

/// Negative log-likelihood (up to a constant) of a GARCH(1,1) on `returns`.
/// Returns None when the variance recursion degenerates.
fn log_likelihood(returns: &[f64], omega: f64, alpha: f64, beta: f64) -> Option<f64> {
    let sample_var = {
        let m = mean(returns);
        returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / returns.len() as f64
    };
    let mut var = sample_var.max(MIN_OMEGA);
    let mut ll = 0.0;
    for (i, r) in returns.iter().enumerate() {
        if i > 0 {
            var = omega + alpha * returns[i - 1].powi(2) + beta * var;
        }
        if var <= 0.0 || !var.is_finite() {
            return None;
        }
        ll += -0.5 * (var.ln() + r * r / var);
    }
    ll.is_finite().then_some(ll)
}

/// Conditional variance at the end of the sample for given parameters.
fn terminal_variance(returns: &[f64], omega: f64, alpha: f64, beta: f64) -> f64 {
    let sample_var = {
        let m = mean(returns);
        returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / returns.len() as f64
    };
    let mut var = sample_var.max(MIN_OMEGA);
    for i in 1..returns.len() {
        var = omega + alpha * returns[i - 1].powi(2) + beta * var;
    }
    var
}

fn project(params: &mut [f64; 3]) {
    params[0] = params[0].max(MIN_OMEGA);
    params[1] = params[1].clamp(0.0, MAX_PERSISTENCE);
    params[2] = params[2].clamp(0.0, MAX_PERSISTENCE);
    let persistence = params[1] + params[2];
    if persistence > MAX_PERSISTENCE {
        let scale = MAX_PERSISTENCE / persistence;
        params[1] *= scale;
        params[2] *= scale;
    }
}

/// Fit a GARCH(1,1) to percent log-returns.
///
/// `returns_pct` should already be 100 * log-return; NaN entries are
/// filtered out before the count check against `min_data`.
pub fn fit_garch11(returns_pct: &[f64], min_data: usize) -> Result<GarchFit, GarchError> {
    let returns: Vec<f64> = returns_pct.iter().copied().filter(|r| r.is_finite()).collect();
    if returns.len() < min_data {
        return Err(GarchError::InsufficientData { got: returns.len(), need: min_data });
    }

    let sample_var = {
        let m = mean(&returns);
        returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / returns.len() as f64
    };
    if sample_var <= 0.0 || !sample_var.is_finite() {
        return Err(GarchError::NumericalInstability);
    }

    // Standard initialization: modest ARCH, heavy persistence.
    let mut params = [0.05 * sample_var, 0.1, 0.85];
    project(&mut params);
    let mut ll = log_likelihood(&returns, params[0], params[1], params[2])
        .ok_or(GarchError::NumericalInstability)?;

    let mut converged = false;
    for _ in 0..MAX_ITERATIONS {
        // Finite-difference gradient, scaled per-parameter.
        let mut grad = [0.0f64; 3];
        for k in 0..3 {
            let h = GRADIENT_STEP * params[k].abs().max(GRADIENT_STEP);
            let mut bumped = params;
            bumped[k] += h;
            project(&mut bumped);
            let bumped_ll = log_likelihood(&returns, bumped[0], bumped[1], bumped[2]);
            grad[k] = match bumped_ll {
                Some(l) => (l - ll) / h,
                None => 0.0,
            };
        }

        let grad_norm = (grad[0].powi(2) + grad[1].powi(2) + grad[2].powi(2)).sqrt();
        if grad_norm < CONVERGENCE_TOLERANCE {
            converged = true;
            break;
        }

        // Backtracking line search along the normalized gradient.
        let mut step = 0.01;
        let mut improved = false;
        for _ in 0..30 {
            let mut candidate = [
                params[0] + step * grad[0] / grad_norm,
                params[1] + step * grad[1] / grad_norm,
                params[2] + step * grad[2] / grad_norm,
            ];
            project(&mut candidate);
            if let Some(cand_ll) =
                log_likelihood(&returns, candidate[0], candidate[1], candidate[2])
            {
                if cand_ll > ll {
                    if (cand_ll - ll).abs() < CONVERGENCE_TOLERANCE {
                        params = candidate;
                        ll = cand_ll;
                        converged = true;
                    } else {
                        params = candidate;
                        ll = cand_ll;
                    }
                    improved = true;
                    break;
                }
            }
            step *= 0.5;
        }
        if converged {
            break;
        }
        if !improved {
            // No ascent direction left at line-search resolution.
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(GarchError::ConvergenceFailed(MAX_ITERATIONS));
    }

    let fitted = GarchParams {
        omega: params[0],
        alpha: params[1],
        beta: params[2],
        log_likelihood: ll,
    };
    Ok(GarchFit {
        params: fitted,
        last_variance: terminal_variance(&returns, params[0], params[1], params[2]),
        last_return: *returns.last().unwrap_or(&0.0),
        n_observations: returns.len(),
    })
}
