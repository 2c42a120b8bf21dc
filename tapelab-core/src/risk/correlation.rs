//! Cross-symbol correlation: matrix, exposure budgeting and parametric VaR.
//!
//! The matrix is recomputed off the hot path and installed atomically by the
//! orchestrator (pointer swap); readers only ever see a complete matrix.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::OpenPosition;
use crate::numerics::rolling::mean;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    /// Row-major correlation values, indexed like `symbols`.
    pub values: Vec<Vec<f64>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl CorrelationMatrix {
    /// Pearson correlations from aligned return series. Series shorter than
    /// 2 points or with zero variance correlate at 0 with everything.
    pub fn compute(returns: &BTreeMap<String, Vec<f64>>, at: DateTime<Utc>) -> Self {
        let symbols: Vec<String> = returns.keys().cloned().collect();
        let n = symbols.len();
        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            values[i][i] = 1.0;
            for j in (i + 1)..n {
                let rho = pearson(&returns[&symbols[i]], &returns[&symbols[j]]);
                values[i][j] = rho;
                values[j][i] = rho;
            }
        }
        Self { symbols, values, last_update: Some(at) }
    }

    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let ia = self.symbols.iter().position(|s| s == a);
        let ib = self.symbols.iter().position(|s| s == b);
        match (ia, ib) {
            (Some(i), Some(j)) => self.values[i][j],
            _ => 0.0,
        }
    }

    /// Correlation-weighted exposure of `symbol` against the open book,
    /// normalized by balance: sum over positions of |rho| * risk / balance.
    pub fn exposure(
        &self,
        symbol: &str,
        open_positions: &std::collections::HashMap<String, OpenPosition>,
        balance: f64,
    ) -> f64 {
        if balance <= 0.0 {
            return 0.0;
        }
        open_positions
            .values()
            .map(|p| {
                let rho = if p.symbol == symbol { 1.0 } else { self.correlation(symbol, &p.symbol) };
                rho.abs() * p.risk_amount / balance
            })
            .sum()
    }

    /// Parametric 1-day portfolio VaR over the open positions' risk
    /// budgets: z * sqrt(r' P r).
    pub fn portfolio_var(
        &self,
        open_positions: &std::collections::HashMap<String, OpenPosition>,
        confidence: f64,
    ) -> f64 {
        let positions: Vec<&OpenPosition> = open_positions.values().collect();
        let mut quad = 0.0;
        for a in &positions {
            for b in &positions {
                let rho =
                    if a.symbol == b.symbol { 1.0 } else { self.correlation(&a.symbol, &b.symbol) };
                quad += a.risk_amount * b.risk_amount * rho;
            }
        }
        z_score(confidence) * quad.max(0.0).sqrt()
    }
}

/// Exposure to a sizing factor: max(0.1, 1 - exposure / max_exposure).
pub fn correlation_factor(exposure: f64, max_exposure: f64) -> f64 {
    if max_exposure <= 0.0 {
        return 0.1;
    }
    (1.0 - exposure / max_exposure).max(0.1)
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let ma = mean(a);
    let mb = mean(b);
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for i in 0..n {
        let da = a[i] - ma;
        let db = b[i] - mb;
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    if va <= 0.0 || vb <= 0.0 {
        return 0.0;
    }
    (cov / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0)
}

/// Standard normal quantile for the usual VaR confidence levels,
/// interpolated between table points.
fn z_score(confidence: f64) -> f64 {
    const TABLE: [(f64, f64); 5] = [
        (0.90, 1.282),
        (0.95, 1.645),
        (0.975, 1.960),
        (0.99, 2.326),
        (0.995, 2.576),
    ];
    let c = confidence.clamp(TABLE[0].0, TABLE[TABLE.len() - 1].0);
    for w in TABLE.windows(2) {
        if c >= w[0].0 && c <= w[1].0 {
            let t = (c - w[0].0) / (w[1].0 - w[0].0);
            return w[0].1 + t * (w[1].1 - w[0].1);
        }
    }
    TABLE[TABLE.len() - 1].1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionSide;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
    }

    fn position(symbol: &str, risk: f64) -> OpenPosition {
        OpenPosition {
            ticket: 1,
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            volume: 1.0,
            entry_price: 1.0,
            risk_amount: risk,
            opened_at: now(),
        }
    }

    #[test]
    fn perfectly_correlated_series() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), vec![0.01, -0.02, 0.03, 0.01]);
        returns.insert("B".to_string(), vec![0.02, -0.04, 0.06, 0.02]);
        let m = CorrelationMatrix::compute(&returns, now());
        assert!((m.correlation("A", "B") - 1.0).abs() < 1e-9);
        assert_eq!(m.correlation("A", "A"), 1.0);
    }

    #[test]
    fn anti_correlated_series() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), vec![0.01, -0.02, 0.03]);
        returns.insert("B".to_string(), vec![-0.01, 0.02, -0.03]);
        let m = CorrelationMatrix::compute(&returns, now());
        assert!((m.correlation("A", "B") + 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_symbol_is_uncorrelated() {
        let m = CorrelationMatrix::default();
        assert_eq!(m.correlation("A", "B"), 0.0);
    }

    #[test]
    fn exposure_sums_correlated_risk() {
        let mut returns = BTreeMap::new();
        returns.insert("A".to_string(), vec![0.01, -0.02, 0.03, 0.01]);
        returns.insert("B".to_string(), vec![0.02, -0.04, 0.06, 0.02]);
        let m = CorrelationMatrix::compute(&returns, now());
        let mut open = HashMap::new();
        open.insert("B".to_string(), position("B", 1_000.0));
        // |rho|=1, risk 1000 on a 100k balance -> exposure 0.01
        let exposure = m.exposure("A", &open, 100_000.0);
        assert!((exposure - 0.01).abs() < 1e-9);
    }

    #[test]
    fn correlation_factor_floors_at_tenth() {
        assert!((correlation_factor(0.0, 2.0) - 1.0).abs() < 1e-12);
        assert!((correlation_factor(1.0, 2.0) - 0.5).abs() < 1e-12);
        assert_eq!(correlation_factor(10.0, 2.0), 0.1);
    }

    #[test]
    fn var_scales_with_confidence() {
        let m = CorrelationMatrix::default();
        let mut open = HashMap::new();
        open.insert("A".to_string(), position("A", 1_000.0));
        let var95 = m.portfolio_var(&open, 0.95);
        let var99 = m.portfolio_var(&open, 0.99);
        assert!((var95 - 1_645.0).abs() < 1.0);
        assert!(var99 > var95);
    }

    #[test]
    fn uncorrelated_var_diversifies() {
        let m = CorrelationMatrix::default(); // unknown symbols -> rho 0
        let mut open = HashMap::new();
        open.insert("A".to_string(), position("A", 1_000.0));
        open.insert("B".to_string(), position("B", 1_000.0));
        let var = m.portfolio_var(&open, 0.99);
        // sqrt(1000^2 + 1000^2) * 2.326 ≈ 3289, less than the 4652 sum
        assert!(var < 2.0 * 2.326 * 1_000.0);
        assert!((var - 2.326 * (2.0f64).sqrt() * 1_000.0).abs() < 1.0);
    }
}
