//! Supply/demand zone detection.
//!
//! Significant pivots (prominence >= factor * ATR) are clustered by price
//! with a density rule (neighbors within eps = factor * ATR, at least two
//! members), overlapping clusters merge into zones, and a zone dies once a
//! close passes beyond its far edge by the invalidation distance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::numerics::peaks::{find_peaks, find_troughs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Supply,
    Demand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    pub price_low: f64,
    pub price_high: f64,
    /// Number of pivots backing the zone.
    pub strength: usize,
    pub last_touch: DateTime<Utc>,
    pub invalidated: bool,
}

impl Zone {
    pub fn contains(&self, price: f64) -> bool {
        !self.invalidated && price >= self.price_low && price <= self.price_high
    }

    pub fn midpoint(&self) -> f64 {
        (self.price_low + self.price_high) / 2.0
    }
}

/// Ordered zone lists for one slot: supply ascending by price, demand
/// descending (nearest-first relative to price below/above).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSet {
    pub supply: Vec<Zone>,
    pub demand: Vec<Zone>,
}

impl ZoneSet {
    /// Nearest live supply zone at or above `price`.
    pub fn nearest_supply(&self, price: f64) -> Option<&Zone> {
        self.supply
            .iter()
            .filter(|z| !z.invalidated && z.price_high >= price)
            .min_by(|a, b| {
                let da = (a.price_low - price).abs();
                let db = (b.price_low - price).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Nearest live demand zone at or below `price`.
    pub fn nearest_demand(&self, price: f64) -> Option<&Zone> {
        self.demand
            .iter()
            .filter(|z| !z.invalidated && z.price_low <= price)
            .min_by(|a, b| {
                let da = (a.price_high - price).abs();
                let db = (b.price_high - price).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn price_in_supply(&self, price: f64) -> bool {
        self.supply.iter().any(|z| z.contains(price))
    }

    pub fn price_in_demand(&self, price: f64) -> bool {
        self.demand.iter().any(|z| z.contains(price))
    }
}

/// One pivot extracted from the bar series.
#[derive(Debug, Clone, Copy)]
struct Pivot {
    index: usize,
    price: f64,
}

/// Cluster sorted pivot prices by density: neighbors within `eps` chain into
/// one cluster; clusters below `min_samples` members are discarded.
fn cluster(mut pivots: Vec<Pivot>, eps: f64, min_samples: usize) -> Vec<Vec<Pivot>> {
    pivots.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    let mut clusters: Vec<Vec<Pivot>> = Vec::new();
    for pivot in pivots {
        let chains = clusters
            .last()
            .and_then(|c| c.last())
            .map(|p| pivot.price - p.price <= eps)
            .unwrap_or(false);
        if chains {
            clusters.last_mut().expect("chained cluster").push(pivot);
        } else {
            clusters.push(vec![pivot]);
        }
    }
    clusters.retain(|c| c.len() >= min_samples);
    clusters
}

/// Merge clusters whose [min, max] price ranges overlap.
fn merge_overlapping(ranges: Vec<Vec<Pivot>>) -> Vec<Vec<Pivot>> {
    // already sorted ascending by construction
    let mut merged: Vec<Vec<Pivot>> = Vec::new();
    for cluster in ranges {
        let lo = cluster.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
        let overlaps = merged
            .last()
            .map(|prev| {
                let prev_hi = prev.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);
                lo <= prev_hi
            })
            .unwrap_or(false);
        if overlaps {
            merged.last_mut().expect("overlapping cluster").extend(cluster);
        } else {
            merged.push(cluster);
        }
    }
    merged
}

/// Detect supply and demand zones from the bar snapshot.
///
/// `atr` scales both the pivot prominence requirement and the clustering
/// epsilon; `invalidation_atr_factor` scales how far a close must travel
/// beyond the far edge before the zone is flagged invalidated.
pub fn detect_zones(
    bars: &[Bar],
    atr: f64,
    prominence_atr_factor: f64,
    cluster_eps_atr_factor: f64,
    invalidation_atr_factor: f64,
) -> ZoneSet {
    if bars.len() < 5 || atr <= 0.0 {
        return ZoneSet::default();
    }

    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let prominence = prominence_atr_factor * atr;
    let eps = cluster_eps_atr_factor * atr;

    let supply_pivots: Vec<Pivot> = find_peaks(&highs, prominence)
        .into_iter()
        .map(|p| Pivot { index: p.index, price: p.value })
        .collect();
    let demand_pivots: Vec<Pivot> = find_troughs(&lows, prominence)
        .into_iter()
        .map(|p| Pivot { index: p.index, price: p.value })
        .collect();

    let build = |clusters: Vec<Vec<Pivot>>, kind: ZoneKind| -> Vec<Zone> {
        clusters
            .into_iter()
            .map(|members| {
                let price_low = members.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
                let price_high =
                    members.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);
                let last_index = members.iter().map(|p| p.index).max().unwrap_or(0);
                let invalidation = invalidation_atr_factor * atr;
                // A later close beyond the far edge kills the zone.
                let invalidated = bars.iter().skip(last_index + 1).any(|b| match kind {
                    ZoneKind::Supply => b.close > price_high + invalidation,
                    ZoneKind::Demand => b.close < price_low - invalidation,
                });
                Zone {
                    kind,
                    price_low,
                    price_high,
                    strength: members.len(),
                    last_touch: bars[last_index].timestamp,
                    invalidated,
                }
            })
            .collect()
    };

    let mut supply = build(
        merge_overlapping(cluster(supply_pivots, eps, 2)),
        ZoneKind::Supply,
    );
    let mut demand = build(
        merge_overlapping(cluster(demand_pivots, eps, 2)),
        ZoneKind::Demand,
    );
    supply.sort_by(|a, b| a.price_low.partial_cmp(&b.price_low).unwrap_or(std::cmp::Ordering::Equal));
    demand.sort_by(|a, b| b.price_high.partial_cmp(&a.price_high).unwrap_or(std::cmp::Ordering::Equal));

    ZoneSet { supply, demand }
}
