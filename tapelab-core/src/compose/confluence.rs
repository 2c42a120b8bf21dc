//! Graph-confluence decision mode.
//!
//! Structured facts from both analyzers become nodes of a small weighted
//! digraph; edges encode which facts reinforce each other. The decision is
//! the strongest simple path's sign and magnitude: magnitude is the mean
//! node conviction along the path discounted by the edge weights, sign is
//! the vote of the path's node signs.

use serde::{Deserialize, Serialize};

use crate::flow::FlowSnapshot;
use crate::structure::StructureSnapshot;

/// One structured fact: a signed conviction in [-1, 1].
#[derive(Debug, Clone, Serialize)]
pub struct FactNode {
    pub name: &'static str,
    /// Signed conviction: sign is direction, magnitude is strength.
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactEdge {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfluenceGraph {
    pub nodes: Vec<FactNode>,
    pub edges: Vec<FactEdge>,
}

/// Result of evaluating the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PathDecision {
    /// +1 bullish, -1 bearish, 0 no path.
    pub sign: i8,
    /// Path magnitude in [0, 1].
    pub magnitude: f64,
}

impl ConfluenceGraph {
    /// Build the default fact graph from the two snapshots.
    pub fn from_snapshots(ms: &StructureSnapshot, of: &FlowSnapshot) -> Self {
        let mut nodes = Vec::new();
        let mut push = |name: &'static str, value: f64| -> usize {
            nodes.push(FactNode { name, value: value.clamp(-1.0, 1.0) });
            nodes.len() - 1
        };

        let trend = push("trend", ms.direction.sign() as f64 * (ms.structure_score / 10.0));
        let wyckoff = push(
            "wyckoff",
            ms.wyckoff_phase.bias() as f64 * ms.wyckoff_confidence,
        );
        let zone = push(
            "zone_context",
            if ms.price_in_demand_zone {
                1.0
            } else if ms.price_in_supply_zone {
                -1.0
            } else {
                0.0
            },
        );
        let delta = push(
            "delta",
            of.delta.direction as f64 * (0.5 * of.delta.consistency + 0.5 * of.delta.strength),
        );
        let imbalance = push(
            "imbalance",
            if of.imbalance_significant { of.bid_ask_imbalance } else { 0.0 },
        );
        let absorption = push(
            "absorption",
            of.absorption.map(|a| a.direction as f64).unwrap_or(0.0),
        );
        let vsa = push(
            "vsa",
            of.vsa.map(|v| v.signal.bias() as f64 * v.confidence).unwrap_or(0.0),
        );

        // Structure chain, flow chain, and the cross links that make a
        // confluence: structure context feeding flow confirmation.
        let edges = vec![
            FactEdge { from: trend, to: wyckoff, weight: 0.9 },
            FactEdge { from: wyckoff, to: zone, weight: 0.8 },
            FactEdge { from: delta, to: imbalance, weight: 0.9 },
            FactEdge { from: imbalance, to: absorption, weight: 0.7 },
            FactEdge { from: absorption, to: vsa, weight: 0.7 },
            FactEdge { from: trend, to: delta, weight: 1.0 },
            FactEdge { from: zone, to: delta, weight: 0.8 },
            FactEdge { from: wyckoff, to: vsa, weight: 0.6 },
        ];

        Self { nodes, edges }
    }

    /// Evaluate every simple path and return the strongest.
    pub fn strongest_path(&self) -> PathDecision {
        let mut best = PathDecision { sign: 0, magnitude: 0.0 };
        for start in 0..self.nodes.len() {
            let mut visited = vec![false; self.nodes.len()];
            visited[start] = true;
            self.walk(start, &mut visited, &mut vec![start], 1.0, &mut best);
        }
        best
    }

    fn walk(
        &self,
        node: usize,
        visited: &mut Vec<bool>,
        path: &mut Vec<usize>,
        edge_discount: f64,
        best: &mut PathDecision,
    ) {
        self.score_path(path, edge_discount, best);
        for edge in self.edges.iter().filter(|e| e.from == node) {
            if visited[edge.to] {
                continue;
            }
            visited[edge.to] = true;
            path.push(edge.to);
            self.walk(edge.to, visited, path, edge_discount * edge.weight, best);
            path.pop();
            visited[edge.to] = false;
        }
    }

    fn score_path(&self, path: &[usize], edge_discount: f64, best: &mut PathDecision) {
        // Single facts are not a confluence.
        if path.len() < 2 {
            return;
        }
        let values: Vec<f64> = path.iter().map(|&i| self.nodes[i].value).collect();
        let sum: f64 = values.iter().sum();
        let sign = if sum > 0.0 {
            1
        } else if sum < 0.0 {
            -1
        } else {
            0
        };
        if sign == 0 {
            return;
        }
        // Facts pointing against the path direction dilute it.
        let aligned: f64 = values
            .iter()
            .map(|v| if (*v > 0.0) == (sign > 0) { v.abs() } else { -v.abs() })
            .sum();
        let magnitude = (aligned / path.len() as f64).max(0.0) * edge_discount;
        if magnitude > best.magnitude {
            *best = PathDecision { sign, magnitude: magnitude.clamp(0.0, 1.0) };
        }
    }
}
