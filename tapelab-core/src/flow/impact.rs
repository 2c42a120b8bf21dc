//! Market-impact history: bounded rings of recent volumes and relative
//! spreads, condensed into intensity, liquidity and institutional
//! participation reads.

use serde::{Deserialize, Serialize};

use crate::numerics::rolling::{mean, std_dev};
use crate::store::ring::BoundedRing;

const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketImpactState {
    volumes: BoundedRing<f64>,
    spreads: BoundedRing<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ImpactRead {
    /// Current volume rate vs. its mean, clamped to [0, 1] around 1x-3x.
    pub intensity: f64,
    /// Tightness of the current spread vs. its history, [0, 1].
    pub liquidity: f64,
    /// Fraction of recent volumes more than two deviations above mean.
    pub institutional: f64,
}

impl Default for MarketImpactState {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MarketImpactState {
    pub fn new(capacity: usize) -> Self {
        Self {
            volumes: BoundedRing::new(capacity),
            spreads: BoundedRing::new(capacity),
        }
    }

    pub fn record(&mut self, volume: f64, relative_spread: f64) {
        if volume.is_finite() && volume >= 0.0 {
            self.volumes.push(volume);
        }
        if relative_spread.is_finite() && relative_spread >= 0.0 {
            self.spreads.push(relative_spread);
        }
    }

    pub fn observations(&self) -> usize {
        self.volumes.len()
    }

    /// Condense the rings into the three flow components.
    pub fn read(&self) -> ImpactRead {
        let volumes: Vec<f64> = self.volumes.iter().copied().collect();
        let spreads: Vec<f64> = self.spreads.iter().copied().collect();
        if volumes.len() < 5 {
            return ImpactRead::default();
        }

        let vol_mean = mean(&volumes);
        let vol_std = std_dev(&volumes);
        let last_volume = *volumes.last().unwrap_or(&0.0);

        // 1x average maps to 0, 3x or more to 1.
        let intensity = if vol_mean > 0.0 {
            ((last_volume / vol_mean - 1.0) / 2.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let institutional = if vol_std > 0.0 {
            let threshold = vol_mean + 2.0 * vol_std;
            let recent = &volumes[volumes.len().saturating_sub(20)..];
            recent.iter().filter(|v| **v > threshold).count() as f64 / recent.len() as f64
        } else {
            0.0
        };

        let liquidity = if spreads.len() >= 5 {
            let spread_mean = mean(&spreads);
            let last_spread = *spreads.last().unwrap_or(&0.0);
            if spread_mean > 0.0 {
                // tighter than average -> closer to 1
                (1.0 - (last_spread / spread_mean - 1.0)).clamp(0.0, 1.0)
            } else {
                0.5
            }
        } else {
            0.5
        };

        ImpactRead { intensity, liquidity, institutional }
    }
}
