//! Deterministic signal identity.
//!
//! Ids are UUIDs derived from a BLAKE3 hash of (seed, symbol, timeframe,
//! bar timestamp, sequence). Hash-based derivation is independent of thread
//! scheduling, so replaying the same event log with the same seed yields
//! byte-identical ids.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalId(pub Uuid);

impl SignalId {
    /// Derive the id for the `sequence`-th signal of a (symbol, timeframe)
    /// slot at a bar timestamp.
    pub fn derive(
        seed: u64,
        symbol: &str,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        hasher.update(timeframe.as_str().as_bytes());
        hasher.update(&timestamp.timestamp_millis().to_le_bytes());
        hasher.update(&sequence.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[..16]);
        SignalId(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
