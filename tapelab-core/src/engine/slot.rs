//! Per-(symbol, timeframe) slot: the single-writer home of all mutable
//! analysis state listed in the data model.

use crate::config::EngineConfig;
use crate::domain::{TickSnapshot, Timeframe};
use crate::flow::FlowSlotState;
use crate::store::{BarSeries, TickAggregator};
use crate::structure::WyckoffState;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

/// All mutable state owned by one slot. Guarded by a per-slot mutex in the
/// orchestrator: at most one evaluation runs against it at a time.
#[derive(Debug)]
pub struct SlotState {
    pub series: BarSeries,
    pub aggregator: TickAggregator,
    pub flow: FlowSlotState,
    pub wyckoff: WyckoffState,
    pub last_tick: Option<TickSnapshot>,
    /// Monotonic per-slot signal counter for deterministic id derivation.
    pub sequence: u64,
}

impl SlotState {
    pub fn new(config: &EngineConfig, timeframe: Timeframe) -> Self {
        Self {
            series: BarSeries::new(config.lookback_bars),
            aggregator: TickAggregator::new(timeframe),
            flow: FlowSlotState::new(&config.flow, config.delta_history),
            wyckoff: WyckoffState::default(),
            last_tick: None,
            sequence: 0,
        }
    }
}
