//! Orchestrator: routes events through the analyzers, composer and risk
//! evaluator.
//!
//! Slots are created at first observation of a (symbol, timeframe) and
//! guarded by per-slot mutexes: events for one slot serialize, different
//! symbols may evaluate in parallel. The shared risk state is single-writer
//! behind its own lock; the correlation matrix is recomputed on a cadence
//! and installed atomically by pointer swap.

pub mod dispatcher;
pub mod event;
pub mod slot;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::compose::{ComposeContext, ComposeOutcome, Predictor, SignalComposer};
use crate::config::EngineConfig;
use crate::domain::{
    Bar, FillEvent, FillStatus, OpenPosition, PositionSide, SignalId, TickSnapshot, Timeframe,
    TradeSignal,
};
use crate::error::AnalysisError;
use crate::exec::ExecutionClient;
use crate::flow::OrderFlowAnalyzer;
use crate::risk::{CorrelationMatrix, RiskEvaluator, RiskState, Verdict};
use crate::structure::MarketStructureAnalyzer;

pub use dispatcher::Dispatcher;
pub use event::{EngineOutcome, MarketEvent};
pub use slot::{SlotKey, SlotState};

/// Seconds between correlation matrix rebuilds (event time).
const CORRELATION_REFRESH_SECS: i64 = 3600;
/// Per-symbol return history length for correlation estimation.
const CORRELATION_RETURNS: usize = 500;

pub struct Orchestrator {
    config: EngineConfig,
    structure: MarketStructureAnalyzer,
    flow: OrderFlowAnalyzer,
    composer: SignalComposer,
    risk: RiskEvaluator,
    execution: Arc<dyn ExecutionClient>,
    slots: RwLock<HashMap<SlotKey, Arc<Mutex<SlotState>>>>,
    risk_state: Mutex<RiskState>,
    /// Installed atomically; readers clone the Arc and never block writers.
    correlations: RwLock<Arc<CorrelationMatrix>>,
    correlation_returns: Mutex<BTreeMap<String, Vec<f64>>>,
    /// Signals submitted but not yet filled, for fill attribution.
    pending: Mutex<HashMap<SignalId, TradeSignal>>,
}

impl Orchestrator {
    pub fn new(config: EngineConfig, execution: Arc<dyn ExecutionClient>) -> Self {
        let initial_balance = execution
            .account_status()
            .map(|a| a.balance)
            .unwrap_or(0.0);
        Self {
            structure: MarketStructureAnalyzer::new(config.structure.clone()),
            flow: OrderFlowAnalyzer::new(
                config.flow.clone(),
                config.garch.min_data,
                config.garch.retrain_interval,
            ),
            composer: SignalComposer::new(config.composer.clone()),
            risk: RiskEvaluator::new(config.risk.clone()),
            execution,
            slots: RwLock::new(HashMap::new()),
            risk_state: Mutex::new(RiskState::new(initial_balance)),
            correlations: RwLock::new(Arc::new(CorrelationMatrix::default())),
            correlation_returns: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn with_predictor(
        config: EngineConfig,
        execution: Arc<dyn ExecutionClient>,
        predictor: Box<dyn Predictor>,
    ) -> Self {
        let mut engine = Self::new(config, execution);
        engine.composer =
            SignalComposer::with_predictor(engine.config.composer.clone(), predictor);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Route one event.
    pub fn process(&self, event: MarketEvent) -> Vec<EngineOutcome> {
        match event {
            MarketEvent::Bar { symbol, timeframe, bar } => {
                vec![self.on_bar(&symbol, timeframe, bar)]
            }
            MarketEvent::Tick { symbol, tick } => self.on_tick(&symbol, tick),
            MarketEvent::MarketStateChange { symbol, at } => {
                self.on_market_state_change(&symbol, at);
                vec![EngineOutcome::Absorbed]
            }
        }
    }

    /// Replay an ordered event log. Sequential by construction, so the same
    /// log and seed reproduce byte-identical outcomes.
    pub fn replay(&self, events: impl IntoIterator<Item = MarketEvent>) -> Vec<EngineOutcome> {
        events.into_iter().flat_map(|e| self.process(e)).collect()
    }

    /// A completed bar: append, analyze against the frozen snapshot, fuse,
    /// evaluate risk, submit.
    pub fn on_bar(&self, symbol: &str, timeframe: Timeframe, bar: Bar) -> EngineOutcome {
        let slot_arc = self.slot(symbol, timeframe);
        let mut slot = self.lock_slot(&slot_arc, symbol, timeframe);

        let prev_close = slot.series.last().map(|b| b.close);
        if let Err(err) = slot.series.push(bar.clone()) {
            return EngineOutcome::InputRejected {
                symbol: symbol.to_string(),
                timeframe,
                reason: AnalysisError::from(err).to_string(),
            };
        }

        if let Some(prev) = prev_close {
            self.record_return(symbol, bar.log_return_from(prev));
        }
        self.maybe_refresh_correlations(bar.timestamp);

        let bars = slot.series.last_n(self.config.lookback_bars);
        let analysis_time = bar.timestamp;

        let ms = self.structure.analyze(&bars, &mut slot.wyckoff);
        let last_tick = slot.last_tick.clone();
        let of = self.flow.analyze(
            &bars,
            last_tick.as_ref(),
            &mut slot.flow,
            timeframe.bars_per_year(),
            analysis_time,
        );

        let price = last_tick
            .as_ref()
            .filter(|t| t.timestamp >= bar.timestamp)
            .map(|t| t.last_price)
            .unwrap_or(bar.close);

        let ctx = ComposeContext {
            symbol,
            timeframe,
            timestamp: analysis_time,
            price,
            seed: self.config.seed,
            sequence: slot.sequence,
        };

        let signal = match self.composer.compose(&ms, &of, &ctx) {
            ComposeOutcome::Suppressed { reason } => {
                return EngineOutcome::Suppressed {
                    symbol: symbol.to_string(),
                    timeframe,
                    reason,
                }
            }
            ComposeOutcome::Signal(signal) => signal,
        };
        slot.sequence += 1;

        let account = match self.execution.account_status() {
            Ok(account) => account,
            Err(err) => {
                warn!(%err, "account status unavailable");
                return EngineOutcome::Suppressed {
                    symbol: symbol.to_string(),
                    timeframe,
                    reason: format!("execution error: {err}"),
                };
            }
        };

        let correlations = self.correlations.read().expect("correlations lock").clone();
        let verdict = {
            let mut risk_state = self.risk_state.lock().expect("risk state lock");
            self.risk.evaluate(
                &signal,
                &account,
                &mut risk_state,
                &correlations,
                Some(of.thresholds.vol_basis),
                analysis_time,
            )
        };

        match verdict {
            Verdict::Accepted { signal, sizing_method, .. } => {
                if let Err(err) = self.execution.submit(&signal) {
                    warn!(%err, id = %signal.id, "submit failed");
                    return EngineOutcome::Suppressed {
                        symbol: symbol.to_string(),
                        timeframe,
                        reason: AnalysisError::from(err).to_string(),
                    };
                }
                self.pending
                    .lock()
                    .expect("pending lock")
                    .insert(signal.id, signal.clone());
                EngineOutcome::Accepted { signal, sizing_method }
            }
            Verdict::Rejected { reason } => EngineOutcome::Suppressed {
                symbol: symbol.to_string(),
                timeframe,
                reason: AnalysisError::RiskReject(reason).to_string(),
            },
        }
    }

    /// A raw tick: update the symbol's aggregators; any bars it completes
    /// are processed as BAR events.
    pub fn on_tick(&self, symbol: &str, tick: TickSnapshot) -> Vec<EngineOutcome> {
        let mut outcomes = Vec::new();
        for timeframe in self.config.timeframes.clone() {
            let slot_arc = self.slot(symbol, timeframe);
            let completed = {
                let mut slot = self.lock_slot(&slot_arc, symbol, timeframe);
                slot.last_tick = Some(tick.clone());
                slot.aggregator.on_tick(&tick)
            };
            if let Some(bar) = completed {
                outcomes.push(self.on_bar(symbol, timeframe, bar));
            }
        }
        if outcomes.is_empty() {
            outcomes.push(EngineOutcome::Absorbed);
        }
        outcomes
    }

    /// Execution feedback: position lifecycle, inventory and risk updates.
    pub fn on_fill(&self, fill: FillEvent) {
        if fill.status == FillStatus::Rejected {
            warn!(ticket = fill.ticket, symbol = %fill.symbol, "fill rejected by broker");
            self.remove_pending(&fill);
            return;
        }

        // Inventory lives per symbol: apply to every timeframe slot.
        let signed = match fill.side {
            PositionSide::Long => fill.volume,
            PositionSide::Short => -fill.volume,
        };
        for timeframe in self.config.timeframes.clone() {
            let key = SlotKey { symbol: fill.symbol.clone(), timeframe };
            if let Some(slot_arc) = self.slots.read().expect("slots lock").get(&key) {
                let mut slot = self.lock_slot(slot_arc, &fill.symbol, timeframe);
                slot.flow.inventory.apply_fill(signed, fill.timestamp);
            }
        }

        if let Some(pnl) = fill.pnl {
            let mut risk_state = self.risk_state.lock().expect("risk state lock");
            risk_state.open_positions.remove(&fill.symbol);
            self.risk.on_trade_closed(&mut risk_state, &fill.symbol, pnl, fill.timestamp);
        } else {
            let risk_amount = self
                .remove_pending(&fill)
                .map(|s| s.stop_distance() * fill.volume * self.config.risk.pip_value)
                .unwrap_or(0.0);
            let mut risk_state = self.risk_state.lock().expect("risk state lock");
            risk_state.open_positions.insert(
                fill.symbol.clone(),
                OpenPosition {
                    ticket: fill.ticket,
                    symbol: fill.symbol.clone(),
                    side: fill.side,
                    volume: fill.volume,
                    entry_price: fill.price,
                    risk_amount,
                    opened_at: fill.timestamp,
                },
            );
        }
    }

    /// Force adaptive thresholds stale for every slot of `symbol`.
    fn on_market_state_change(&self, symbol: &str, _at: DateTime<Utc>) {
        let slots = self.slots.read().expect("slots lock");
        for (key, slot_arc) in slots.iter() {
            if key.symbol == symbol {
                let mut slot = self.lock_slot(slot_arc, symbol, key.timeframe);
                slot.flow.thresholds.last_update = None;
            }
        }
    }

    /// Preload histories into their slots without evaluating, parallel
    /// across slots. Analyzer state stays cold; the first live event after
    /// warm-up sees a full ring. Invalid bars are skipped with a count.
    pub fn warm_up(&self, histories: Vec<(String, Timeframe, Vec<Bar>)>) -> usize {
        use rayon::prelude::*;
        histories
            .into_par_iter()
            .map(|(symbol, timeframe, bars)| {
                let slot_arc = self.slot(&symbol, timeframe);
                let mut slot = self.lock_slot(&slot_arc, &symbol, timeframe);
                let mut skipped = 0usize;
                for bar in bars {
                    if slot.series.push(bar).is_err() {
                        skipped += 1;
                    }
                }
                if skipped > 0 {
                    warn!(symbol = %symbol, %timeframe, skipped, "bars skipped during warm-up");
                }
                skipped
            })
            .sum()
    }

    /// Current risk-state snapshot values for reporting.
    pub fn risk_summary(&self) -> (f64, f64, f64) {
        let state = self.risk_state.lock().expect("risk state lock");
        (state.current_balance, state.equity, state.drawdown())
    }

    /// Acquire a slot guard. A poisoned mutex means an evaluation panicked
    /// mid-update and the slot can no longer be trusted: corruption is
    /// fatal by contract, terminating with a diagnostic snapshot of the
    /// slot's last known state.
    fn lock_slot<'a>(
        &self,
        slot_arc: &'a Arc<Mutex<SlotState>>,
        symbol: &str,
        timeframe: Timeframe,
    ) -> std::sync::MutexGuard<'a, SlotState> {
        match slot_arc.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let slot = poisoned.into_inner();
                error!(
                    symbol,
                    %timeframe,
                    bars = slot.series.len(),
                    last_bar = ?slot.series.last_timestamp(),
                    sequence = slot.sequence,
                    "slot mutex poisoned"
                );
                let diagnostic = AnalysisError::Corruption(format!(
                    "slot {symbol}/{timeframe} mutex poisoned; bars={}, last_bar={:?}, sequence={}",
                    slot.series.len(),
                    slot.series.last_timestamp(),
                    slot.sequence
                ));
                panic!("{diagnostic}");
            }
        }
    }

    fn slot(&self, symbol: &str, timeframe: Timeframe) -> Arc<Mutex<SlotState>> {
        let key = SlotKey { symbol: symbol.to_string(), timeframe };
        if let Some(slot) = self.slots.read().expect("slots lock").get(&key) {
            return slot.clone();
        }
        let mut slots = self.slots.write().expect("slots lock");
        slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(SlotState::new(&self.config, timeframe))))
            .clone()
    }

    fn record_return(&self, symbol: &str, log_return: f64) {
        if !log_return.is_finite() {
            return;
        }
        let mut returns = self.correlation_returns.lock().expect("returns lock");
        let series = returns.entry(symbol.to_string()).or_default();
        series.push(log_return);
        if series.len() > CORRELATION_RETURNS {
            let excess = series.len() - CORRELATION_RETURNS;
            series.drain(..excess);
        }
    }

    /// Rebuild and atomically install the correlation matrix on a cadence.
    fn maybe_refresh_correlations(&self, now: DateTime<Utc>) {
        let due = {
            let current = self.correlations.read().expect("correlations lock");
            match current.last_update {
                None => true,
                Some(t) => (now - t).num_seconds() >= CORRELATION_REFRESH_SECS,
            }
        };
        if !due {
            return;
        }
        let snapshot = self.correlation_returns.lock().expect("returns lock").clone();
        if snapshot.len() < 2 {
            // still stamp the attempt so we do not recompute every bar
            let mut slot = self.correlations.write().expect("correlations lock");
            let mut matrix = CorrelationMatrix::default();
            matrix.last_update = Some(now);
            *slot = Arc::new(matrix);
            return;
        }
        let matrix = Arc::new(CorrelationMatrix::compute(&snapshot, now));
        *self.correlations.write().expect("correlations lock") = matrix;
    }

    fn remove_pending(&self, fill: &FillEvent) -> Option<TradeSignal> {
        let id = fill.signal_id?;
        self.pending.lock().expect("pending lock").remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::RecordingClient;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
    }

    fn bar_at(i: i64, close: f64) -> Bar {
        let ts = base_time() + Duration::minutes(5 * i);
        let open = close - 0.0002;
        Bar::new(ts, open, close + 0.0005, open - 0.0005, close, 1000.0)
    }

    fn engine() -> (Arc<Orchestrator>, Arc<RecordingClient>) {
        let execution = Arc::new(RecordingClient::new(100_000.0));
        let mut config = EngineConfig::default();
        config.timeframes = vec![Timeframe::M5];
        (Arc::new(Orchestrator::new(config, execution.clone())), execution)
    }

    #[test]
    fn rejects_non_monotonic_bar() {
        let (engine, _) = engine();
        let b1 = bar_at(1, 1.0850);
        let b0 = bar_at(0, 1.0849);
        assert!(matches!(
            engine.on_bar("EURUSD", Timeframe::M5, b1),
            EngineOutcome::Suppressed { .. }
        ));
        assert!(matches!(
            engine.on_bar("EURUSD", Timeframe::M5, b0),
            EngineOutcome::InputRejected { .. }
        ));
    }

    #[test]
    fn warmup_bars_are_suppressed_with_reason() {
        let (engine, _) = engine();
        let outcome = engine.on_bar("EURUSD", Timeframe::M5, bar_at(0, 1.0850));
        match outcome {
            EngineOutcome::Suppressed { reason, .. } => {
                assert!(reason.contains("invalid"), "reason: {reason}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn ticks_aggregate_into_bars() {
        let (engine, _) = engine();
        let t0 = base_time();
        let tick = |secs: i64, price: f64| TickSnapshot::new(
            t0 + Duration::seconds(secs),
            price,
            price - 0.0001,
            price + 0.0001,
            10.0,
        );
        // ticks inside the first 5-minute bar
        assert!(matches!(
            engine.on_tick("EURUSD", tick(0, 1.0850)).as_slice(),
            [EngineOutcome::Absorbed]
        ));
        assert!(matches!(
            engine.on_tick("EURUSD", tick(200, 1.0852)).as_slice(),
            [EngineOutcome::Absorbed]
        ));
        // crossing the boundary completes one bar (which is then evaluated)
        let outcomes = engine.on_tick("EURUSD", tick(305, 1.0853));
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            EngineOutcome::Suppressed { .. } | EngineOutcome::InputRejected { .. }
        ));
    }

    #[test]
    fn replay_is_deterministic() {
        let events: Vec<MarketEvent> = (0..80)
            .map(|i| MarketEvent::Bar {
                symbol: "EURUSD".into(),
                timeframe: Timeframe::M5,
                bar: bar_at(i, 1.0850 + 0.0001 * i as f64),
            })
            .collect();

        let (engine_a, _) = engine();
        let (engine_b, _) = engine();
        let a = engine_a.replay(events.clone());
        let b = engine_b.replay(events);
        let a_json = serde_json::to_string(&a).unwrap();
        let b_json = serde_json::to_string(&b).unwrap();
        assert_eq!(a_json, b_json);
    }

    #[test]
    fn fill_updates_inventory_and_positions() {
        let (engine, _) = engine();
        // create the slot first
        engine.on_bar("EURUSD", Timeframe::M5, bar_at(0, 1.0850));
        engine.on_fill(FillEvent {
            ticket: 42,
            signal_id: None,
            symbol: "EURUSD".into(),
            side: PositionSide::Long,
            volume: 0.5,
            price: 1.0850,
            pnl: None,
            status: FillStatus::Filled,
            timestamp: base_time(),
        });
        {
            let state = engine.risk_state.lock().unwrap();
            assert!(state.open_positions.contains_key("EURUSD"));
        }

        // closing fill with pnl removes the position and books the trade
        engine.on_fill(FillEvent {
            ticket: 42,
            signal_id: None,
            symbol: "EURUSD".into(),
            side: PositionSide::Short,
            volume: 0.5,
            price: 1.0860,
            pnl: Some(500.0),
            status: FillStatus::Filled,
            timestamp: base_time() + Duration::hours(1),
        });
        let state = engine.risk_state.lock().unwrap();
        assert!(!state.open_positions.contains_key("EURUSD"));
        assert_eq!(state.closed_trade_count(), 1);
    }

    #[test]
    fn risk_rejections_carry_the_taxonomy_prefix() {
        // a broke account fails the minimum-volume gate once a signal
        // composes; permissive thresholds make one compose quickly
        let mut config = EngineConfig::default();
        config.timeframes = vec![Timeframe::M5];
        config.composer.buy_threshold = 0.0;
        config.composer.sell_threshold = 0.0;
        let engine = Orchestrator::new(config, Arc::new(RecordingClient::new(100.0)));

        let mut saw_risk_reject = false;
        for i in 0..120 {
            let outcome =
                engine.on_bar("EURUSD", Timeframe::M5, bar_at(i, 1.0850 + 0.0001 * i as f64));
            if let EngineOutcome::Suppressed { reason, .. } = &outcome {
                if reason.starts_with("risk rejected:") {
                    saw_risk_reject = true;
                    break;
                }
            }
        }
        assert!(saw_risk_reject, "expected a risk-gate suppression");
    }

    #[test]
    fn poisoned_slot_is_fatal_with_diagnostic() {
        let (engine, _) = engine();
        engine.on_bar("EURUSD", Timeframe::M5, bar_at(0, 1.0850));

        // poison the slot mutex by panicking while holding it
        let key = SlotKey { symbol: "EURUSD".into(), timeframe: Timeframe::M5 };
        let slot_arc = engine.slots.read().unwrap().get(&key).unwrap().clone();
        let _ = std::thread::spawn(move || {
            let _guard = slot_arc.lock().unwrap();
            panic!("simulated evaluation panic");
        })
        .join();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            engine.on_bar("EURUSD", Timeframe::M5, bar_at(1, 1.0851));
        }));
        let payload = result.expect_err("poisoned slot must be fatal");
        let message = payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default();
        assert!(message.contains("state corruption"), "message: {message}");
        assert!(message.contains("EURUSD/5min"), "message: {message}");
        assert!(message.contains("bars=1"), "message: {message}");
    }

    #[test]
    fn warm_up_fills_rings_without_evaluating() {
        let (engine, execution) = engine();
        let bars: Vec<Bar> = (0..60).map(|i| bar_at(i, 1.0850 + 0.0001 * i as f64)).collect();
        let skipped = engine.warm_up(vec![
            ("EURUSD".to_string(), Timeframe::M5, bars.clone()),
            ("GBPUSD".to_string(), Timeframe::M5, bars),
        ]);
        assert_eq!(skipped, 0);
        assert!(execution.submissions().is_empty());

        let key = SlotKey { symbol: "EURUSD".into(), timeframe: Timeframe::M5 };
        let slots = engine.slots.read().unwrap();
        let slot = slots.get(&key).unwrap().lock().unwrap();
        assert_eq!(slot.series.len(), 60);
        assert_eq!(slot.sequence, 0);
    }

    #[test]
    fn market_state_change_marks_thresholds_stale() {
        let (engine, _) = engine();
        engine.on_bar("EURUSD", Timeframe::M5, bar_at(0, 1.0850));
        // force a refresh timestamp in, then invalidate
        let outcomes = engine.process(MarketEvent::MarketStateChange {
            symbol: "EURUSD".into(),
            at: base_time(),
        });
        assert!(matches!(outcomes.as_slice(), [EngineOutcome::Absorbed]));
        let key = SlotKey { symbol: "EURUSD".into(), timeframe: Timeframe::M5 };
        let slots = engine.slots.read().unwrap();
        let slot = slots.get(&key).unwrap().lock().unwrap();
        assert!(slot.flow.thresholds.last_update.is_none());
    }
}
