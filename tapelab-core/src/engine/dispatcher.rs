//! Live event dispatch across worker threads.
//!
//! Events are partitioned by symbol hash so each symbol always lands on the
//! same worker: per-symbol ordering is preserved while distinct symbols
//! evaluate in parallel. Workers communicate over `mpsc` channels and shut
//! down on command, never mid-event.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::debug;

use crate::engine::{EngineOutcome, MarketEvent, Orchestrator};

enum WorkerCommand {
    Event(MarketEvent),
    Shutdown,
}

pub struct Dispatcher {
    workers: Vec<Worker>,
    outcomes: Receiver<EngineOutcome>,
}

struct Worker {
    tx: Sender<WorkerCommand>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn `num_workers` threads over a shared engine.
    pub fn spawn(engine: Arc<Orchestrator>, num_workers: usize) -> Self {
        let num_workers = num_workers.max(1);
        let (outcome_tx, outcomes) = channel();
        let workers = (0..num_workers)
            .map(|index| {
                let engine = engine.clone();
                let outcome_tx = outcome_tx.clone();
                let (tx, rx) = channel::<WorkerCommand>();
                let handle = std::thread::Builder::new()
                    .name(format!("tapelab-worker-{index}"))
                    .spawn(move || worker_loop(engine, rx, outcome_tx))
                    .expect("failed to spawn engine worker");
                Worker { tx, handle }
            })
            .collect();
        Self { workers, outcomes }
    }

    /// Route an event to its symbol's worker.
    pub fn dispatch(&self, event: MarketEvent) {
        let index = symbol_worker(event.symbol(), self.workers.len());
        // A closed channel means the worker is gone; the event is dropped
        // deliberately rather than re-routed (re-routing would break
        // per-symbol ordering).
        let _ = self.workers[index].tx.send(WorkerCommand::Event(event));
    }

    /// Drain outcomes produced so far without blocking.
    pub fn poll_outcomes(&self) -> Vec<EngineOutcome> {
        self.outcomes.try_iter().collect()
    }

    /// Stop all workers and join them.
    pub fn shutdown(self) -> Vec<EngineOutcome> {
        for worker in &self.workers {
            let _ = worker.tx.send(WorkerCommand::Shutdown);
        }
        for worker in self.workers {
            let _ = worker.handle.join();
        }
        self.outcomes.try_iter().collect()
    }
}

fn worker_loop(
    engine: Arc<Orchestrator>,
    rx: Receiver<WorkerCommand>,
    outcome_tx: Sender<EngineOutcome>,
) {
    loop {
        match rx.recv() {
            Ok(WorkerCommand::Event(event)) => {
                for outcome in engine.process(event) {
                    if outcome_tx.send(outcome).is_err() {
                        return;
                    }
                }
            }
            Ok(WorkerCommand::Shutdown) | Err(_) => {
                debug!("engine worker stopping");
                return;
            }
        }
    }
}

fn symbol_worker(symbol: &str, num_workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    symbol.hash(&mut hasher);
    (hasher.finish() % num_workers as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::{Bar, Timeframe};
    use crate::exec::RecordingClient;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn same_symbol_same_worker() {
        let a = symbol_worker("EURUSD", 4);
        for _ in 0..10 {
            assert_eq!(symbol_worker("EURUSD", 4), a);
        }
    }

    #[test]
    fn dispatch_processes_and_drains() {
        let mut config = EngineConfig::default();
        config.timeframes = vec![Timeframe::M5];
        let engine = Arc::new(Orchestrator::new(
            config,
            Arc::new(RecordingClient::new(100_000.0)),
        ));
        let dispatcher = Dispatcher::spawn(engine, 2);

        let base = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        for i in 0..10i64 {
            let close = 1.0850 + i as f64 * 0.0001;
            dispatcher.dispatch(MarketEvent::Bar {
                symbol: if i % 2 == 0 { "EURUSD" } else { "GBPUSD" }.into(),
                timeframe: Timeframe::M5,
                bar: Bar::new(
                    base + Duration::minutes(5 * i),
                    close - 0.0002,
                    close + 0.0005,
                    close - 0.0007,
                    close,
                    1000.0,
                ),
            });
        }
        let outcomes = dispatcher.shutdown();
        assert_eq!(outcomes.len(), 10);
    }
}
