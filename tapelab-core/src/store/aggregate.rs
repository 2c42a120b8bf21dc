//! Tick-to-bar aggregation.
//!
//! Ticks accumulate into the bar whose boundary contains their timestamp;
//! a tick at or past the next boundary rolls the working bar and emits it.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::{Bar, TickSnapshot, Timeframe};

/// Aggregates a tick stream into bars on a fixed timeframe grid.
#[derive(Debug, Clone)]
pub struct TickAggregator {
    timeframe: Timeframe,
    working: Option<WorkingBar>,
    last_tick_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct WorkingBar {
    start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl WorkingBar {
    fn begin(start: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self { start, open: price, high: price, low: price, close: price, volume }
    }

    fn absorb(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    fn finish(&self) -> Bar {
        Bar::new(self.start, self.open, self.high, self.low, self.close, self.volume)
    }
}

impl TickAggregator {
    pub fn new(timeframe: Timeframe) -> Self {
        Self { timeframe, working: None, last_tick_at: None }
    }

    /// Feed one tick. Returns the completed bar when this tick crosses a
    /// boundary. Crossed quotes and out-of-order ticks are dropped with a
    /// warning (None).
    pub fn on_tick(&mut self, tick: &TickSnapshot) -> Option<Bar> {
        if tick.is_crossed() {
            warn!(bid = tick.bid, ask = tick.ask, "dropping crossed tick");
            return None;
        }
        if let Some(last) = self.last_tick_at {
            if tick.timestamp < last {
                warn!(incoming = %tick.timestamp, last = %last, "dropping out-of-order tick");
                return None;
            }
        }
        self.last_tick_at = Some(tick.timestamp);

        let bar_start = self.timeframe.floor(tick.timestamp);
        let price = tick.last_price;
        let volume = tick.last_volume.max(0.0);

        if let Some(wb) = self.working.as_mut() {
            if bar_start == wb.start {
                wb.absorb(price, volume);
                return None;
            }
        }
        // first tick, or boundary crossed: emit any finished bar and start
        // the next one
        let completed = self.working.take().map(|wb| wb.finish());
        self.working = Some(WorkingBar::begin(bar_start, price, volume));
        completed
    }

    /// The bar currently being built, if any.
    pub fn working_bar(&self) -> Option<Bar> {
        self.working.as_ref().map(|w| w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tick(secs_past_nine: i64, price: f64, volume: f64) -> TickSnapshot {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
            + chrono::Duration::seconds(secs_past_nine);
        TickSnapshot::new(ts, price, price - 0.01, price + 0.01, volume)
    }

    #[test]
    fn aggregates_within_one_bar() {
        let mut agg = TickAggregator::new(Timeframe::M1);
        assert!(agg.on_tick(&tick(0, 100.0, 10.0)).is_none());
        assert!(agg.on_tick(&tick(20, 102.0, 5.0)).is_none());
        assert!(agg.on_tick(&tick(40, 99.0, 5.0)).is_none());
        let wb = agg.working_bar().unwrap();
        assert_eq!(wb.open, 100.0);
        assert_eq!(wb.high, 102.0);
        assert_eq!(wb.low, 99.0);
        assert_eq!(wb.close, 99.0);
        assert_eq!(wb.volume, 20.0);
    }

    #[test]
    fn boundary_tick_rolls_the_bar() {
        let mut agg = TickAggregator::new(Timeframe::M1);
        agg.on_tick(&tick(0, 100.0, 10.0));
        agg.on_tick(&tick(30, 101.0, 10.0));
        let completed = agg.on_tick(&tick(60, 103.0, 1.0)).expect("completed bar");
        assert_eq!(completed.open, 100.0);
        assert_eq!(completed.close, 101.0);
        assert_eq!(completed.volume, 20.0);
        // the boundary tick seeds the next bar
        let wb = agg.working_bar().unwrap();
        assert_eq!(wb.open, 103.0);
    }

    #[test]
    fn crossed_tick_dropped() {
        let mut agg = TickAggregator::new(Timeframe::M1);
        let mut t = tick(0, 100.0, 10.0);
        t.bid = 100.2;
        t.ask = 100.0;
        assert!(agg.on_tick(&t).is_none());
        assert!(agg.working_bar().is_none());
    }

    #[test]
    fn out_of_order_tick_dropped() {
        let mut agg = TickAggregator::new(Timeframe::M1);
        agg.on_tick(&tick(30, 100.0, 10.0));
        assert!(agg.on_tick(&tick(10, 105.0, 10.0)).is_none());
        let wb = agg.working_bar().unwrap();
        assert_eq!(wb.high, 100.0);
    }

    #[test]
    fn skipped_interval_emits_previous_bar() {
        let mut agg = TickAggregator::new(Timeframe::M1);
        agg.on_tick(&tick(0, 100.0, 1.0));
        // next tick three minutes later still closes the first bar
        let completed = agg.on_tick(&tick(185, 104.0, 1.0)).expect("bar");
        assert_eq!(completed.close, 100.0);
    }
}
