//! Per-(symbol, timeframe) market data storage.

pub mod aggregate;
pub mod bars;
pub mod ring;

pub use aggregate::TickAggregator;
pub use bars::{BarSeries, StoreError};
pub use ring::BoundedRing;
