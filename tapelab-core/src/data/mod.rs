//! Historical data ingestion.

pub mod history;

pub use history::{load_history, HistoryError};
