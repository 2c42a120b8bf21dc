//! Core domain records shared by every analyzer.

pub mod account;
pub mod bar;
pub mod ids;
pub mod signal;
pub mod tick;
pub mod timeframe;

pub use account::{AccountStatus, FillEvent, FillStatus, OpenPosition, PositionSide};
pub use bar::{Bar, BarError};
pub use ids::SignalId;
pub use signal::{SignalMetadata, TradeAction, TradeSignal};
pub use tick::{DepthLevel, TickSnapshot};
pub use timeframe::Timeframe;
