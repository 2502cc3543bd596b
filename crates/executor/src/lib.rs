//! Order placement: the paired execution of an opportunity and the
//! force-closing of positions left open by partial executions.

pub mod coordinator;
pub mod reaper;

pub use coordinator::TradeExecutor;
pub use reaper::{PositionReaper, ReapOutcome, ReaperCounters};
