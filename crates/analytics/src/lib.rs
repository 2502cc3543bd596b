//! # Portfolio Ledger
//!
//! Tracks the combined balance of each asset across both venues and how it
//! drifted since the previous run. Snapshots are persisted as a single JSON
//! file between runs.

pub mod errors;
pub mod ledger;
pub mod store;

pub use errors::LedgerError;
pub use ledger::{DriftRow, PortfolioLedger, PortfolioSnapshot};
pub use store::PortfolioStore;
