//! # Opportunity Detector Crate
//!
//! Turns quotes from two venues into sized, fee-adjusted opportunities.
//! The engine drives it once per pair per poll cycle:
//! [`quotes::aggregate`] fetches both books, [`evaluator::OpportunityEvaluator`]
//! prices both directions and [`sizing::TradeSizer`] bounds the amount.
//! [`predictor`] holds the candle features used in predictor mode.

pub mod evaluator;
pub mod predictor;
pub mod quotes;
pub mod sizing;

// Re-export the main types for easy access.
pub use evaluator::{Direction, EvaluatorConfig, OpportunityEvaluator, RawSpreads};
pub use predictor::HttpPredictor;
pub use sizing::{BalanceSheet, SizingConfig, TradeSizer};
