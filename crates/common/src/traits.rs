//! Shared traits for services in the arbitrage bot.

use crate::types::{ExecutionOutcome, FeatureVector, MarginVerdict, Opportunity, Prediction};
use anyhow::Result;
use async_trait::async_trait;

/// A trait for collateral checks performed right before execution.
#[async_trait]
pub trait IsMarginGuard: Send + Sync {
    /// Re-verifies that both legs of the opportunity are collateralized.
    async fn check_margin(&self, opportunity: &Opportunity) -> Result<MarginVerdict>;
}

/// A trait for trade execution services.
#[async_trait]
pub trait IsExecutor: Send + Sync {
    /// Places both legs of the opportunity.
    async fn execute_trade(&self, opportunity: &Opportunity) -> Result<ExecutionOutcome>;
}

/// An externally trained model that forecasts whether the next interval
/// holds a profitable cross-venue spread.
#[async_trait]
pub trait OpportunityPredictor: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction>;
}
