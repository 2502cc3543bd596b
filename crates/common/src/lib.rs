//! # Cross-Venue Arb Bot Common Crate
//!
//! This crate provides common data types, error definitions, and service traits
//! used across the `cross-venue-arb` workspace.

/// Module for common error types.
pub mod errors;

/// Module for shared service traits.
pub mod traits;

/// Module for common data structures and types.
pub mod types;

// Re-export key items for easier access.
pub use errors::VenueError;
pub use types::{
    Asset, Balance, Opportunity, Position, Price, Quantity, QuoteSnapshot, TopOfBook,
    TradablePair, Venue,
};
