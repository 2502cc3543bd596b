//! Orchestration, config, and dependency injection.

pub mod config;
pub mod connect;
pub mod engine;
pub mod margin;
pub mod registry;

pub use config::{BotConfig, ConfigError, PredictorConfig, VenueConfig, VenueKind};
pub use connect::connect;
pub use engine::Engine;
pub use margin::MarginGuard;
pub use registry::{PairRegistry, RegistryError};
