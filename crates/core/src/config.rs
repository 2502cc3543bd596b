use detector::{EvaluatorConfig, SizingConfig};
use exchange_client_trait::OrderVocabulary;
use exchange_clients::Credentials;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::types::Asset;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    /// Symbols to trade, e.g. `BTCUSDT`.
    pub symbols: Vec<String>,
    #[serde(default = "default_min_profit_pct")]
    pub min_profit_pct: Decimal,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_reap_threshold")]
    pub reap_threshold: u32,
    #[serde(default = "default_portfolio_path")]
    pub portfolio_path: PathBuf,
    /// Largest amount of each base asset traded at once.
    #[serde(default = "default_trade_ceilings")]
    pub trade_ceilings: BTreeMap<String, Decimal>,
    pub venue_a: VenueConfig,
    pub venue_b: VenueConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    BinanceFutures,
    Bybit,
}

impl VenueKind {
    /// Order vocabulary the venue expects on the wire.
    pub fn vocabulary(self) -> OrderVocabulary {
        match self {
            VenueKind::BinanceFutures => OrderVocabulary::UPPER,
            VenueKind::Bybit => OrderVocabulary::TITLE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueConfig {
    pub kind: VenueKind,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Name of the environment variable holding the secret key.
    pub secret_key_env: String,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl VenueConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reads the key pair from the environment.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigError::MissingCredential(name.to_string()))
        };
        Ok(Credentials {
            api_key: read(&self.api_key_env)?,
            secret_key: read(&self.secret_key_env)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// URL the feature vector is posted to.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_predictor_symbol")]
    pub symbol: String,
    #[serde(default = "default_predictor_interval")]
    pub interval: String,
    /// Wait between a positive prediction and execution.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            symbol: default_predictor_symbol(),
            interval: default_predictor_interval(),
            settle_delay_secs: default_settle_delay_secs(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_min_profit_pct() -> Decimal {
    dec!(0.01)
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_reap_threshold() -> u32 {
    executor::reaper::DEFAULT_REAP_THRESHOLD
}

fn default_portfolio_path() -> PathBuf {
    PathBuf::from("portfolio.json")
}

fn default_trade_ceilings() -> BTreeMap<String, Decimal> {
    BTreeMap::from([("BTC".to_string(), dec!(0.33)), ("ETH".to_string(), dec!(5))])
}

fn default_recv_window_ms() -> u64 {
    5000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_predictor_symbol() -> String {
    "ETHUSDT".to_string()
}

fn default_predictor_interval() -> String {
    "1m".to_string()
}

fn default_settle_delay_secs() -> u64 {
    300
}

impl BotConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;

        let mut config: BotConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Symbols are matched case-sensitively by the venues.
        for symbol in &mut config.symbols {
            *symbol = symbol.trim().to_uppercase();
        }

        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path.as_ref(), content)?;

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            min_profit_pct: self.min_profit_pct,
        }
    }

    pub fn sizing_config(&self) -> SizingConfig {
        SizingConfig {
            ceilings: self
                .trade_ceilings
                .iter()
                .map(|(asset, ceiling)| (Asset::from(asset.as_str()), *ceiling))
                .collect(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::ValidationError(
                "No symbols configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.is_empty() {
                return Err(ConfigError::ValidationError(
                    "Symbol cannot be empty".to_string(),
                ));
            }
            if !seen.insert(symbol) {
                return Err(ConfigError::ValidationError(format!(
                    "Symbol '{}' is configured twice",
                    symbol
                )));
            }
        }

        if self.min_profit_pct < Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "Minimum profit percentage cannot be negative".to_string(),
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.reap_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "Reap threshold must be greater than 0".to_string(),
            ));
        }

        for (asset, ceiling) in &self.trade_ceilings {
            if *ceiling < Decimal::ZERO {
                return Err(ConfigError::ValidationError(format!(
                    "Trade ceiling for '{}' cannot be negative",
                    asset
                )));
            }
        }

        for (name, venue) in [("venue_a", &self.venue_a), ("venue_b", &self.venue_b)] {
            if venue.base_url.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Base URL for {} cannot be empty",
                    name
                )));
            }
            if venue.api_key_env.is_empty() || venue.secret_key_env.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Credential variables for {} cannot be empty",
                    name
                )));
            }
            if venue.timeout_ms == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Timeout for {} must be greater than 0",
                    name
                )));
            }
        }

        if self.predictor.enabled {
            let has_endpoint = self
                .predictor
                .endpoint
                .as_deref()
                .is_some_and(|endpoint| !endpoint.is_empty());
            if !has_endpoint {
                return Err(ConfigError::ValidationError(
                    "Predictor is enabled but has no endpoint".to_string(),
                ));
            }
            if detector::predictor::interval_millis(&self.predictor.interval).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "Unsupported predictor interval '{}'",
                    self.predictor.interval
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable {0} is not set")]
    MissingCredential(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_venue(kind: VenueKind, prefix: &str) -> VenueConfig {
        VenueConfig {
            kind,
            base_url: format!("https://{}.example", prefix),
            api_key_env: format!("{}_API_KEY", prefix.to_uppercase()),
            secret_key_env: format!("{}_SECRET_KEY", prefix.to_uppercase()),
            recv_window_ms: 5000,
            timeout_ms: 10_000,
        }
    }

    fn create_test_config() -> BotConfig {
        BotConfig {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            min_profit_pct: dec!(0.01),
            poll_interval_secs: 60,
            reap_threshold: 5,
            portfolio_path: PathBuf::from("portfolio.json"),
            trade_ceilings: default_trade_ceilings(),
            venue_a: create_test_venue(VenueKind::BinanceFutures, "binance"),
            venue_b: create_test_venue(VenueKind::Bybit, "bybit"),
            predictor: PredictorConfig::default(),
        }
    }

    #[test]
    fn test_config_save_and_load() {
        let config = create_test_config();
        let temp_file = NamedTempFile::new().unwrap();

        config.save(temp_file.path()).unwrap();
        let loaded = BotConfig::load(temp_file.path()).unwrap();

        assert_eq!(loaded.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(loaded.min_profit_pct, dec!(0.01));
        assert_eq!(loaded.venue_a.kind, VenueKind::BinanceFutures);
        assert_eq!(loaded.venue_b.kind, VenueKind::Bybit);
        assert_eq!(loaded.trade_ceilings.get("BTC"), Some(&dec!(0.33)));
        loaded.validate().unwrap();
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
symbols: [btcusdt]
venue_a:
  kind: binance_futures
  base_url: https://testnet.binancefuture.com
  api_key_env: BINANCE_API_KEY
  secret_key_env: BINANCE_SECRET_KEY
venue_b:
  kind: bybit
  base_url: https://api-testnet.bybit.com
  api_key_env: BYBIT_API_KEY
  secret_key_env: BYBIT_SECRET_KEY
"#;
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), yaml).unwrap();

        let config = BotConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.symbols, vec!["BTCUSDT"]);
        assert_eq!(config.min_profit_pct, dec!(0.01));
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.reap_threshold, 5);
        assert_eq!(config.trade_ceilings.get("ETH"), Some(&dec!(5)));
        assert!(!config.predictor.enabled);
        assert_eq!(config.predictor.settle_delay_secs, 300);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_validation() {
        let mut config = create_test_config();
        config.validate().unwrap();

        config.symbols.clear();
        assert!(config.validate().is_err());

        config = create_test_config();
        config.symbols.push("BTCUSDT".to_string());
        assert!(config.validate().is_err());

        config = create_test_config();
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        config = create_test_config();
        config.min_profit_pct = dec!(-0.1);
        assert!(config.validate().is_err());

        config = create_test_config();
        config.reap_threshold = 0;
        assert!(config.validate().is_err());

        config = create_test_config();
        config.trade_ceilings.insert("SOL".to_string(), dec!(-1));
        assert!(config.validate().is_err());

        config = create_test_config();
        config.predictor.enabled = true;
        assert!(config.validate().is_err());
        config.predictor.endpoint = Some("http://localhost:8000/predict".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_vocabulary_by_kind() {
        assert_eq!(VenueKind::BinanceFutures.vocabulary(), OrderVocabulary::UPPER);
        assert_eq!(VenueKind::Bybit.vocabulary(), OrderVocabulary::TITLE);
    }

    #[test]
    fn test_sizing_config_from_ceilings() {
        let sizing = create_test_config().sizing_config();
        assert_eq!(sizing.ceilings.get(&Asset::from("BTC")), Some(&dec!(0.33)));
    }

    #[test]
    fn test_missing_credentials_are_reported() {
        let mut venue = create_test_venue(VenueKind::Bybit, "bybit");
        venue.api_key_env = "ARB_CORE_TEST_UNSET_VARIABLE".to_string();
        match venue.credentials() {
            Err(ConfigError::MissingCredential(name)) => {
                assert_eq!(name, "ARB_CORE_TEST_UNSET_VARIABLE")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_shipped_default_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.yml");
        let config = BotConfig::load(path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.venue_a.recv_window_ms, 60_000);
        assert_eq!(config.venue_b.recv_window_ms, 50_000);
    }
}
