//! JSON persistence of the portfolio snapshot: `{ "ASSET": [balance_a, balance_b] }`.

use crate::errors::LedgerError;
use crate::ledger::PortfolioSnapshot;
use common::types::Asset;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

type WireSnapshot = BTreeMap<String, [f64; 2]>;

/// Reads and writes the snapshot file kept between runs.
#[derive(Debug, Clone)]
pub struct PortfolioStore {
    path: PathBuf,
}

impl PortfolioStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the previous run's snapshot. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<PortfolioSnapshot>, LedgerError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LedgerError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let wire: WireSnapshot =
            serde_json::from_str(&content).map_err(|source| LedgerError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        let mut snapshot = PortfolioSnapshot::default();
        for (asset, [a, b]) in wire {
            let balance_a = from_f64(&asset, a)?;
            let balance_b = from_f64(&asset, b)?;
            snapshot.insert(Asset::from(asset.as_str()), balance_a, balance_b);
        }
        Ok(Some(snapshot))
    }

    /// Writes `snapshot`, replacing any previous file.
    pub fn persist(&self, snapshot: &PortfolioSnapshot) -> Result<(), LedgerError> {
        let mut wire = WireSnapshot::new();
        for (asset, &(a, b)) in snapshot.iter() {
            wire.insert(asset.0.clone(), [to_f64(asset, a)?, to_f64(asset, b)?]);
        }
        let content = serde_json::to_string(&wire).map_err(|source| LedgerError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, content).map_err(|source| LedgerError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn from_f64(asset: &str, value: f64) -> Result<Decimal, LedgerError> {
    Decimal::from_f64(value).ok_or_else(|| LedgerError::Unrepresentable {
        asset: asset.to_string(),
        value: value.to_string(),
    })
}

fn to_f64(asset: &Asset, value: Decimal) -> Result<f64, LedgerError> {
    value.to_f64().ok_or_else(|| LedgerError::Unrepresentable {
        asset: asset.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = PortfolioStore::new(dir.path().join("portfolio.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = TempDir::new().unwrap();
        let store = PortfolioStore::new(dir.path().join("portfolio.json"));
        let mut snapshot = PortfolioSnapshot::default();
        snapshot.insert(Asset::from("USDT"), dec!(1000.5), dec!(250));
        snapshot.insert(Asset::from("BTC"), dec!(0.25), dec!(0));

        store.persist(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_file_format_is_asset_to_pair() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portfolio.json");
        let store = PortfolioStore::new(&path);
        let mut snapshot = PortfolioSnapshot::default();
        snapshot.insert(Asset::from("ETH"), dec!(1.5), dec!(2));
        store.persist(&snapshot).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "ETH": [1.5, 2.0] }));
    }

    #[test]
    fn test_persist_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = PortfolioStore::new(dir.path().join("portfolio.json"));
        let mut first = PortfolioSnapshot::default();
        first.insert(Asset::from("BTC"), dec!(1), dec!(1));
        store.persist(&first).unwrap();

        let mut second = PortfolioSnapshot::default();
        second.insert(Asset::from("USDT"), dec!(10), dec!(20));
        store.persist(&second).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(loaded.get(&Asset::from("BTC")).is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portfolio.json");
        std::fs::write(&path, "not json").unwrap();
        let store = PortfolioStore::new(&path);
        assert!(matches!(store.load(), Err(LedgerError::Malformed { .. })));
    }
}
