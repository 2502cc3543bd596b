//! Startup resolution of the pairs tradable on both venues.

use common::types::{Instrument, TradablePair, Venue};
use common::VenueError;
use exchange_client_trait::Venues;
use log::{info, warn};
use rust_decimal::Decimal;
use thiserror::Error;

/// Leverage applied to every registered pair.
pub const LEVERAGE: u32 = 1;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to list instruments on {venue}: {source}")]
    Instruments { venue: Venue, source: VenueError },

    #[error(
        "requested pairs are not tradable on both venues \
         (requested {requested}, matched on venue-a {matched_a}, registered {registered})"
    )]
    NotTradable {
        requested: usize,
        matched_a: usize,
        registered: usize,
    },

    #[error("failed to set leverage for {symbol} on {venue}: {source}")]
    Leverage {
        venue: Venue,
        symbol: String,
        source: VenueError,
    },
}

/// The fixed set of pairs the engine trades.
#[derive(Debug, Clone, PartialEq)]
pub struct PairRegistry {
    pairs: Vec<TradablePair>,
}

impl PairRegistry {
    /// Resolves `requested` on both venues and sets leverage on every pair.
    pub async fn bootstrap(venues: &Venues, requested: &[String]) -> Result<Self, RegistryError> {
        let pairs = resolve(venues, requested).await?;
        set_leverage(venues, &pairs).await?;
        for pair in &pairs {
            info!(
                "registered {} (taker fee venue-a {}%, venue-b {}%)",
                pair, pair.taker_fee_a, pair.taker_fee_b
            );
        }
        Ok(Self { pairs })
    }

    pub fn from_pairs(pairs: Vec<TradablePair>) -> Self {
        Self { pairs }
    }

    pub fn pairs(&self) -> &[TradablePair] {
        &self.pairs
    }

    pub fn symbols(&self) -> Vec<String> {
        self.pairs.iter().map(|p| p.symbol.clone()).collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&TradablePair> {
        self.pairs.iter().find(|p| p.symbol == symbol)
    }
}

/// A candidate found on venue A, waiting for venue B's fee.
struct Candidate {
    instrument: Instrument,
    taker_fee_a: Decimal,
}

/// Picks venue A's instrument for a requested symbol: an exact match if one
/// is listed, otherwise the first instrument whose symbol starts with it.
fn match_instrument<'a>(instruments: &'a [Instrument], requested: &str) -> Option<&'a Instrument> {
    instruments
        .iter()
        .find(|i| i.symbol == requested)
        .or_else(|| instruments.iter().find(|i| i.symbol.starts_with(requested)))
}

/// Intersects the requested symbols with both venues' listings.
///
/// Fails unless every requested symbol ends up registered.
pub async fn resolve(
    venues: &Venues,
    requested: &[String],
) -> Result<Vec<TradablePair>, RegistryError> {
    let (a, b) = venues.pair();

    let instruments_a = a
        .client
        .instruments()
        .await
        .map_err(|source| RegistryError::Instruments {
            venue: Venue::A,
            source,
        })?;

    let mut candidates = Vec::new();
    for symbol in requested {
        let Some(instrument) = match_instrument(&instruments_a, symbol) else {
            warn!("{} is not listed on {}", symbol, a.venue);
            continue;
        };
        if candidates
            .iter()
            .any(|c: &Candidate| c.instrument.symbol == instrument.symbol)
        {
            continue;
        }
        match a.client.taker_fee(&instrument.symbol).await {
            Ok(taker_fee_a) => candidates.push(Candidate {
                instrument: instrument.clone(),
                taker_fee_a,
            }),
            Err(e) => warn!(
                "taker fee for {} unavailable on {}: {}",
                instrument.symbol, a.venue, e
            ),
        }
    }

    let instruments_b = b
        .client
        .instruments()
        .await
        .map_err(|source| RegistryError::Instruments {
            venue: Venue::B,
            source,
        })?;

    let mut pairs = Vec::new();
    for candidate in &candidates {
        let symbol = &candidate.instrument.symbol;
        if !instruments_b.iter().any(|i| &i.symbol == symbol) {
            warn!("{} is not listed on {}", symbol, b.venue);
            continue;
        }
        match b.client.taker_fee(symbol).await {
            Ok(taker_fee_b) => pairs.push(TradablePair {
                symbol: symbol.clone(),
                base_asset: candidate.instrument.base_asset.clone(),
                quote_asset: candidate.instrument.quote_asset.clone(),
                taker_fee_a: candidate.taker_fee_a,
                taker_fee_b,
            }),
            Err(e) => warn!("taker fee for {} unavailable on {}: {}", symbol, b.venue, e),
        }
    }

    if pairs.len() != candidates.len() || pairs.len() != requested.len() {
        return Err(RegistryError::NotTradable {
            requested: requested.len(),
            matched_a: candidates.len(),
            registered: pairs.len(),
        });
    }
    Ok(pairs)
}

/// Sets 1x leverage on both venues for every pair.
pub async fn set_leverage(venues: &Venues, pairs: &[TradablePair]) -> Result<(), RegistryError> {
    for pair in pairs {
        for handle in venues.iter() {
            handle
                .client
                .set_leverage(&pair.symbol, LEVERAGE)
                .await
                .map_err(|source| RegistryError::Leverage {
                    venue: handle.venue,
                    symbol: pair.symbol.clone(),
                    source,
                })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::Asset;
    use exchange_client_trait::fake::FakeVenue;
    use exchange_client_trait::OrderVocabulary;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn create_test_venues(a: FakeVenue, b: FakeVenue) -> (Arc<FakeVenue>, Arc<FakeVenue>, Venues) {
        let a = Arc::new(a);
        let b = Arc::new(b);
        let venues = Venues::new(
            a.clone(),
            OrderVocabulary::UPPER,
            b.clone(),
            OrderVocabulary::TITLE,
        );
        (a, b, venues)
    }

    fn requested(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_registers_pairs_listed_on_both() {
        let (a, b, venues) = create_test_venues(
            FakeVenue::new("a", Venue::A)
                .with_instrument("BTCUSDT", "BTC", "USDT", dec!(0.04))
                .with_instrument("ETHUSDT", "ETH", "USDT", dec!(0.04))
                .with_instrument("SOLUSDT", "SOL", "USDT", dec!(0.04)),
            FakeVenue::new("b", Venue::B)
                .with_instrument("ETHUSDT", "ETH", "USDT", dec!(0.055))
                .with_instrument("BTCUSDT", "BTC", "USDT", dec!(0.055)),
        );

        let registry = PairRegistry::bootstrap(&venues, &requested(&["BTCUSDT", "ETHUSDT"]))
            .await
            .unwrap();

        assert_eq!(registry.symbols(), vec!["BTCUSDT", "ETHUSDT"]);
        let btc = registry.get("BTCUSDT").unwrap();
        assert_eq!(btc.base_asset, Asset::from("BTC"));
        assert_eq!(btc.taker_fee_a, dec!(0.04));
        assert_eq!(btc.taker_fee_b, dec!(0.055));

        let expected = vec![("BTCUSDT".to_string(), 1), ("ETHUSDT".to_string(), 1)];
        assert_eq!(a.leverage_calls(), expected);
        assert_eq!(b.leverage_calls(), expected);
    }

    #[tokio::test]
    async fn test_prefix_match_on_venue_a() {
        let (_a, _b, venues) = create_test_venues(
            FakeVenue::new("a", Venue::A).with_instrument("ETHUSDT", "ETH", "USDT", dec!(0.04)),
            FakeVenue::new("b", Venue::B).with_instrument("ETHUSDT", "ETH", "USDT", dec!(0.055)),
        );
        let pairs = resolve(&venues, &requested(&["ETH"])).await.unwrap();
        assert_eq!(pairs[0].symbol, "ETHUSDT");
    }

    #[test]
    fn test_exact_match_preferred_over_prefix() {
        let instruments = vec![
            Instrument {
                symbol: "BTCUSDT_240329".to_string(),
                base_asset: Asset::from("BTC"),
                quote_asset: Asset::from("USDT"),
            },
            Instrument {
                symbol: "BTCUSDT".to_string(),
                base_asset: Asset::from("BTC"),
                quote_asset: Asset::from("USDT"),
            },
        ];
        assert_eq!(
            match_instrument(&instruments, "BTCUSDT").map(|i| i.symbol.as_str()),
            Some("BTCUSDT")
        );
    }

    #[tokio::test]
    async fn test_missing_on_venue_b_is_fatal() {
        let (a, _b, venues) = create_test_venues(
            FakeVenue::new("a", Venue::A)
                .with_instrument("BTCUSDT", "BTC", "USDT", dec!(0.04))
                .with_instrument("ETHUSDT", "ETH", "USDT", dec!(0.04)),
            FakeVenue::new("b", Venue::B).with_instrument("BTCUSDT", "BTC", "USDT", dec!(0.055)),
        );
        let err = PairRegistry::bootstrap(&venues, &requested(&["BTCUSDT", "ETHUSDT"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NotTradable {
                requested: 2,
                matched_a: 2,
                registered: 1
            }
        ));
        assert!(a.leverage_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unpriced_fee_is_fatal() {
        let (_a, _b, venues) = create_test_venues(
            FakeVenue::new("a", Venue::A).with_instrument("BTCUSDT", "BTC", "USDT", dec!(0.04)),
            FakeVenue::new("b", Venue::B).with_unpriced_instrument("BTCUSDT", "BTC", "USDT"),
        );
        assert!(resolve(&venues, &requested(&["BTCUSDT"])).await.is_err());
    }

    #[tokio::test]
    async fn test_leverage_failure_is_fatal() {
        let (_a, b, venues) = create_test_venues(
            FakeVenue::new("a", Venue::A).with_instrument("BTCUSDT", "BTC", "USDT", dec!(0.04)),
            FakeVenue::new("b", Venue::B).with_instrument("BTCUSDT", "BTC", "USDT", dec!(0.055)),
        );
        b.fail_leverage(true);
        let err = PairRegistry::bootstrap(&venues, &requested(&["BTCUSDT"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Leverage { venue: Venue::B, .. }));
    }
}
