//! Top-of-book aggregation across both venues.

use chrono::Utc;
use common::types::{QuoteSnapshot, TopOfBook};
use exchange_client_trait::Venues;
use log::warn;
use rust_decimal::Decimal;

/// Fetches both venues' top-of-book for `symbol` concurrently.
///
/// Returns `None` when either fetch fails or the pair of books is unusable
/// (see [`is_usable`]).
pub async fn aggregate(venues: &Venues, symbol: &str) -> Option<QuoteSnapshot> {
    let (a, b) = venues.pair();
    let (book_a, book_b) = tokio::join!(a.client.top_of_book(symbol), b.client.top_of_book(symbol));

    let (venue_a, venue_b) = match (book_a, book_b) {
        (Ok(venue_a), Ok(venue_b)) => (venue_a, venue_b),
        (Err(e), _) => {
            warn!("{}: top-of-book unavailable on {}: {}", symbol, a.venue, e);
            return None;
        }
        (_, Err(e)) => {
            warn!("{}: top-of-book unavailable on {}: {}", symbol, b.venue, e);
            return None;
        }
    };

    if !is_usable(&venue_a, &venue_b) {
        warn!("{}: unusable quotes, skipping this cycle", symbol);
        return None;
    }

    Some(QuoteSnapshot {
        symbol: symbol.to_string(),
        venue_a,
        venue_b,
        timestamp: Utc::now(),
    })
}

/// No value may be negative, at least one ask must be non-zero and at least
/// one bid must be non-zero.
pub fn is_usable(a: &TopOfBook, b: &TopOfBook) -> bool {
    let values = [
        a.bid_price.0,
        a.ask_price.0,
        a.bid_qty.0,
        a.ask_qty.0,
        b.bid_price.0,
        b.ask_price.0,
        b.bid_qty.0,
        b.ask_qty.0,
    ];
    if values.iter().any(|v| v.is_sign_negative() && !v.is_zero()) {
        return false;
    }
    let both_asks_zero = a.ask_price.0 == Decimal::ZERO && b.ask_price.0 == Decimal::ZERO;
    let both_bids_zero = a.bid_price.0 == Decimal::ZERO && b.bid_price.0 == Decimal::ZERO;
    !(both_asks_zero || both_bids_zero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::types::{Balance, Candle, Instrument, OrderAck, Position, Price, Quantity};
    use common::VenueError;
    use exchange_client_trait::{ExchangeClient, NativeOrder, OrderVocabulary, VenueResult};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct BookClient(VenueResult<TopOfBook>);

    #[async_trait]
    impl ExchangeClient for BookClient {
        fn id(&self) -> &'static str {
            "book"
        }
        async fn instruments(&self) -> VenueResult<Vec<Instrument>> {
            Ok(vec![])
        }
        async fn taker_fee(&self, _symbol: &str) -> VenueResult<Decimal> {
            Ok(Decimal::ZERO)
        }
        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> VenueResult<()> {
            Ok(())
        }
        async fn top_of_book(&self, _symbol: &str) -> VenueResult<TopOfBook> {
            self.0.clone()
        }
        async fn balances(&self) -> VenueResult<Vec<Balance>> {
            Ok(vec![])
        }
        async fn place_order(&self, _order: &NativeOrder) -> VenueResult<OrderAck> {
            Err(VenueError::Rejected("read-only".to_string()))
        }
        async fn open_positions(&self, _symbol: &str) -> VenueResult<Vec<Position>> {
            Ok(vec![])
        }
        async fn historical_candles(
            &self,
            _symbol: &str,
            _interval: &str,
            _start_ms: i64,
            _limit: u32,
        ) -> VenueResult<Vec<Candle>> {
            Ok(vec![])
        }
    }

    fn book(bid: Decimal, ask: Decimal) -> TopOfBook {
        TopOfBook {
            bid_price: Price(bid),
            ask_price: Price(ask),
            bid_qty: Quantity(dec!(1)),
            ask_qty: Quantity(dec!(1)),
        }
    }

    fn create_test_venues(a: VenueResult<TopOfBook>, b: VenueResult<TopOfBook>) -> Venues {
        Venues::new(
            Arc::new(BookClient(a)),
            OrderVocabulary::UPPER,
            Arc::new(BookClient(b)),
            OrderVocabulary::TITLE,
        )
    }

    #[test]
    fn test_both_asks_zero_is_unusable() {
        assert!(!is_usable(&book(dec!(1), dec!(0)), &book(dec!(1), dec!(0))));
    }

    #[test]
    fn test_both_bids_zero_is_unusable() {
        assert!(!is_usable(&book(dec!(0), dec!(2)), &book(dec!(0), dec!(2))));
    }

    #[test]
    fn test_one_sided_zero_is_usable() {
        assert!(is_usable(&book(dec!(0), dec!(2)), &book(dec!(1), dec!(0))));
    }

    #[test]
    fn test_negative_value_is_unusable() {
        assert!(!is_usable(&book(dec!(-1), dec!(2)), &book(dec!(1), dec!(2))));
    }

    #[tokio::test]
    async fn test_aggregate_builds_snapshot() {
        let venues = create_test_venues(Ok(book(dec!(99), dec!(100))), Ok(book(dec!(99.5), dec!(101))));
        let snapshot = aggregate(&venues, "BTCUSDT").await.unwrap();
        assert_eq!(snapshot.symbol, "BTCUSDT");
        assert_eq!(snapshot.venue_a.ask_price, Price(dec!(100)));
        assert_eq!(snapshot.venue_b.bid_price, Price(dec!(99.5)));
    }

    #[tokio::test]
    async fn test_aggregate_none_when_one_venue_fails() {
        let venues = create_test_venues(
            Ok(book(dec!(99), dec!(100))),
            Err(VenueError::Timeout("orderbook".to_string())),
        );
        assert!(aggregate(&venues, "BTCUSDT").await.is_none());
    }

    #[tokio::test]
    async fn test_aggregate_none_when_asks_zero() {
        let venues = create_test_venues(Ok(book(dec!(99), dec!(0))), Ok(book(dec!(99), dec!(0))));
        assert!(aggregate(&venues, "BTCUSDT").await.is_none());
    }
}
