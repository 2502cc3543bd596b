//! Venue-agnostic exchange client capability consumed by the engine.
//!
//! Each venue implements [`ExchangeClient`] once. The engine talks to venues
//! only through [`VenueHandle`], which pairs a client with the [`Venue`] tag it
//! plays and the [`OrderVocabulary`] the venue expects on the wire.

use async_trait::async_trait;
use common::types::{
    Balance, Candle, Instrument, OrderAck, OrderKind, Position, Price, Quantity, Side, TopOfBook,
    Venue,
};
use common::VenueError;
use std::fmt;
use std::sync::Arc;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

/// Result of a single venue call.
pub type VenueResult<T> = Result<T, VenueError>;

/// Native spelling of order sides and types for one venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderVocabulary {
    pub buy: &'static str,
    pub sell: &'static str,
    pub limit: &'static str,
}

impl OrderVocabulary {
    /// `BUY` / `SELL` / `LIMIT`.
    pub const UPPER: OrderVocabulary = OrderVocabulary {
        buy: "BUY",
        sell: "SELL",
        limit: "LIMIT",
    };

    /// `Buy` / `Sell` / `Limit`.
    pub const TITLE: OrderVocabulary = OrderVocabulary {
        buy: "Buy",
        sell: "Sell",
        limit: "Limit",
    };

    pub fn side(&self, side: Side) -> &'static str {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }

    pub fn kind(&self, kind: OrderKind) -> &'static str {
        match kind {
            OrderKind::Limit => self.limit,
        }
    }
}

/// An order expressed in a venue's own vocabulary, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeOrder {
    pub symbol: String,
    pub side: &'static str,
    pub order_type: &'static str,
    pub quantity: Quantity,
    pub price: Price,
    pub client_order_id: String,
}

/// REST operations the engine needs from a venue.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Returns the unique identifier for the client, used in logs.
    fn id(&self) -> &'static str;

    /// Lists every tradable instrument.
    async fn instruments(&self) -> VenueResult<Vec<Instrument>>;

    /// Taker fee for the symbol, in percent (0.04 means 0.04%).
    async fn taker_fee(&self, symbol: &str) -> VenueResult<rust_decimal::Decimal>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> VenueResult<()>;

    async fn top_of_book(&self, symbol: &str) -> VenueResult<TopOfBook>;

    async fn balances(&self) -> VenueResult<Vec<Balance>>;

    async fn place_order(&self, order: &NativeOrder) -> VenueResult<OrderAck>;

    /// Positions on the symbol. Flat positions may be included with zero size.
    async fn open_positions(&self, symbol: &str) -> VenueResult<Vec<Position>>;

    /// Candles starting at `start_ms`, oldest first.
    async fn historical_candles(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        limit: u32,
    ) -> VenueResult<Vec<Candle>>;
}

/// A client bound to the venue slot it fills, together with its vocabulary.
#[derive(Clone)]
pub struct VenueHandle {
    pub venue: Venue,
    pub client: Arc<dyn ExchangeClient>,
    pub vocabulary: OrderVocabulary,
}

impl VenueHandle {
    pub fn new(venue: Venue, client: Arc<dyn ExchangeClient>, vocabulary: OrderVocabulary) -> Self {
        Self {
            venue,
            client,
            vocabulary,
        }
    }

    /// Builds a limit order in this venue's vocabulary.
    pub fn limit_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Quantity,
        price: Price,
        client_order_id: String,
    ) -> NativeOrder {
        NativeOrder {
            symbol: symbol.to_string(),
            side: self.vocabulary.side(side),
            order_type: self.vocabulary.kind(OrderKind::Limit),
            quantity,
            price,
            client_order_id,
        }
    }
}

impl fmt::Debug for VenueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueHandle")
            .field("venue", &self.venue)
            .field("client", &self.client.id())
            .field("vocabulary", &self.vocabulary)
            .finish()
    }
}

/// Both venue handles, addressable by [`Venue`].
#[derive(Debug, Clone)]
pub struct Venues {
    a: VenueHandle,
    b: VenueHandle,
}

impl Venues {
    /// Tags the two clients as venue A and venue B.
    pub fn new(
        client_a: Arc<dyn ExchangeClient>,
        vocabulary_a: OrderVocabulary,
        client_b: Arc<dyn ExchangeClient>,
        vocabulary_b: OrderVocabulary,
    ) -> Self {
        Self {
            a: VenueHandle::new(Venue::A, client_a, vocabulary_a),
            b: VenueHandle::new(Venue::B, client_b, vocabulary_b),
        }
    }

    pub fn get(&self, venue: Venue) -> &VenueHandle {
        match venue {
            Venue::A => &self.a,
            Venue::B => &self.b,
        }
    }

    /// Venue A and venue B, in that order.
    pub fn pair(&self) -> (&VenueHandle, &VenueHandle) {
        (&self.a, &self.b)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VenueHandle> {
        [&self.a, &self.b].into_iter()
    }
}
