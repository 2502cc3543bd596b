use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Represents a price, typically using a high-precision decimal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(pub Decimal);

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a quantity of an asset, typically using a high-precision decimal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantity(pub Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a financial asset, identified by a symbol string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(pub String);

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Asset(s.to_uppercase())
    }
}

/// One of the two venues the engine arbitrages between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Venue {
    A,
    B,
}

impl Venue {
    pub const BOTH: [Venue; 2] = [Venue::A, Venue::B];

    /// The venue on the other side of a two-leg trade.
    pub fn counterpart(self) -> Venue {
        match self {
            Venue::A => Venue::B,
            Venue::B => Venue::A,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::A => write!(f, "venue-a"),
            Venue::B => write!(f, "venue-b"),
        }
    }
}

/// Logical side of an order. Venue-specific spelling is resolved by the adapter layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Logical order type. Only limit orders are placed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKind {
    Limit,
}

/// An instrument as listed by a venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,
    pub base_asset: Asset,
    pub quote_asset: Asset,
}

/// A symbol that is tradable on both venues, with each venue's taker fee in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct TradablePair {
    pub symbol: String,
    pub base_asset: Asset,
    pub quote_asset: Asset,
    pub taker_fee_a: Decimal,
    pub taker_fee_b: Decimal,
}

impl TradablePair {
    /// Taker fee (percent) charged by the given venue.
    pub fn taker_fee(&self, venue: Venue) -> Decimal {
        match venue {
            Venue::A => self.taker_fee_a,
            Venue::B => self.taker_fee_b,
        }
    }
}

impl fmt::Display for TradablePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.symbol, self.base_asset, self.quote_asset)
    }
}

/// Best bid/ask with the resting quantity at each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopOfBook {
    pub bid_price: Price,
    pub ask_price: Price,
    pub bid_qty: Quantity,
    pub ask_qty: Quantity,
}

/// Top-of-book from both venues for one pair, taken in the same poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub venue_a: TopOfBook,
    pub venue_b: TopOfBook,
    pub timestamp: DateTime<Utc>,
}

impl QuoteSnapshot {
    pub fn book(&self, venue: Venue) -> &TopOfBook {
        match venue {
            Venue::A => &self.venue_a,
            Venue::B => &self.venue_b,
        }
    }
}

/// Balance of a single asset on a venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub asset: Asset,
    /// Free collateral, not locked by open orders or positions.
    pub available: Decimal,
    pub total: Decimal,
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that flattens a position of this direction.
    pub fn closing_side(self) -> Side {
        match self {
            PositionSide::Long => Side::Sell,
            PositionSide::Short => Side::Buy,
        }
    }
}

/// Open position as reported by a venue. Size is always non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub venue: Venue,
    pub symbol: String,
    pub side: PositionSide,
    pub size: Quantity,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.size.is_positive()
    }
}

/// OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: String,
}

/// A sized, fee-adjusted cross-venue opportunity for one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub id: Uuid,
    pub pair: TradablePair,
    pub buy_venue: Venue,
    pub sell_venue: Venue,
    /// Ask on the buying venue.
    pub ask_price: Price,
    /// Bid on the selling venue.
    pub bid_price: Price,
    /// `ask_price - bid_price`; negative when the trade is nominally profitable.
    pub raw_spread: Decimal,
    pub traded_amount: Quantity,
    pub fee: Decimal,
    pub net_profit: Decimal,
    pub net_profit_pct: Decimal,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buy {} @ {} on {} / sell @ {} on {} (net {} = {}%)",
            self.pair.symbol,
            self.traded_amount,
            self.ask_price,
            self.buy_venue,
            self.bid_price,
            self.sell_venue,
            self.net_profit.round_dp(4),
            self.net_profit_pct.round_dp(4)
        )
    }
}

/// Result of re-verifying collateral on both legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginVerdict {
    pub sufficient: bool,
    /// Amount after the per-asset ceiling has been applied.
    pub traded_amount: Quantity,
}

/// What happened when both legs of an opportunity were sent.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Both legs were accepted.
    Executed { buy: OrderAck, sell: OrderAck },
    /// The buy leg was refused; nothing was sent to the selling venue.
    BuyLegFailed { reason: String },
    /// The buy leg was accepted but the sell leg was refused, leaving one-sided exposure.
    SellLegFailed { buy: OrderAck, reason: String },
}

impl ExecutionOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, ExecutionOutcome::Executed { .. })
    }
}

/// Input row for the opportunity predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(pub Vec<f64>);

/// Predictor output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub will_be_profitable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_display() {
        let price = Price(dec!(123.45));
        assert_eq!(format!("{}", price), "123.45");
    }

    #[test]
    fn test_quantity_display_and_sign() {
        let quantity = Quantity(dec!(0.5));
        assert_eq!(format!("{}", quantity), "0.5");
        assert!(quantity.is_positive());
        assert!(!Quantity::ZERO.is_positive());
    }

    #[test]
    fn test_asset_display_and_from_str() {
        let asset = Asset::from("btc");
        assert_eq!(asset, Asset("BTC".to_string()));
        assert_eq!(format!("{}", asset), "BTC");
    }

    #[test]
    fn test_venue_counterpart() {
        assert_eq!(Venue::A.counterpart(), Venue::B);
        assert_eq!(Venue::B.counterpart(), Venue::A);
        assert_eq!(format!("{}", Venue::A), "venue-a");
    }

    #[test]
    fn test_tradable_pair_fee_lookup() {
        let pair = TradablePair {
            symbol: "BTCUSDT".to_string(),
            base_asset: Asset::from("BTC"),
            quote_asset: Asset::from("USDT"),
            taker_fee_a: dec!(0.04),
            taker_fee_b: dec!(0.055),
        };
        assert_eq!(pair.taker_fee(Venue::A), dec!(0.04));
        assert_eq!(pair.taker_fee(Venue::B), dec!(0.055));
        assert_eq!(format!("{}", pair), "BTCUSDT (BTC/USDT)");
    }

    #[test]
    fn test_closing_side() {
        assert_eq!(PositionSide::Long.closing_side(), Side::Sell);
        assert_eq!(PositionSide::Short.closing_side(), Side::Buy);
    }

    #[test]
    fn test_position_is_open() {
        let mut position = Position {
            venue: Venue::B,
            symbol: "ETHUSDT".to_string(),
            side: PositionSide::Short,
            size: Quantity(dec!(1.5)),
        };
        assert!(position.is_open());
        position.size = Quantity::ZERO;
        assert!(!position.is_open());
    }

    #[test]
    fn test_quote_snapshot_book_lookup() {
        let snapshot = QuoteSnapshot {
            symbol: "BTCUSDT".to_string(),
            venue_a: TopOfBook {
                bid_price: Price(dec!(99)),
                ask_price: Price(dec!(100)),
                bid_qty: Quantity(dec!(1)),
                ask_qty: Quantity(dec!(2)),
            },
            venue_b: TopOfBook::default(),
            timestamp: Utc::now(),
        };
        assert_eq!(snapshot.book(Venue::A).ask_price, Price(dec!(100)));
        assert_eq!(snapshot.book(Venue::B).ask_price, Price::default());
    }

    #[test]
    fn test_feature_vector_serializes_as_array() {
        let features = FeatureVector(vec![1.0, 2.5]);
        assert_eq!(serde_json::to_string(&features).unwrap(), "[1.0,2.5]");
    }

    #[test]
    fn test_execution_outcome_is_executed() {
        let ack = OrderAck {
            order_id: "1".to_string(),
            client_order_id: "c1".to_string(),
        };
        let outcome = ExecutionOutcome::Executed {
            buy: ack.clone(),
            sell: ack.clone(),
        };
        assert!(outcome.is_executed());
        let partial = ExecutionOutcome::SellLegFailed {
            buy: ack,
            reason: "rejected".to_string(),
        };
        assert!(!partial.is_executed());
    }
}
