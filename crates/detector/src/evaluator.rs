//! Net-of-fee spread evaluation in both directions.
//!
//! Everything here is a pure function of the snapshot, the pair's fees and the
//! balance sheet; no venue is contacted. Opportunities leave with a nil id and
//! get one when they are attempted.

use crate::sizing::{BalanceSheet, SizingInputs, TradeSizer};
use common::types::{Opportunity, Price, QuoteSnapshot, TradablePair, Venue};
use log::debug;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Configuration for the opportunity evaluator.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Net profit, in percent of the ask, that an opportunity must exceed.
    pub min_profit_pct: Decimal,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            min_profit_pct: dec!(0.01),
        }
    }
}

/// One way of crossing the venues: buy on `buy`, sell on `sell`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Direction {
    pub buy: Venue,
    pub sell: Venue,
    /// `ask(buy) - bid(sell)`, negative when the direction is nominally profitable.
    pub raw_spread: Decimal,
}

/// Raw spreads of both directions with the crossed-book tie-break applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSpreads {
    /// `ask_a - bid_b`
    pub buy_a_sell_b: Decimal,
    /// `ask_b - bid_a`
    pub buy_b_sell_a: Decimal,
}

impl RawSpreads {
    /// When both directions are negative only the larger magnitude survives;
    /// the other is zeroed. Equal magnitudes keep buy-A-sell-B.
    pub fn from_prices(ask_a: Decimal, bid_a: Decimal, ask_b: Decimal, bid_b: Decimal) -> Self {
        let mut buy_a_sell_b = ask_a - bid_b;
        let mut buy_b_sell_a = ask_b - bid_a;

        if buy_a_sell_b < Decimal::ZERO && buy_b_sell_a < Decimal::ZERO {
            if buy_a_sell_b.abs() >= buy_b_sell_a.abs() {
                buy_b_sell_a = Decimal::ZERO;
            } else {
                buy_a_sell_b = Decimal::ZERO;
            }
        }

        Self {
            buy_a_sell_b,
            buy_b_sell_a,
        }
    }

    pub fn from_snapshot(snapshot: &QuoteSnapshot) -> Self {
        Self::from_prices(
            snapshot.venue_a.ask_price.0,
            snapshot.venue_a.bid_price.0,
            snapshot.venue_b.ask_price.0,
            snapshot.venue_b.bid_price.0,
        )
    }

    /// Directions with a strictly negative raw spread.
    pub fn directions(&self) -> Vec<Direction> {
        [
            Direction {
                buy: Venue::A,
                sell: Venue::B,
                raw_spread: self.buy_a_sell_b,
            },
            Direction {
                buy: Venue::B,
                sell: Venue::A,
                raw_spread: self.buy_b_sell_a,
            },
        ]
        .into_iter()
        .filter(|d| d.raw_spread < Decimal::ZERO)
        .collect()
    }
}

/// Fee and profit of one direction at a given amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitBreakdown {
    pub fee: Decimal,
    pub net_profit: Decimal,
    pub net_profit_pct: Decimal,
}

/// `fee = fee_buy/100 * amount * ask + fee_sell/100 * amount * bid`,
/// `net = -spread * amount - fee`, `pct = net / ask * 100`.
///
/// A non-negative spread is a loss before fees and shows up as such.
pub fn profit_breakdown(
    raw_spread: Decimal,
    amount: Decimal,
    ask: Decimal,
    bid: Decimal,
    fee_buy_pct: Decimal,
    fee_sell_pct: Decimal,
) -> ProfitBreakdown {
    let fee = fee_buy_pct / Decimal::ONE_HUNDRED * amount * ask
        + fee_sell_pct / Decimal::ONE_HUNDRED * amount * bid;
    let net_profit = -(raw_spread * amount) - fee;
    let net_profit_pct = if ask.is_zero() {
        Decimal::ZERO
    } else {
        net_profit / ask * Decimal::ONE_HUNDRED
    };
    ProfitBreakdown {
        fee,
        net_profit,
        net_profit_pct,
    }
}

/// Turns quote snapshots into sized, fee-adjusted opportunities.
#[derive(Debug, Clone, Default)]
pub struct OpportunityEvaluator {
    config: EvaluatorConfig,
    sizer: TradeSizer,
}

impl OpportunityEvaluator {
    pub fn new(config: EvaluatorConfig, sizer: TradeSizer) -> Self {
        Self { config, sizer }
    }

    pub fn sizer(&self) -> &TradeSizer {
        &self.sizer
    }

    pub fn min_profit_pct(&self) -> Decimal {
        self.config.min_profit_pct
    }

    pub fn is_profitable(&self, opportunity: &Opportunity) -> bool {
        opportunity.net_profit_pct > self.config.min_profit_pct
    }

    /// Opportunities in every direction whose net profit clears the threshold.
    pub fn evaluate(
        &self,
        pair: &TradablePair,
        snapshot: &QuoteSnapshot,
        balances: &BalanceSheet,
    ) -> Vec<Opportunity> {
        RawSpreads::from_snapshot(snapshot)
            .directions()
            .into_iter()
            .filter_map(|direction| self.price(pair, direction, snapshot, balances))
            .filter(|opportunity| {
                let profitable = self.is_profitable(opportunity);
                if !profitable {
                    debug!(
                        "{}: {}->{} below threshold ({}% <= {}%)",
                        pair.symbol,
                        opportunity.buy_venue,
                        opportunity.sell_venue,
                        opportunity.net_profit_pct.round_dp(4),
                        self.config.min_profit_pct
                    );
                }
                profitable
            })
            .collect()
    }

    /// Sizes and prices one direction against the snapshot, without applying
    /// the profit threshold.
    ///
    /// Returns `None` when a balance needed for sizing is unknown or the
    /// sized amount is not positive.
    pub fn price(
        &self,
        pair: &TradablePair,
        direction: Direction,
        snapshot: &QuoteSnapshot,
        balances: &BalanceSheet,
    ) -> Option<Opportunity> {
        let buy_book = snapshot.book(direction.buy);
        let sell_book = snapshot.book(direction.sell);
        let ask = buy_book.ask_price.0;
        let bid = sell_book.bid_price.0;

        let available_base = balances.available(direction.sell, &pair.base_asset);
        let available_quote = balances.available(direction.buy, &pair.quote_asset);
        let (available_base, available_quote) = match (available_base, available_quote) {
            (Some(base), Some(quote)) => (base, quote),
            _ => {
                debug!(
                    "{}: missing balance for sizing {}->{}",
                    pair.symbol, direction.buy, direction.sell
                );
                return None;
            }
        };

        let inputs = SizingInputs {
            sell_bid_qty: sell_book.bid_qty,
            buy_ask_qty: buy_book.ask_qty,
            available_base,
            available_quote,
            buy_taker_fee_pct: pair.taker_fee(direction.buy),
            ask_price: ask,
        };
        let amount = self.sizer.size(&pair.base_asset, &inputs);
        if !amount.is_positive() {
            debug!(
                "{}: non-positive amount for {}->{}",
                pair.symbol, direction.buy, direction.sell
            );
            return None;
        }

        let breakdown = profit_breakdown(
            direction.raw_spread,
            amount.0,
            ask,
            bid,
            pair.taker_fee(direction.buy),
            pair.taker_fee(direction.sell),
        );

        Some(Opportunity {
            id: Uuid::nil(),
            pair: pair.clone(),
            buy_venue: direction.buy,
            sell_venue: direction.sell,
            ask_price: Price(ask),
            bid_price: Price(bid),
            raw_spread: direction.raw_spread,
            traded_amount: amount,
            fee: breakdown.fee,
            net_profit: breakdown.net_profit,
            net_profit_pct: breakdown.net_profit_pct,
        })
    }
}
