//! Trade sizing from book depth, balances and per-asset ceilings.

use common::types::{Asset, Balance, Quantity, Venue};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Configuration for trade sizing.
#[derive(Debug, Clone)]
pub struct SizingConfig {
    /// Largest amount of a base asset traded in one opportunity.
    /// Assets without an entry are not capped.
    pub ceilings: HashMap<Asset, Decimal>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        let mut ceilings = HashMap::new();
        ceilings.insert(Asset::from("BTC"), dec!(0.33));
        ceilings.insert(Asset::from("ETH"), dec!(5));
        Self { ceilings }
    }
}

/// Available balances per venue and asset, taken from the latest balance fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceSheet {
    available: HashMap<(Venue, Asset), Decimal>,
}

impl BalanceSheet {
    pub fn from_balances(venue_a: &[Balance], venue_b: &[Balance]) -> Self {
        let mut sheet = Self::default();
        sheet.replace(Venue::A, venue_a);
        sheet.replace(Venue::B, venue_b);
        sheet
    }

    /// Replaces everything known about `venue` with the given balances.
    pub fn replace(&mut self, venue: Venue, balances: &[Balance]) {
        self.available.retain(|(v, _), _| *v != venue);
        for balance in balances {
            self.available
                .insert((venue, balance.asset.clone()), balance.available);
        }
    }

    pub fn available(&self, venue: Venue, asset: &Asset) -> Option<Decimal> {
        self.available.get(&(venue, asset.clone())).copied()
    }
}

/// Everything the sizer needs for one direction of one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingInputs {
    /// Resting quantity at the best bid on the selling venue.
    pub sell_bid_qty: Quantity,
    /// Resting quantity at the best ask on the buying venue.
    pub buy_ask_qty: Quantity,
    /// Base asset available on the selling venue.
    pub available_base: Decimal,
    /// Quote asset available on the buying venue.
    pub available_quote: Decimal,
    /// Buying venue's taker fee, in percent.
    pub buy_taker_fee_pct: Decimal,
    pub ask_price: Decimal,
}

/// Trade sizing calculator.
#[derive(Debug, Clone, Default)]
pub struct TradeSizer {
    config: SizingConfig,
}

impl TradeSizer {
    /// Creates a new trade sizer with the given configuration.
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Creates a new trade sizer with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SizingConfig::default())
    }

    pub fn ceiling(&self, asset: &Asset) -> Option<Decimal> {
        self.config.ceilings.get(asset).copied()
    }

    /// Caps `amount` at the asset's ceiling. Never rejects.
    pub fn clamp(&self, asset: &Asset, amount: Quantity) -> Quantity {
        match self.ceiling(asset) {
            Some(ceiling) if amount.0 > ceiling => Quantity(ceiling),
            _ => amount,
        }
    }

    /// Largest amount both books and both balances can carry, clamped to the ceiling.
    ///
    /// `min(bid_qty, ask_qty, base, quote / ((1 + fee) * ask))`, where the fee
    /// is converted from percent to a fraction. A non-positive ask yields zero.
    pub fn size(&self, base_asset: &Asset, inputs: &SizingInputs) -> Quantity {
        let fee_fraction = inputs.buy_taker_fee_pct / Decimal::ONE_HUNDRED;
        let unit_cost = (Decimal::ONE + fee_fraction) * inputs.ask_price;
        if unit_cost <= Decimal::ZERO {
            return Quantity::ZERO;
        }
        let affordable = inputs.available_quote / unit_cost;

        let amount = [
            inputs.sell_bid_qty.0,
            inputs.buy_ask_qty.0,
            inputs.available_base,
            affordable,
        ]
        .into_iter()
        .fold(Decimal::MAX, Decimal::min)
        .max(Decimal::ZERO);

        self.clamp(base_asset, Quantity(amount))
    }
}
