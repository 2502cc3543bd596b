//! In-memory [`ExchangeClient`] for tests across the workspace.
//!
//! Enabled by the `fake` feature; every response is served from state the
//! test sets up, and every order is recorded.

use crate::{ExchangeClient, NativeOrder, VenueResult};
use async_trait::async_trait;
use common::types::{
    Asset, Balance, Candle, Instrument, OrderAck, Position, PositionSide, Price, Quantity,
    TopOfBook, Venue,
};
use common::VenueError;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct FakeState {
    instruments: Vec<Instrument>,
    fees: HashMap<String, Decimal>,
    books: HashMap<String, TopOfBook>,
    balances: Vec<Balance>,
    pending_balances: Vec<Balance>,
    positions: HashMap<String, Vec<Position>>,
    candles: HashMap<String, Vec<Candle>>,
    orders: Vec<NativeOrder>,
    leverage_calls: Vec<(String, u32)>,
    reject_orders: bool,
    fail_leverage: bool,
    fail_balances: bool,
    balance_calls: usize,
}

/// A scripted venue.
#[derive(Debug)]
pub struct FakeVenue {
    id: &'static str,
    venue: Venue,
    state: Mutex<FakeState>,
}

impl FakeVenue {
    pub fn new(id: &'static str, venue: Venue) -> Self {
        Self {
            id,
            venue,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Lists `symbol` with the given assets and taker fee (percent).
    pub fn with_instrument(self, symbol: &str, base: &str, quote: &str, fee_pct: Decimal) -> Self {
        {
            let mut state = self.state.lock();
            state.instruments.push(Instrument {
                symbol: symbol.to_string(),
                base_asset: Asset::from(base),
                quote_asset: Asset::from(quote),
            });
            state.fees.insert(symbol.to_string(), fee_pct);
        }
        self
    }

    /// Lists `symbol` without a queryable fee.
    pub fn with_unpriced_instrument(self, symbol: &str, base: &str, quote: &str) -> Self {
        self.state.lock().instruments.push(Instrument {
            symbol: symbol.to_string(),
            base_asset: Asset::from(base),
            quote_asset: Asset::from(quote),
        });
        self
    }

    pub fn set_book(&self, symbol: &str, bid: Decimal, ask: Decimal, bid_qty: Decimal, ask_qty: Decimal) {
        self.state.lock().books.insert(
            symbol.to_string(),
            TopOfBook {
                bid_price: Price(bid),
                ask_price: Price(ask),
                bid_qty: Quantity(bid_qty),
                ask_qty: Quantity(ask_qty),
            },
        );
    }

    /// Sets both the available and total balance of `asset`.
    pub fn set_balance(&self, asset: &str, amount: Decimal) {
        let asset = Asset::from(asset);
        let mut state = self.state.lock();
        state.balances.retain(|b| b.asset != asset);
        state.balances.push(Balance {
            asset,
            available: amount,
            total: amount,
        });
    }

    /// Like [`FakeVenue::set_balance`], but only after the next successful
    /// balance fetch has been answered with the current amount.
    pub fn set_balance_after_next_fetch(&self, asset: &str, amount: Decimal) {
        self.state.lock().pending_balances.push(Balance {
            asset: Asset::from(asset),
            available: amount,
            total: amount,
        });
    }

    /// Replaces the reported position on `symbol`. A signed size: negative is short.
    pub fn set_position(&self, symbol: &str, signed_size: Decimal) {
        let side = if signed_size.is_sign_negative() {
            PositionSide::Short
        } else {
            PositionSide::Long
        };
        let position = Position {
            venue: self.venue,
            symbol: symbol.to_string(),
            side,
            size: Quantity(signed_size.abs()),
        };
        self.state
            .lock()
            .positions
            .insert(symbol.to_string(), vec![position]);
    }

    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.state.lock().candles.insert(symbol.to_string(), candles);
    }

    pub fn reject_orders(&self, reject: bool) {
        self.state.lock().reject_orders = reject;
    }

    pub fn fail_leverage(&self, fail: bool) {
        self.state.lock().fail_leverage = fail;
    }

    pub fn fail_balances(&self, fail: bool) {
        self.state.lock().fail_balances = fail;
    }

    /// Every order received so far, rejected ones included.
    pub fn orders(&self) -> Vec<NativeOrder> {
        self.state.lock().orders.clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.state.lock().leverage_calls.clone()
    }

    pub fn balance_calls(&self) -> usize {
        self.state.lock().balance_calls
    }
}

#[async_trait]
impl ExchangeClient for FakeVenue {
    fn id(&self) -> &'static str {
        self.id
    }

    async fn instruments(&self) -> VenueResult<Vec<Instrument>> {
        Ok(self.state.lock().instruments.clone())
    }

    async fn taker_fee(&self, symbol: &str) -> VenueResult<Decimal> {
        self.state
            .lock()
            .fees
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::InvalidPayload(format!("no fee for {symbol}")))
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> VenueResult<()> {
        let mut state = self.state.lock();
        state.leverage_calls.push((symbol.to_string(), leverage));
        if state.fail_leverage {
            return Err(VenueError::Rejected("leverage refused".to_string()));
        }
        Ok(())
    }

    async fn top_of_book(&self, symbol: &str) -> VenueResult<TopOfBook> {
        self.state
            .lock()
            .books
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::Unavailable(format!("no book for {symbol}")))
    }

    async fn balances(&self) -> VenueResult<Vec<Balance>> {
        let mut state = self.state.lock();
        state.balance_calls += 1;
        if state.fail_balances {
            return Err(VenueError::Unavailable("balances down".to_string()));
        }
        let reported = state.balances.clone();
        let pending = std::mem::take(&mut state.pending_balances);
        for balance in pending {
            state.balances.retain(|b| b.asset != balance.asset);
            state.balances.push(balance);
        }
        Ok(reported)
    }

    async fn place_order(&self, order: &NativeOrder) -> VenueResult<OrderAck> {
        let mut state = self.state.lock();
        state.orders.push(order.clone());
        if state.reject_orders {
            return Err(VenueError::Rejected("order refused".to_string()));
        }
        Ok(OrderAck {
            order_id: state.orders.len().to_string(),
            client_order_id: order.client_order_id.clone(),
        })
    }

    async fn open_positions(&self, symbol: &str) -> VenueResult<Vec<Position>> {
        Ok(self
            .state
            .lock()
            .positions
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        _interval: &str,
        _start_ms: i64,
        limit: u32,
    ) -> VenueResult<Vec<Candle>> {
        let state = self.state.lock();
        let candles = state.candles.get(symbol).cloned().unwrap_or_default();
        let skip = candles.len().saturating_sub(limit as usize);
        Ok(candles.into_iter().skip(skip).collect())
    }
}
