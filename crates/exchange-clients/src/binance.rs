//! USDⓈ-M futures REST client in the Binance dialect (upper-case order vocabulary).

use crate::transport::{decode, timestamp_ms, with_single_retry, RestSettings, RestTransport};
use async_trait::async_trait;
use common::types::{
    Asset, Balance, Candle, Instrument, OrderAck, Position, PositionSide, Price, Quantity,
    TopOfBook, Venue,
};
use common::VenueError;
use exchange_client_trait::{ExchangeClient, NativeOrder, VenueResult};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::info;

#[derive(Deserialize, Debug)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_asset: String,
    quote_asset: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CommissionRate {
    taker_commission_rate: Decimal,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    bid_price: Option<Decimal>,
    bid_qty: Option<Decimal>,
    ask_price: Option<Decimal>,
    ask_qty: Option<Decimal>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AssetBalance {
    asset: String,
    balance: Decimal,
    available_balance: Decimal,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PlacedOrder {
    order_id: i64,
    client_order_id: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: Decimal,
}

/// Venue client for a Binance-style futures API.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    transport: RestTransport,
    /// Venue slot this client fills; stamped on returned positions.
    venue: Venue,
}

impl BinanceFuturesClient {
    pub fn new(settings: RestSettings, venue: Venue) -> VenueResult<Self> {
        Ok(Self {
            transport: RestTransport::new(settings)?,
            venue,
        })
    }

    async fn public_get(&self, path: &str, params: &[(&str, String)]) -> VenueResult<String> {
        with_single_retry(path, move || async move {
            let request = self
                .transport
                .client()
                .get(self.transport.url(path))
                .query(params);
            self.transport.send(request, path).await
        })
        .await
    }

    /// Signs the query string and sends it; the timestamp is refreshed on retry.
    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> VenueResult<String> {
        with_single_retry(path, move || {
            let method = method.clone();
            async move {
                let mut all: Vec<(&str, String)> = params.to_vec();
                all.push(("recvWindow", self.transport.recv_window_ms().to_string()));
                all.push(("timestamp", timestamp_ms().to_string()));
                let query = serde_urlencoded::to_string(&all)
                    .map_err(|e| VenueError::InvalidPayload(format!("{path}: {e}")))?;
                let signature = self.transport.sign(&query);
                let url = format!(
                    "{}?{}&signature={}",
                    self.transport.url(path),
                    query,
                    signature
                );
                let request = self
                    .transport
                    .client()
                    .request(method, url)
                    .header("X-MBX-APIKEY", self.transport.api_key());
                self.transport.send(request, path).await
            }
        })
        .await
    }
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    fn id(&self) -> &'static str {
        "binance-futures"
    }

    async fn instruments(&self) -> VenueResult<Vec<Instrument>> {
        let path = "/fapi/v1/exchangeInfo";
        let info: ExchangeInfo = decode(&self.public_get(path, &[]).await?, path)?;
        Ok(info
            .symbols
            .into_iter()
            .map(|s| Instrument {
                symbol: s.symbol,
                base_asset: Asset::from(s.base_asset.as_str()),
                quote_asset: Asset::from(s.quote_asset.as_str()),
            })
            .collect())
    }

    async fn taker_fee(&self, symbol: &str) -> VenueResult<Decimal> {
        let path = "/fapi/v1/commissionRate";
        let body = self
            .signed(Method::GET, path, &[("symbol", symbol.to_string())])
            .await?;
        let rate: CommissionRate = decode(&body, path)?;
        Ok(rate.taker_commission_rate * Decimal::ONE_HUNDRED)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> VenueResult<()> {
        let path = "/fapi/v1/leverage";
        self.signed(
            Method::POST,
            path,
            &[
                ("symbol", symbol.to_string()),
                ("leverage", leverage.to_string()),
            ],
        )
        .await?;
        info!(venue = %self.venue, %symbol, leverage, "leverage set");
        Ok(())
    }

    async fn top_of_book(&self, symbol: &str) -> VenueResult<TopOfBook> {
        let path = "/fapi/v1/ticker/bookTicker";
        let body = self
            .public_get(path, &[("symbol", symbol.to_string())])
            .await?;
        let ticker: BookTicker = decode(&body, path)?;
        match (
            ticker.bid_price,
            ticker.ask_price,
            ticker.bid_qty,
            ticker.ask_qty,
        ) {
            (Some(bid_price), Some(ask_price), Some(bid_qty), Some(ask_qty)) => Ok(TopOfBook {
                bid_price: Price(bid_price),
                ask_price: Price(ask_price),
                bid_qty: Quantity(bid_qty),
                ask_qty: Quantity(ask_qty),
            }),
            _ => Err(VenueError::InvalidPayload(format!(
                "{path}: missing best bid/ask for {symbol}"
            ))),
        }
    }

    async fn balances(&self) -> VenueResult<Vec<Balance>> {
        let path = "/fapi/v2/balance";
        let rows: Vec<AssetBalance> = decode(&self.signed(Method::GET, path, &[]).await?, path)?;
        Ok(rows
            .into_iter()
            .map(|row| Balance {
                asset: Asset::from(row.asset.as_str()),
                available: row.available_balance,
                total: row.balance,
            })
            .collect())
    }

    async fn place_order(&self, order: &NativeOrder) -> VenueResult<OrderAck> {
        let path = "/fapi/v1/order";
        let body = self
            .signed(
                Method::POST,
                path,
                &[
                    ("symbol", order.symbol.clone()),
                    ("side", order.side.to_string()),
                    ("type", order.order_type.to_string()),
                    ("quantity", order.quantity.0.normalize().to_string()),
                    ("price", order.price.0.normalize().to_string()),
                    ("timeInForce", "GTC".to_string()),
                    ("newClientOrderId", order.client_order_id.clone()),
                ],
            )
            .await?;
        let placed: PlacedOrder = decode(&body, path)?;
        info!(
            venue = %self.venue,
            symbol = %order.symbol,
            side = order.side,
            quantity = %order.quantity,
            price = %order.price,
            order_id = placed.order_id,
            "order placed"
        );
        Ok(OrderAck {
            order_id: placed.order_id.to_string(),
            client_order_id: placed.client_order_id,
        })
    }

    async fn open_positions(&self, symbol: &str) -> VenueResult<Vec<Position>> {
        let path = "/fapi/v2/positionRisk";
        let body = self
            .signed(Method::GET, path, &[("symbol", symbol.to_string())])
            .await?;
        let rows: Vec<PositionRisk> = decode(&body, path)?;
        Ok(rows
            .into_iter()
            .map(|row| position_from_amount(self.venue, row.symbol, row.position_amt))
            .collect())
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        limit: u32,
    ) -> VenueResult<Vec<Candle>> {
        let path = "/fapi/v1/klines";
        let body = self
            .public_get(
                path,
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("startTime", start_ms.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let rows: Vec<Vec<Value>> = decode(&body, path)?;
        rows.iter().map(|row| candle_from_row(row, path)).collect()
    }
}

/// A signed position amount: negative is short, positive is long.
fn position_from_amount(venue: Venue, symbol: String, amount: Decimal) -> Position {
    let side = if amount.is_sign_negative() {
        PositionSide::Short
    } else {
        PositionSide::Long
    };
    Position {
        venue,
        symbol,
        side,
        size: Quantity(amount.abs()),
    }
}

/// Kline rows are `[openTime, open, high, low, close, volume, closeTime, ...]`.
fn candle_from_row(row: &[Value], label: &str) -> VenueResult<Candle> {
    let invalid = || VenueError::InvalidPayload(format!("{label}: malformed kline row"));
    if row.len() < 6 {
        return Err(invalid());
    }
    let open_time_ms = row[0].as_i64().ok_or_else(invalid)?;
    let field = |i: usize| -> VenueResult<Decimal> {
        row[i]
            .as_str()
            .and_then(|s| Decimal::from_str(s).ok())
            .ok_or_else(invalid)
    };
    Ok(Candle {
        open_time_ms,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}
