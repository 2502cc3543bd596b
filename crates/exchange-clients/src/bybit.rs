//! Linear-perpetual REST client in the Bybit v5 dialect (title-case order vocabulary).

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
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{debug, info};

const CATEGORY: &str = "linear";
const ACCOUNT_TYPE: &str = "UNIFIED";
/// Returned by set-leverage when the requested leverage is already in place.
const LEVERAGE_NOT_MODIFIED: i64 = 110043;
const INSTRUMENT_PAGE_LIMIT: u32 = 1000;
/// Upper bound on instrument pages, in case a cursor never terminates.
const MAX_INSTRUMENT_PAGES: usize = 20;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InstrumentPage {
    list: Vec<InstrumentInfo>,
    #[serde(default)]
    next_page_cursor: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InstrumentInfo {
    symbol: String,
    base_coin: String,
    quote_coin: String,
}

#[derive(Deserialize, Debug)]
struct ListResult<T> {
    list: Vec<T>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FeeRate {
    symbol: String,
    taker_fee_rate: Decimal,
}

#[derive(Deserialize, Debug)]
struct OrderBook {
    #[serde(default)]
    b: Vec<[String; 2]>,
    #[serde(default)]
    a: Vec<[String; 2]>,
}

#[derive(Deserialize, Debug)]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<WalletCoin>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WalletCoin {
    coin: String,
    #[serde(default)]
    wallet_balance: String,
    #[serde(default)]
    available_to_withdraw: String,
    #[serde(default)]
    locked: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreatedOrder {
    order_id: String,
    order_link_id: String,
}

#[derive(Deserialize, Debug)]
struct PositionInfo {
    symbol: String,
    side: String,
    size: Decimal,
}

/// Venue client for a Bybit-style v5 API.
#[derive(Clone)]
pub struct BybitClient {
    transport: RestTransport,
    venue: Venue,
}

impl BybitClient {
    pub fn new(settings: RestSettings, venue: Venue) -> VenueResult<Self> {
        Ok(Self {
            transport: RestTransport::new(settings)?,
            venue,
        })
    }

    async fn public_get(&self, path: &str, params: &[(&str, String)]) -> VenueResult<Envelope> {
        let body = with_single_retry(path, move || async move {
            let request = self
                .transport
                .client()
                .get(self.transport.url(path))
                .query(params);
            self.transport.send(request, path).await
        })
        .await?;
        decode(&body, path)
    }

    /// Signed GET. The signature covers the exact query string that is sent.
    async fn signed_get(&self, path: &str, params: &[(&str, String)]) -> VenueResult<Envelope> {
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| VenueError::InvalidPayload(format!("{path}: {e}")))?;
        let body = with_single_retry(path, move || {
            let query = query.clone();
            async move {
                let url = if query.is_empty() {
                    self.transport.url(path)
                } else {
                    format!("{}?{}", self.transport.url(path), query)
                };
                let request = self.transport.client().request(Method::GET, url);
                self.transport
                    .send(self.authenticate(request, &query), path)
                    .await
            }
        })
        .await?;
        decode(&body, path)
    }

    /// Signed POST with a JSON body. The signature covers the serialized body.
    async fn signed_post(&self, path: &str, payload: &Value) -> VenueResult<Envelope> {
        let payload = payload.to_string();
        let body = with_single_retry(path, move || {
            let payload = payload.clone();
            async move {
                let request = self
                    .transport
                    .client()
                    .request(Method::POST, self.transport.url(path))
                    .header("Content-Type", "application/json");
                let request = self.authenticate(request, &payload).body(payload);
                self.transport.send(request, path).await
            }
        })
        .await?;
        decode(&body, path)
    }

    fn authenticate(
        &self,
        request: reqwest::RequestBuilder,
        payload: &str,
    ) -> reqwest::RequestBuilder {
        let timestamp = timestamp_ms().to_string();
        let recv_window = self.transport.recv_window_ms().to_string();
        let signature = self.transport.sign(&signature_payload(
            &timestamp,
            self.transport.api_key(),
            &recv_window,
            payload,
        ));
        request
            .header("X-BAPI-API-KEY", self.transport.api_key())
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-SIGN-TYPE", "2")
            .header("X-BAPI-TIMESTAMP", timestamp)
            .header("X-BAPI-RECV-WINDOW", recv_window)
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn id(&self) -> &'static str {
        "bybit"
    }

    async fn instruments(&self) -> VenueResult<Vec<Instrument>> {
        let path = "/v5/market/instruments-info";
        let mut instruments = Vec::new();
        let mut cursor = String::new();
        for _ in 0..MAX_INSTRUMENT_PAGES {
            let mut params = vec![
                ("category", CATEGORY.to_string()),
                ("limit", INSTRUMENT_PAGE_LIMIT.to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let page: InstrumentPage = result_of(self.public_get(path, &params).await?, path)?;
            instruments.extend(page.list.into_iter().map(|i| Instrument {
                symbol: i.symbol,
                base_asset: Asset::from(i.base_coin.as_str()),
                quote_asset: Asset::from(i.quote_coin.as_str()),
            }));
            if page.next_page_cursor.is_empty() {
                break;
            }
            cursor = page.next_page_cursor;
        }
        debug!(venue = %self.venue, count = instruments.len(), "instruments listed");
        Ok(instruments)
    }

    async fn taker_fee(&self, symbol: &str) -> VenueResult<Decimal> {
        let path = "/v5/account/fee-rate";
        let envelope = self
            .signed_get(
                path,
                &[
                    ("category", CATEGORY.to_string()),
                    ("symbol", symbol.to_string()),
                ],
            )
            .await?;
        let rates: ListResult<FeeRate> = result_of(envelope, path)?;
        rates
            .list
            .into_iter()
            .find(|rate| rate.symbol == symbol)
            .map(|rate| rate.taker_fee_rate * Decimal::ONE_HUNDRED)
            .ok_or_else(|| VenueError::InvalidPayload(format!("{path}: no fee rate for {symbol}")))
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> VenueResult<()> {
        let path = "/v5/position/set-leverage";
        let payload = json!({
            "category": CATEGORY,
            "symbol": symbol,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        let envelope = self.signed_post(path, &payload).await?;
        if envelope.ret_code != LEVERAGE_NOT_MODIFIED {
            check_envelope(&envelope, path)?;
        }
        info!(venue = %self.venue, %symbol, leverage, "leverage set");
        Ok(())
    }

    async fn top_of_book(&self, symbol: &str) -> VenueResult<TopOfBook> {
        let path = "/v5/market/orderbook";
        let envelope = self
            .public_get(
                path,
                &[
                    ("category", CATEGORY.to_string()),
                    ("symbol", symbol.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        let book: OrderBook = result_of(envelope, path)?;
        book_to_top(&book, path)
    }

    async fn balances(&self) -> VenueResult<Vec<Balance>> {
        let path = "/v5/account/wallet-balance";
        let envelope = self
            .signed_get(path, &[("accountType", ACCOUNT_TYPE.to_string())])
            .await?;
        let accounts: ListResult<WalletAccount> = result_of(envelope, path)?;
        accounts
            .list
            .iter()
            .flat_map(|account| account.coin.iter())
            .map(|coin| coin_to_balance(coin, path))
            .collect()
    }

    async fn place_order(&self, order: &NativeOrder) -> VenueResult<OrderAck> {
        let path = "/v5/order/create";
        let payload = json!({
            "category": CATEGORY,
            "symbol": order.symbol,
            "side": order.side,
            "orderType": order.order_type,
            "qty": order.quantity.0.normalize().to_string(),
            "price": order.price.0.normalize().to_string(),
            "timeInForce": "GTC",
            "orderLinkId": order.client_order_id,
        });
        let created: CreatedOrder = result_of(self.signed_post(path, &payload).await?, path)?;
        info!(
            venue = %self.venue,
            symbol = %order.symbol,
            side = order.side,
            quantity = %order.quantity,
            price = %order.price,
            order_id = %created.order_id,
            "order placed"
        );
        Ok(OrderAck {
            order_id: created.order_id,
            client_order_id: created.order_link_id,
        })
    }

    async fn open_positions(&self, symbol: &str) -> VenueResult<Vec<Position>> {
        let path = "/v5/position/list";
        let envelope = self
            .signed_get(
                path,
                &[
                    ("category", CATEGORY.to_string()),
                    ("symbol", symbol.to_string()),
                ],
            )
            .await?;
        let positions: ListResult<PositionInfo> = result_of(envelope, path)?;
        Ok(positions
            .list
            .into_iter()
            .map(|p| position_from_side(self.venue, p))
            .collect())
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        limit: u32,
    ) -> VenueResult<Vec<Candle>> {
        let path = "/v5/market/kline";
        let native_interval = kline_interval(interval).ok_or_else(|| {
            VenueError::Rejected(format!("{path}: unsupported interval {interval}"))
        })?;
        let envelope = self
            .public_get(
                path,
                &[
                    ("category", CATEGORY.to_string()),
                    ("symbol", symbol.to_string()),
                    ("interval", native_interval.to_string()),
                    ("start", start_ms.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let rows: ListResult<Vec<String>> = result_of(envelope, path)?;
        let mut candles = rows
            .list
            .iter()
            .map(|row| candle_from_row(row, path))
            .collect::<VenueResult<Vec<_>>>()?;
        // The venue returns newest first.
        candles.sort_by_key(|c| c.open_time_ms);
        Ok(candles)
    }
}

/// `timestamp + api_key + recv_window + payload`.
fn signature_payload(timestamp: &str, api_key: &str, recv_window: &str, payload: &str) -> String {
    format!("{timestamp}{api_key}{recv_window}{payload}")
}

fn check_envelope(envelope: &Envelope, label: &str) -> VenueResult<()> {
    if envelope.ret_code == 0 {
        Ok(())
    } else {
        Err(VenueError::Rejected(format!(
            "{label}: retCode {}: {}",
            envelope.ret_code, envelope.ret_msg
        )))
    }
}

/// Checks the envelope and decodes its `result` member.
fn result_of<T: DeserializeOwned>(envelope: Envelope, label: &str) -> VenueResult<T> {
    check_envelope(&envelope, label)?;
    serde_json::from_value(envelope.result)
        .map_err(|e| VenueError::InvalidPayload(format!("{label}: {e}")))
}

fn book_to_top(book: &OrderBook, label: &str) -> VenueResult<TopOfBook> {
    let (bid, ask) = match (book.b.first(), book.a.first()) {
        (Some(bid), Some(ask)) => (bid, ask),
        _ => {
            return Err(VenueError::InvalidPayload(format!(
                "{label}: missing best bid/ask"
            )))
        }
    };
    Ok(TopOfBook {
        bid_price: Price(parse_decimal(&bid[0], label)?),
        bid_qty: Quantity(parse_decimal(&bid[1], label)?),
        ask_price: Price(parse_decimal(&ask[0], label)?),
        ask_qty: Quantity(parse_decimal(&ask[1], label)?),
    })
}

/// Unified accounts may leave `availableToWithdraw` empty; fall back to
/// wallet balance minus locked funds.
fn coin_to_balance(coin: &WalletCoin, label: &str) -> VenueResult<Balance> {
    let total = parse_or_zero(&coin.wallet_balance, label)?;
    let available = if coin.available_to_withdraw.is_empty() {
        total - parse_or_zero(&coin.locked, label)?
    } else {
        parse_decimal(&coin.available_to_withdraw, label)?
    };
    Ok(Balance {
        asset: Asset::from(coin.coin.as_str()),
        available,
        total,
    })
}

/// `side` is `Buy`, `Sell` or empty for a flat position.
fn position_from_side(venue: Venue, info: PositionInfo) -> Position {
    let side = if info.side == "Sell" {
        PositionSide::Short
    } else {
        PositionSide::Long
    };
    Position {
        venue,
        symbol: info.symbol,
        side,
        size: Quantity(info.size.abs()),
    }
}

/// Kline rows are `[startTime, open, high, low, close, volume, turnover]`, all strings.
fn candle_from_row(row: &[String], label: &str) -> VenueResult<Candle> {
    if row.len() < 6 {
        return Err(VenueError::InvalidPayload(format!(
            "{label}: malformed kline row"
        )));
    }
    let open_time_ms = row[0]
        .parse::<i64>()
        .map_err(|e| VenueError::InvalidPayload(format!("{label}: {e}")))?;
    Ok(Candle {
        open_time_ms,
        open: parse_decimal(&row[1], label)?,
        high: parse_decimal(&row[2], label)?,
        low: parse_decimal(&row[3], label)?,
        close: parse_decimal(&row[4], label)?,
        volume: parse_decimal(&row[5], label)?,
    })
}

/// Maps the Binance-style interval notation used in configuration to the v5 one.
fn kline_interval(interval: &str) -> Option<&'static str> {
    Some(match interval {
        "1m" => "1",
        "3m" => "3",
        "5m" => "5",
        "15m" => "15",
        "30m" => "30",
        "1h" => "60",
        "2h" => "120",
        "4h" => "240",
        "6h" => "360",
        "12h" => "720",
        "1d" => "D",
        "1w" => "W",
        "1M" => "M",
        _ => return None,
    })
}

fn parse_decimal(raw: &str, label: &str) -> VenueResult<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| VenueError::InvalidPayload(format!("{label}: bad number {raw:?}: {e}")))
}

fn parse_or_zero(raw: &str, label: &str) -> VenueResult<Decimal> {
    if raw.is_empty() {
        Ok(Decimal::ZERO)
    } else {
        parse_decimal(raw, label)
    }
}
