//! REST clients for the two venues the engine trades on.
//!
//! [`BinanceFuturesClient`] speaks the Binance USDⓈ-M futures dialect and
//! [`BybitClient`] the Bybit v5 one. Both share [`transport::RestTransport`] for
//! signing, status mapping and the single retry on timeout, and both convert
//! wire payloads into `common` types before returning.

pub mod binance;
pub mod bybit;
pub mod transport;

pub use binance::BinanceFuturesClient;
pub use bybit::BybitClient;
pub use transport::{Credentials, RestSettings};
