//! HTTP plumbing shared by the venue clients: signing, status mapping and the
//! single bounded retry on timeouts.

use common::VenueError;
use exchange_client_trait::VenueResult;
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// API key pair for a venue.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Connection settings common to both venue clients.
#[derive(Debug, Clone)]
pub struct RestSettings {
    pub base_url: String,
    pub credentials: Credentials,
    pub recv_window_ms: u64,
    pub timeout: Duration,
}

/// A configured HTTP client for one venue.
#[derive(Clone)]
pub struct RestTransport {
    client: Client,
    settings: RestSettings,
}

impl RestTransport {
    pub fn new(settings: RestSettings) -> VenueResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| VenueError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn api_key(&self) -> &str {
        &self.settings.credentials.api_key
    }

    pub fn recv_window_ms(&self) -> u64 {
        self.settings.recv_window_ms
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// Hex HMAC-SHA256 of `payload` under this venue's secret.
    pub fn sign(&self, payload: &str) -> String {
        hmac_sha256_hex(&self.settings.credentials.secret_key, payload)
    }

    /// Sends the request and returns the body of a successful response.
    pub async fn send(&self, request: RequestBuilder, label: &str) -> VenueResult<String> {
        let response = request.send().await.map_err(|e| classify(e, label))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| classify(e, label))?;
        debug!(%label, %status, "venue response");

        if status.is_success() {
            Ok(body)
        } else if status.is_client_error() {
            Err(VenueError::Rejected(format!("{label}: HTTP {status}: {body}")))
        } else {
            Err(VenueError::Unavailable(format!("{label}: HTTP {status}: {body}")))
        }
    }
}

/// Hex-encoded HMAC-SHA256.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Decodes a JSON body into a typed response.
pub fn decode<T: DeserializeOwned>(body: &str, label: &str) -> VenueResult<T> {
    serde_json::from_str(body).map_err(|e| VenueError::InvalidPayload(format!("{label}: {e}")))
}

/// Runs `call`, and runs it exactly once more if the first attempt timed out.
pub async fn with_single_retry<T, F, Fut>(label: &str, mut call: F) -> VenueResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VenueResult<T>>,
{
    match call().await {
        Err(err) if err.is_timeout() => {
            warn!(%label, "request timed out, retrying once");
            call().await
        }
        other => other,
    }
}

fn classify(err: reqwest::Error, label: &str) -> VenueError {
    if err.is_timeout() {
        VenueError::Timeout(format!("{label}: {err}"))
    } else {
        VenueError::Unavailable(format!("{label}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_hmac_matches_reference_vector() {
        // Example from the Binance API documentation.
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let payload = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            hmac_sha256_hex(secret, payload),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_decode_reports_invalid_payload() {
        #[derive(serde::Deserialize, Debug)]
        struct Ticker {
            #[allow(dead_code)]
            symbol: String,
        }
        let err = decode::<Ticker>("{\"price\":\"1\"}", "ticker").unwrap_err();
        assert!(matches!(err, VenueError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_single_retry_on_timeout() {
        let attempts = AtomicUsize::new(0);
        let result: VenueResult<u32> = with_single_retry("test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(VenueError::Timeout("first".to_string()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_is_bounded_to_one_extra_attempt() {
        let attempts = AtomicUsize::new(0);
        let result: VenueResult<u32> = with_single_retry("test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(VenueError::Timeout("again".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(VenueError::Timeout(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_other_errors() {
        let attempts = AtomicUsize::new(0);
        let result: VenueResult<u32> = with_single_retry("test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(VenueError::Rejected("bad symbol".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(VenueError::Rejected(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let transport = RestTransport::new(RestSettings {
            base_url: "https://testnet.binancefuture.com/".to_string(),
            credentials: Credentials {
                api_key: "k".to_string(),
                secret_key: "s".to_string(),
            },
            recv_window_ms: 5000,
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(
            transport.url("/fapi/v1/exchangeInfo"),
            "https://testnet.binancefuture.com/fapi/v1/exchangeInfo"
        );
    }
}
