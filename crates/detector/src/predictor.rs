//! Candle features and the HTTP-backed opportunity predictor.

use crate::evaluator::{Direction, RawSpreads};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::traits::OpportunityPredictor;
use common::types::{Candle, FeatureVector, Prediction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

/// Number of candles per venue the feature vector is built from.
pub const CANDLES_PER_VENUE: u32 = 2;

/// The two most recent candles of one venue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleWindow {
    pub previous: Candle,
    pub latest: Candle,
}

impl CandleWindow {
    /// Takes the last two candles of an ascending series.
    pub fn from_series(candles: &[Candle]) -> Option<Self> {
        match candles {
            [.., previous, latest] => Some(Self {
                previous: *previous,
                latest: *latest,
            }),
            _ => None,
        }
    }

    /// `(latest.open - previous.open) / previous.open * 100`.
    pub fn open_change_pct(&self) -> Option<Decimal> {
        if self.previous.open.is_zero() {
            return None;
        }
        Some((self.latest.open - self.previous.open) / self.previous.open * Decimal::ONE_HUNDRED)
    }
}

/// `[now_ms, a.open, a.high, a.low, a.close, a.volume, b.open, .., b.volume, a_change, b_change]`
/// from the latest candle of each venue.
pub fn build_features(now_ms: i64, a: &CandleWindow, b: &CandleWindow) -> Option<FeatureVector> {
    let mut features = vec![now_ms as f64];
    for window in [a, b] {
        let c = &window.latest;
        for value in [c.open, c.high, c.low, c.close, c.volume] {
            features.push(value.to_f64()?);
        }
    }
    features.push(a.open_change_pct()?.to_f64()?);
    features.push(b.open_change_pct()?.to_f64()?);
    Some(FeatureVector(features))
}

/// Directions implied by the latest candle opens, with the same tie-break as quotes.
pub fn candle_directions(a: &CandleWindow, b: &CandleWindow) -> Vec<Direction> {
    let (open_a, open_b) = (a.latest.open, b.latest.open);
    RawSpreads::from_prices(open_a, open_a, open_b, open_b).directions()
}

/// Length of a kline interval such as `1m`, `4h` or `1d`, in milliseconds.
pub fn interval_millis(interval: &str) -> Option<i64> {
    let split = interval.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = interval.split_at(split);
    let count: i64 = count.parse().ok()?;
    let unit_ms = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 604_800_000,
        _ => return None,
    };
    Some(count * unit_ms)
}

/// Posts the feature vector to a model server and reads `{"will_be_profitable": bool}`.
pub struct HttpPredictor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPredictor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build predictor HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl OpportunityPredictor for HttpPredictor {
    async fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(features)
            .send()
            .await
            .with_context(|| format!("predictor request to {} failed", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("predictor returned {}: {}", status, body));
        }

        response
            .json::<Prediction>()
            .await
            .context("failed to parse predictor response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::Venue;
    use rust_decimal_macros::dec;

    fn candle(open_time_ms: i64, open: Decimal) -> Candle {
        Candle {
            open_time_ms,
            open,
            high: open + dec!(2),
            low: open - dec!(2),
            close: open + dec!(1),
            volume: dec!(10),
        }
    }

    #[test]
    fn test_window_takes_last_two() {
        let series = [
            candle(0, dec!(100)),
            candle(60_000, dec!(101)),
            candle(120_000, dec!(102)),
        ];
        let window = CandleWindow::from_series(&series).unwrap();
        assert_eq!(window.previous.open, dec!(101));
        assert_eq!(window.latest.open, dec!(102));
        assert!(CandleWindow::from_series(&series[..1]).is_none());
    }

    #[test]
    fn test_feature_layout() {
        let a = CandleWindow::from_series(&[candle(0, dec!(100)), candle(60_000, dec!(110))]).unwrap();
        let b = CandleWindow::from_series(&[candle(0, dec!(200)), candle(60_000, dec!(190))]).unwrap();
        let features = build_features(1_700_000_000_000, &a, &b).unwrap();

        assert_eq!(features.0.len(), 13);
        assert_eq!(features.0[0], 1_700_000_000_000.0);
        assert_eq!(features.0[1], 110.0);
        assert_eq!(features.0[6], 190.0);
        assert_eq!(features.0[11], 10.0);
        assert_eq!(features.0[12], -5.0);
    }

    #[test]
    fn test_zero_previous_open_has_no_features() {
        let a = CandleWindow::from_series(&[candle(0, dec!(0)), candle(60_000, dec!(1))]).unwrap();
        let b = CandleWindow::from_series(&[candle(0, dec!(1)), candle(60_000, dec!(1))]).unwrap();
        assert!(build_features(0, &a, &b).is_none());
    }

    #[test]
    fn test_candle_directions_buy_cheaper_open() {
        let a = CandleWindow::from_series(&[candle(0, dec!(100)), candle(60_000, dec!(100))]).unwrap();
        let b = CandleWindow::from_series(&[candle(0, dec!(101)), candle(60_000, dec!(101))]).unwrap();
        let directions = candle_directions(&a, &b);
        assert_eq!(directions.len(), 1);
        assert_eq!(directions[0].buy, Venue::A);
        assert_eq!(directions[0].sell, Venue::B);
    }

    #[test]
    fn test_interval_millis() {
        assert_eq!(interval_millis("1m"), Some(60_000));
        assert_eq!(interval_millis("4h"), Some(14_400_000));
        assert_eq!(interval_millis("1d"), Some(86_400_000));
        assert_eq!(interval_millis("m"), None);
        assert_eq!(interval_millis("5x"), None);
    }
}
