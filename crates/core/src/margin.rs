//! Margin re-verification right before execution.

use anyhow::Result;
use async_trait::async_trait;
use common::traits::IsMarginGuard;
use common::types::{Asset, Balance, MarginVerdict, Opportunity, Quantity};
use detector::TradeSizer;
use exchange_client_trait::Venues;
use rust_decimal::Decimal;

/// Checks free collateral on both legs against freshly fetched balances.
#[derive(Debug, Clone)]
pub struct MarginGuard {
    venues: Venues,
    sizer: TradeSizer,
}

impl MarginGuard {
    pub fn new(venues: Venues, sizer: TradeSizer) -> Self {
        Self { venues, sizer }
    }

    fn insufficient(&self, opportunity: &Opportunity, amount: Quantity, reason: &str) -> MarginVerdict {
        log::warn!(
            "Margin check FAILED for {} ({} -> {}): {}",
            opportunity.pair.symbol,
            opportunity.buy_venue,
            opportunity.sell_venue,
            reason
        );
        MarginVerdict {
            sufficient: false,
            traded_amount: amount,
        }
    }
}

fn available(balances: &[Balance], asset: &Asset) -> Option<Decimal> {
    balances
        .iter()
        .find(|b| &b.asset == asset)
        .map(|b| b.available)
}

#[async_trait]
impl IsMarginGuard for MarginGuard {
    async fn check_margin(&self, opportunity: &Opportunity) -> Result<MarginVerdict> {
        let pair = &opportunity.pair;
        let amount = self.sizer.clamp(&pair.base_asset, opportunity.traded_amount);

        let buy = self.venues.get(opportunity.buy_venue);
        let sell = self.venues.get(opportunity.sell_venue);
        let (buy_balances, sell_balances) =
            tokio::join!(buy.client.balances(), sell.client.balances());

        let buy_balances = match buy_balances {
            Ok(balances) => balances,
            Err(e) => {
                let reason = format!("balances unavailable on {}: {}", buy.venue, e);
                return Ok(self.insufficient(opportunity, amount, &reason));
            }
        };
        let sell_balances = match sell_balances {
            Ok(balances) => balances,
            Err(e) => {
                let reason = format!("balances unavailable on {}: {}", sell.venue, e);
                return Ok(self.insufficient(opportunity, amount, &reason));
            }
        };

        let required_quote = amount.0 * opportunity.ask_price.0;
        let Some(quote) = available(&buy_balances, &pair.quote_asset) else {
            let reason = format!("no {} balance on {}", pair.quote_asset, buy.venue);
            return Ok(self.insufficient(opportunity, amount, &reason));
        };
        if quote < required_quote {
            let reason = format!(
                "{} {} available on {}, {} required",
                quote, pair.quote_asset, buy.venue, required_quote
            );
            return Ok(self.insufficient(opportunity, amount, &reason));
        }

        let Some(base) = available(&sell_balances, &pair.base_asset) else {
            let reason = format!("no {} balance on {}", pair.base_asset, sell.venue);
            return Ok(self.insufficient(opportunity, amount, &reason));
        };
        if base < amount.0 {
            let reason = format!(
                "{} {} available on {}, {} required",
                base, pair.base_asset, sell.venue, amount
            );
            return Ok(self.insufficient(opportunity, amount, &reason));
        }

        log::info!(
            "Margin check PASSED for {}: {} {} on {}, {} {} on {}",
            pair.symbol,
            required_quote,
            pair.quote_asset,
            buy.venue,
            amount,
            pair.base_asset,
            sell.venue
        );
        Ok(MarginVerdict {
            sufficient: true,
            traded_amount: amount,
        })
    }
}
