//! Two-leg order placement across the venues.

use anyhow::{bail, Result};
use async_trait::async_trait;
use common::traits::IsExecutor;
use common::types::{ExecutionOutcome, Opportunity, Side};
use exchange_client_trait::Venues;
use log::{error, info, warn};
use uuid::Uuid;

/// Client order id for one leg of an opportunity. Fits the 36-character limit
/// both venues impose.
pub fn leg_client_order_id(opportunity_id: Uuid, side: Side) -> String {
    let suffix = match side {
        Side::Buy => "b",
        Side::Sell => "s",
    };
    format!("{}-{}", opportunity_id.simple(), suffix)
}

/// Places the buy leg and then the sell leg of an opportunity as limit orders.
pub struct TradeExecutor {
    venues: Venues,
}

impl TradeExecutor {
    pub fn new(venues: Venues) -> Self {
        Self { venues }
    }
}

#[async_trait]
impl IsExecutor for TradeExecutor {
    async fn execute_trade(&self, opportunity: &Opportunity) -> Result<ExecutionOutcome> {
        if !opportunity.traded_amount.is_positive() {
            bail!(
                "opportunity {} has non-positive amount {}",
                opportunity.id,
                opportunity.traded_amount
            );
        }
        if opportunity.buy_venue == opportunity.sell_venue {
            bail!("opportunity {} buys and sells on the same venue", opportunity.id);
        }

        let symbol = &opportunity.pair.symbol;
        let buyer = self.venues.get(opportunity.buy_venue);
        let seller = self.venues.get(opportunity.sell_venue);

        let buy_order = buyer.limit_order(
            symbol,
            Side::Buy,
            opportunity.traded_amount,
            opportunity.ask_price,
            leg_client_order_id(opportunity.id, Side::Buy),
        );
        let buy_ack = match buyer.client.place_order(&buy_order).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(
                    "[{}] buy leg on {} refused, sell leg not sent: {}",
                    opportunity.id, buyer.venue, e
                );
                return Ok(ExecutionOutcome::BuyLegFailed {
                    reason: e.to_string(),
                });
            }
        };

        let sell_order = seller.limit_order(
            symbol,
            Side::Sell,
            opportunity.traded_amount,
            opportunity.bid_price,
            leg_client_order_id(opportunity.id, Side::Sell),
        );
        match seller.client.place_order(&sell_order).await {
            Ok(sell_ack) => {
                info!(
                    "[{}] executed {} (buy order {}, sell order {})",
                    opportunity.id, opportunity, buy_ack.order_id, sell_ack.order_id
                );
                Ok(ExecutionOutcome::Executed {
                    buy: buy_ack,
                    sell: sell_ack,
                })
            }
            Err(e) => {
                error!(
                    "[{}] partial execution: bought {} {} on {} but sell on {} failed: {}",
                    opportunity.id,
                    opportunity.traded_amount,
                    symbol,
                    buyer.venue,
                    seller.venue,
                    e
                );
                Ok(ExecutionOutcome::SellLegFailed {
                    buy: buy_ack,
                    reason: e.to_string(),
                })
            }
        }
    }
}
