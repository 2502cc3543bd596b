//! Builds the venue clients named in the configuration.

use crate::config::{BotConfig, VenueConfig, VenueKind};
use anyhow::{Context, Result};
use common::types::Venue;
use exchange_client_trait::{ExchangeClient, Venues};
use exchange_clients::{BinanceFuturesClient, BybitClient, RestSettings};
use std::sync::Arc;

fn build_client(config: &VenueConfig, venue: Venue) -> Result<Arc<dyn ExchangeClient>> {
    let settings = RestSettings {
        base_url: config.base_url.clone(),
        credentials: config.credentials()?,
        recv_window_ms: config.recv_window_ms,
        timeout: config.timeout(),
    };
    let client: Arc<dyn ExchangeClient> = match config.kind {
        VenueKind::BinanceFutures => Arc::new(
            BinanceFuturesClient::new(settings, venue)
                .with_context(|| format!("failed to build client for {}", venue))?,
        ),
        VenueKind::Bybit => Arc::new(
            BybitClient::new(settings, venue)
                .with_context(|| format!("failed to build client for {}", venue))?,
        ),
    };
    log::info!("{} connected via {} ({})", venue, client.id(), config.base_url);
    Ok(client)
}

/// Creates both venue handles. Missing credentials are fatal.
pub fn connect(config: &BotConfig) -> Result<Venues> {
    let client_a = build_client(&config.venue_a, Venue::A)?;
    let client_b = build_client(&config.venue_b, Venue::B)?;
    Ok(Venues::new(
        client_a,
        config.venue_a.kind.vocabulary(),
        client_b,
        config.venue_b.kind.vocabulary(),
    ))
}
