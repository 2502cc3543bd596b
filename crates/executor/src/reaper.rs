//! Detection and force-closing of stranded positions.
//!
//! A venue whose positions stay non-zero for `threshold` consecutive cycles
//! has every open position closed at its current resting price. The counter
//! for each venue lives in [`ReaperCounters`], owned by the caller.

use common::types::{Position, PositionSide, Price, Side, Venue};
use exchange_client_trait::VenueHandle;
use log::{error, info, warn};
use uuid::Uuid;

/// Consecutive non-zero cycles after which positions are force-closed.
pub const DEFAULT_REAP_THRESHOLD: u32 = 5;

/// Per-venue count of consecutive cycles with open positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaperCounters {
    a: u32,
    b: u32,
}

impl ReaperCounters {
    pub fn get(&self, venue: Venue) -> u32 {
        match venue {
            Venue::A => self.a,
            Venue::B => self.b,
        }
    }

    pub fn set(&mut self, venue: Venue, value: u32) {
        match venue {
            Venue::A => self.a = value,
            Venue::B => self.b = value,
        }
    }
}

/// What one reaper pass did on a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Position data was unavailable; the counter is unchanged.
    Skipped,
    /// No open positions; the counter is unchanged.
    Flat,
    /// Open positions seen; the counter now holds this value.
    Counting(u32),
    /// The threshold was hit and close orders were sent.
    Reaped { closed: usize, failed: usize },
}

pub struct PositionReaper {
    threshold: u32,
}

impl Default for PositionReaper {
    fn default() -> Self {
        Self::new(DEFAULT_REAP_THRESHOLD)
    }
}

impl PositionReaper {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Counter after one cycle, and whether positions must be closed now.
    pub fn advance(&self, counter: u32, has_open: bool) -> (u32, bool) {
        if !has_open {
            return (counter, false);
        }
        let next = counter + 1;
        if next >= self.threshold {
            (0, true)
        } else {
            (next, false)
        }
    }

    /// Runs one pass over `symbols` on a venue and updates its counter.
    pub async fn run(
        &self,
        handle: &VenueHandle,
        symbols: &[String],
        counters: &mut ReaperCounters,
    ) -> ReapOutcome {
        let mut open = Vec::new();
        for symbol in symbols {
            match handle.client.open_positions(symbol).await {
                Ok(positions) => open.extend(positions.into_iter().filter(Position::is_open)),
                Err(e) => {
                    warn!(
                        "reaper: positions unavailable on {} for {}: {}",
                        handle.venue, symbol, e
                    );
                    return ReapOutcome::Skipped;
                }
            }
        }

        let (next, reap) = self.advance(counters.get(handle.venue), !open.is_empty());
        counters.set(handle.venue, next);

        if !reap {
            return if open.is_empty() {
                ReapOutcome::Flat
            } else {
                info!(
                    "reaper: {} open position(s) on {} ({}/{})",
                    open.len(),
                    handle.venue,
                    next,
                    self.threshold
                );
                ReapOutcome::Counting(next)
            };
        }

        warn!(
            "reaper: positions on {} open for {} cycles, force-closing {}",
            handle.venue,
            self.threshold,
            open.len()
        );
        let mut closed = 0;
        let mut failed = 0;
        for position in &open {
            if close_position(handle, position).await {
                closed += 1;
            } else {
                failed += 1;
            }
        }
        ReapOutcome::Reaped { closed, failed }
    }
}

/// Buys at the ask to close a short, sells at the bid to close a long.
async fn close_position(handle: &VenueHandle, position: &Position) -> bool {
    let book = match handle.client.top_of_book(&position.symbol).await {
        Ok(book) => book,
        Err(e) => {
            error!(
                "reaper: no price to close {} on {}: {}",
                position.symbol, handle.venue, e
            );
            return false;
        }
    };
    let side = position.side.closing_side();
    let price: Price = match position.side {
        PositionSide::Short => book.ask_price,
        PositionSide::Long => book.bid_price,
    };
    let order = handle.limit_order(
        &position.symbol,
        side,
        position.size,
        price,
        Uuid::new_v4().simple().to_string(),
    );
    match handle.client.place_order(&order).await {
        Ok(ack) => {
            info!(
                "reaper: closed {} {} {} on {} at {} (order {})",
                side_label(side),
                position.size,
                position.symbol,
                handle.venue,
                price,
                ack.order_id
            );
            true
        }
        Err(e) => {
            error!(
                "reaper: close order for {} on {} failed: {}",
                position.symbol, handle.venue, e
            );
            false
        }
    }
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange_client_trait::fake::FakeVenue;
    use exchange_client_trait::OrderVocabulary;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn create_test_handle(vocabulary: OrderVocabulary) -> (Arc<FakeVenue>, VenueHandle) {
        let fake = Arc::new(FakeVenue::new("fake-b", Venue::B));
        fake.set_book("ETHUSDT", dec!(1799), dec!(1801), dec!(10), dec!(10));
        let handle = VenueHandle::new(Venue::B, fake.clone(), vocabulary);
        (fake, handle)
    }

    fn symbols() -> Vec<String> {
        vec!["ETHUSDT".to_string()]
    }

    #[test]
    fn test_advance_counts_only_open_cycles() {
        let reaper = PositionReaper::default();
        assert_eq!(reaper.advance(0, false), (0, false));
        assert_eq!(reaper.advance(3, false), (3, false));
        assert_eq!(reaper.advance(0, true), (1, false));
        assert_eq!(reaper.advance(3, true), (4, false));
        assert_eq!(reaper.advance(4, true), (0, true));
    }

    #[tokio::test]
    async fn test_force_close_on_fifth_cycle() {
        let (fake, handle) = create_test_handle(OrderVocabulary::TITLE);
        fake.set_position("ETHUSDT", dec!(-2));
        let reaper = PositionReaper::default();
        let mut counters = ReaperCounters::default();

        for cycle in 1..=4 {
            let outcome = reaper.run(&handle, &symbols(), &mut counters).await;
            assert_eq!(outcome, ReapOutcome::Counting(cycle));
            assert!(fake.orders().is_empty());
        }

        let outcome = reaper.run(&handle, &symbols(), &mut counters).await;
        assert_eq!(outcome, ReapOutcome::Reaped { closed: 1, failed: 0 });
        assert_eq!(counters.get(Venue::B), 0);

        let orders = fake.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, "Buy");
        assert_eq!(orders[0].order_type, "Limit");
        assert_eq!(orders[0].price, Price(dec!(1801)));
        assert_eq!(orders[0].quantity.0, dec!(2));
    }

    #[tokio::test]
    async fn test_flat_cycle_does_not_advance() {
        let (fake, handle) = create_test_handle(OrderVocabulary::UPPER);
        let reaper = PositionReaper::default();
        let mut counters = ReaperCounters::default();
        counters.set(Venue::B, 3);

        fake.set_position("ETHUSDT", dec!(0));
        let outcome = reaper.run(&handle, &symbols(), &mut counters).await;
        assert_eq!(outcome, ReapOutcome::Flat);
        assert_eq!(counters.get(Venue::B), 3);
        assert_eq!(counters.get(Venue::A), 0);
    }

    #[tokio::test]
    async fn test_long_closes_with_sell_at_bid() {
        let (fake, handle) = create_test_handle(OrderVocabulary::UPPER);
        fake.set_position("ETHUSDT", dec!(1.5));
        let reaper = PositionReaper::new(1);
        let mut counters = ReaperCounters::default();

        let outcome = reaper.run(&handle, &symbols(), &mut counters).await;
        assert_eq!(outcome, ReapOutcome::Reaped { closed: 1, failed: 0 });
        let orders = fake.orders();
        assert_eq!(orders[0].side, "SELL");
        assert_eq!(orders[0].price, Price(dec!(1799)));
    }

    #[tokio::test]
    async fn test_rejected_close_is_counted_as_failed() {
        let (fake, handle) = create_test_handle(OrderVocabulary::UPPER);
        fake.set_position("ETHUSDT", dec!(1));
        fake.reject_orders(true);
        let reaper = PositionReaper::new(1);
        let mut counters = ReaperCounters::default();

        let outcome = reaper.run(&handle, &symbols(), &mut counters).await;
        assert_eq!(outcome, ReapOutcome::Reaped { closed: 0, failed: 1 });
        assert_eq!(counters.get(Venue::B), 0);
    }
}
