//! Balance snapshots and drift against the previous run.

use common::types::{Asset, Balance, Venue};
use log::info;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Total balance per asset on venue A and venue B.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioSnapshot {
    entries: BTreeMap<Asset, (Decimal, Decimal)>,
}

impl PortfolioSnapshot {
    /// Merges both venues' balances by asset. An asset missing on one side
    /// counts as zero there; assets that are zero on both sides are dropped.
    pub fn from_balances(venue_a: &[Balance], venue_b: &[Balance]) -> Self {
        let mut entries: BTreeMap<Asset, (Decimal, Decimal)> = BTreeMap::new();
        for (venue, balances) in [(Venue::A, venue_a), (Venue::B, venue_b)] {
            for balance in balances {
                let entry = entries.entry(balance.asset.clone()).or_default();
                match venue {
                    Venue::A => entry.0 += balance.total,
                    Venue::B => entry.1 += balance.total,
                }
            }
        }
        entries.retain(|_, (a, b)| !a.is_zero() || !b.is_zero());
        Self { entries }
    }

    pub fn insert(&mut self, asset: Asset, balance_a: Decimal, balance_b: Decimal) {
        self.entries.insert(asset, (balance_a, balance_b));
    }

    pub fn get(&self, asset: &Asset) -> Option<(Decimal, Decimal)> {
        self.entries.get(asset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Asset, &(Decimal, Decimal))> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One line of the portfolio report.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftRow {
    pub asset: Asset,
    pub balance_a: Decimal,
    pub balance_b: Decimal,
    /// Change of the combined balance since the previous run, in percent.
    /// `None` without a usable previous entry.
    pub change_pct: Option<Decimal>,
}

/// `((cur_a + cur_b) / (prev_a + prev_b)) * 100 - 100`, or `None` when the
/// previous total is zero.
pub fn drift_pct(previous: (Decimal, Decimal), current: (Decimal, Decimal)) -> Option<Decimal> {
    let previous_total = previous.0 + previous.1;
    if previous_total.is_zero() {
        return None;
    }
    let current_total = current.0 + current.1;
    Some(current_total / previous_total * Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED)
}

/// Owns the baseline from the previous run and the latest snapshot.
#[derive(Debug, Clone, Default)]
pub struct PortfolioLedger {
    baseline: Option<PortfolioSnapshot>,
    current: Option<PortfolioSnapshot>,
}

impl PortfolioLedger {
    /// `baseline` is the snapshot persisted by the previous run, if any.
    pub fn new(baseline: Option<PortfolioSnapshot>) -> Self {
        Self {
            baseline,
            current: None,
        }
    }

    pub fn baseline(&self) -> Option<&PortfolioSnapshot> {
        self.baseline.as_ref()
    }

    pub fn current(&self) -> Option<&PortfolioSnapshot> {
        self.current.as_ref()
    }

    /// Replaces the latest snapshot and logs the resulting report.
    pub fn record(&mut self, snapshot: PortfolioSnapshot) -> Vec<DriftRow> {
        self.current = Some(snapshot);
        let rows = self.report();
        for row in &rows {
            match row.change_pct {
                Some(change) => info!(
                    "portfolio {}: venue-a {} venue-b {} ({:+}%)",
                    row.asset,
                    row.balance_a.round_dp(3),
                    row.balance_b.round_dp(3),
                    change.round_dp(2)
                ),
                None => info!(
                    "portfolio {}: venue-a {} venue-b {}",
                    row.asset,
                    row.balance_a.round_dp(3),
                    row.balance_b.round_dp(3)
                ),
            }
        }
        rows
    }

    /// Drift of every asset in the latest snapshot against the baseline.
    pub fn report(&self) -> Vec<DriftRow> {
        let Some(current) = &self.current else {
            return Vec::new();
        };
        current
            .iter()
            .map(|(asset, &(balance_a, balance_b))| DriftRow {
                asset: asset.clone(),
                balance_a,
                balance_b,
                change_pct: self
                    .baseline
                    .as_ref()
                    .and_then(|baseline| baseline.get(asset))
                    .and_then(|previous| drift_pct(previous, (balance_a, balance_b))),
            })
            .collect()
    }
}
