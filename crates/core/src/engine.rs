//! The polling loop that ties the registry, detector, executor and ledger together.

use crate::config::BotConfig;
use crate::margin::MarginGuard;
use crate::registry::PairRegistry;
use analytics::{PortfolioLedger, PortfolioSnapshot, PortfolioStore};
use anyhow::{anyhow, Context, Result};
use common::traits::{IsExecutor, IsMarginGuard, OpportunityPredictor};
use common::types::{Balance, ExecutionOutcome, Opportunity};
use detector::predictor::{self, CandleWindow, CANDLES_PER_VENUE};
use detector::{quotes, BalanceSheet, Direction, HttpPredictor, OpportunityEvaluator, TradeSizer};
use exchange_client_trait::Venues;
use executor::{PositionReaper, ReapOutcome, ReaperCounters, TradeExecutor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

/// Settings for the model-driven cycle.
struct PredictorMode {
    predictor: Arc<dyn OpportunityPredictor>,
    symbol: String,
    interval: String,
    interval_ms: i64,
    settle_delay: Duration,
}

/// Owns all state carried from one cycle to the next.
pub struct Engine {
    venues: Venues,
    registry: PairRegistry,
    evaluator: OpportunityEvaluator,
    margin_guard: Arc<dyn IsMarginGuard>,
    executor: Arc<dyn IsExecutor>,
    reaper: PositionReaper,
    counters: ReaperCounters,
    ledger: PortfolioLedger,
    store: PortfolioStore,
    balances: BalanceSheet,
    predictor: Option<PredictorMode>,
    poll_interval: Duration,
    shutdown_rx: Receiver<()>,
    stopping: bool,
}

impl Engine {
    /// Wires the engine for an already bootstrapped registry.
    pub fn new(
        config: &BotConfig,
        venues: Venues,
        registry: PairRegistry,
        shutdown_rx: Receiver<()>,
    ) -> Result<Self> {
        let sizer = TradeSizer::new(config.sizing_config());
        let evaluator = OpportunityEvaluator::new(config.evaluator_config(), sizer.clone());
        let margin_guard: Arc<dyn IsMarginGuard> =
            Arc::new(MarginGuard::new(venues.clone(), sizer));
        let executor: Arc<dyn IsExecutor> = Arc::new(TradeExecutor::new(venues.clone()));

        let predictor = if config.predictor.enabled {
            let settings = &config.predictor;
            let endpoint = settings
                .endpoint
                .clone()
                .ok_or_else(|| anyhow!("predictor is enabled without an endpoint"))?;
            let interval_ms = predictor::interval_millis(&settings.interval)
                .ok_or_else(|| anyhow!("unsupported candle interval {}", settings.interval))?;
            if registry.get(&settings.symbol).is_none() {
                return Err(anyhow!(
                    "predictor symbol {} is not a registered pair",
                    settings.symbol
                ));
            }
            let http = HttpPredictor::new(endpoint, Duration::from_millis(settings.timeout_ms))?;
            Some(PredictorMode {
                predictor: Arc::new(http),
                symbol: settings.symbol.clone(),
                interval: settings.interval.clone(),
                interval_ms,
                settle_delay: Duration::from_secs(settings.settle_delay_secs),
            })
        } else {
            None
        };

        Ok(Self {
            venues,
            registry,
            evaluator,
            margin_guard,
            executor,
            reaper: PositionReaper::new(config.reap_threshold),
            counters: ReaperCounters::default(),
            ledger: PortfolioLedger::default(),
            store: PortfolioStore::new(&config.portfolio_path),
            balances: BalanceSheet::default(),
            predictor,
            poll_interval: config.poll_interval(),
            shutdown_rx,
            stopping: false,
        })
    }

    /// Replaces the model used in predictor mode. No effect unless the mode is enabled.
    pub fn with_predictor(mut self, predictor: Arc<dyn OpportunityPredictor>) -> Self {
        if let Some(mode) = self.predictor.as_mut() {
            mode.predictor = predictor;
        }
        self
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn counters(&self) -> ReaperCounters {
        self.counters
    }

    pub fn balances(&self) -> &BalanceSheet {
        &self.balances
    }

    /// Runs until a shutdown signal arrives, then persists the final snapshot.
    pub async fn run(mut self) -> Result<PortfolioLedger> {
        self.start().await;
        loop {
            if self.shutdown_requested() {
                break;
            }
            self.run_cycle().await;
            if self.sleep_or_shutdown(self.poll_interval).await {
                break;
            }
        }
        self.finish().await
    }

    /// Loads the previous run's snapshot and takes the first one of this run.
    pub async fn start(&mut self) {
        let baseline = match self.store.load() {
            Ok(Some(snapshot)) => {
                log::info!(
                    "Loaded portfolio baseline with {} asset(s) from {}",
                    snapshot.len(),
                    self.store.path().display()
                );
                Some(snapshot)
            }
            Ok(None) => {
                log::info!(
                    "No portfolio baseline at {}; drift will not be reported",
                    self.store.path().display()
                );
                None
            }
            Err(e) => {
                log::warn!("Ignoring portfolio baseline: {}", e);
                None
            }
        };
        self.ledger = PortfolioLedger::new(baseline);
        if !self.refresh_portfolio().await {
            log::warn!("Initial portfolio snapshot unavailable");
        }
    }

    /// One iteration: reap stranded positions, then look for trades.
    pub async fn run_cycle(&mut self) {
        let symbols = self.registry.symbols();
        for handle in self.venues.iter() {
            let outcome = self.reaper.run(handle, &symbols, &mut self.counters).await;
            if let ReapOutcome::Reaped { closed, failed } = outcome {
                log::warn!(
                    "Reaper on {}: {} closed, {} failed",
                    handle.venue,
                    closed,
                    failed
                );
            }
        }

        if self.predictor.is_some() {
            self.predictor_cycle().await;
        } else {
            self.scan_cycle().await;
        }
    }

    /// Takes the final snapshot and writes it to the portfolio file.
    pub async fn finish(mut self) -> Result<PortfolioLedger> {
        log::info!("Engine shutting down");
        if !self.refresh_portfolio().await {
            log::warn!("Final balances unavailable; persisting the last snapshot taken");
        }
        match self.ledger.current() {
            Some(snapshot) => self.store.persist(snapshot).with_context(|| {
                format!(
                    "failed to persist portfolio to {}",
                    self.store.path().display()
                )
            })?,
            None => log::warn!("No portfolio snapshot was taken; nothing persisted"),
        }
        Ok(self.ledger)
    }

    async fn scan_cycle(&mut self) {
        // Sizing reads current balances; on failure the last sheet stands.
        if !self.refresh_balances().await {
            log::debug!("Sizing against the balances of an earlier cycle");
        }
        let pairs = self.registry.pairs().to_vec();
        for pair in &pairs {
            let Some(snapshot) = quotes::aggregate(&self.venues, &pair.symbol).await else {
                continue;
            };
            let opportunities = self.evaluator.evaluate(pair, &snapshot, &self.balances);
            if opportunities.is_empty() {
                log::debug!("{}: no opportunity this cycle", pair.symbol);
            }
            for opportunity in opportunities {
                self.attempt(opportunity).await;
            }
        }
    }

    async fn predictor_cycle(&mut self) {
        let Some(mode) = self.predictor.as_ref() else {
            return;
        };
        let symbol = mode.symbol.clone();
        let settle_delay = mode.settle_delay;
        let Some(pair) = self.registry.get(&symbol).cloned() else {
            return;
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        let start_ms = now_ms - mode.interval_ms * i64::from(CANDLES_PER_VENUE);
        let (a, b) = self.venues.pair();
        let (candles_a, candles_b) = tokio::join!(
            a.client
                .historical_candles(&symbol, &mode.interval, start_ms, CANDLES_PER_VENUE + 1),
            b.client
                .historical_candles(&symbol, &mode.interval, start_ms, CANDLES_PER_VENUE + 1)
        );
        let windows = match (candles_a, candles_b) {
            (Ok(a), Ok(b)) => CandleWindow::from_series(&a).zip(CandleWindow::from_series(&b)),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Candles for {} unavailable: {}", symbol, e);
                return;
            }
        };
        let Some((window_a, window_b)) = windows else {
            log::warn!("Not enough candles for {} yet", symbol);
            return;
        };
        let Some(features) = predictor::build_features(now_ms, &window_a, &window_b) else {
            log::warn!("Candle data for {} does not form a feature vector", symbol);
            return;
        };

        let prediction = match mode.predictor.predict(&features).await {
            Ok(prediction) => prediction,
            Err(e) => {
                log::warn!("Predictor unavailable: {:#}", e);
                return;
            }
        };
        if !prediction.will_be_profitable {
            log::debug!("Predictor expects no opportunity on {}", symbol);
            return;
        }

        let directions = predictor::candle_directions(&window_a, &window_b);
        if directions.is_empty() {
            log::info!("Predictor is positive but candle opens are not crossed on {}", symbol);
            return;
        }
        log::info!(
            "Predictor expects an opportunity on {}; waiting {:?} before trading",
            symbol,
            settle_delay
        );
        if self.sleep_or_shutdown(settle_delay).await {
            log::info!("Shutdown during settle delay; skipping predicted trade");
            return;
        }

        let Some(snapshot) = quotes::aggregate(&self.venues, &symbol).await else {
            return;
        };
        self.refresh_balances().await;
        for candle_direction in directions {
            // Candles pick the direction; the live books price it.
            let direction = Direction {
                raw_spread: snapshot.book(candle_direction.buy).ask_price.0
                    - snapshot.book(candle_direction.sell).bid_price.0,
                ..candle_direction
            };
            let Some(opportunity) =
                self.evaluator
                    .price(&pair, direction, &snapshot, &self.balances)
            else {
                log::warn!(
                    "{}: cannot size {} -> {}",
                    symbol,
                    direction.buy,
                    direction.sell
                );
                continue;
            };
            if !self.evaluator.is_profitable(&opportunity) {
                log::info!(
                    "{}: predicted trade executes below threshold (live spread {}, {}%)",
                    symbol,
                    direction.raw_spread,
                    opportunity.net_profit_pct.round_dp(4)
                );
            }
            self.attempt(opportunity).await;
        }
    }

    /// Re-verifies margin and executes. Returns whether both legs went through.
    async fn attempt(&mut self, mut opportunity: Opportunity) -> bool {
        opportunity.id = Uuid::new_v4();
        log::info!("Opportunity {}", opportunity);
        let verdict = match self.margin_guard.check_margin(&opportunity).await {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("Margin check errored for {}: {:#}", opportunity.pair.symbol, e);
                return false;
            }
        };
        if !verdict.sufficient {
            log::warn!("Trade rejected: insufficient margin for {}", opportunity);
            return false;
        }
        opportunity.traded_amount = verdict.traded_amount;
        if !opportunity.traded_amount.is_positive() {
            log::warn!("Trade rejected: non-positive amount for {}", opportunity);
            return false;
        }

        match self.executor.execute_trade(&opportunity).await {
            Ok(ExecutionOutcome::Executed { .. }) => {
                self.refresh_portfolio().await;
                true
            }
            Ok(_) => false,
            Err(e) => {
                log::warn!("Trade rejected: {:#}", e);
                false
            }
        }
    }

    async fn fetch_balances(&self) -> Option<(Vec<Balance>, Vec<Balance>)> {
        let (a, b) = self.venues.pair();
        let (balances_a, balances_b) = tokio::join!(a.client.balances(), b.client.balances());
        match (balances_a, balances_b) {
            (Ok(balances_a), Ok(balances_b)) => Some((balances_a, balances_b)),
            (Err(e), _) => {
                log::warn!("Balances unavailable on {}: {}", a.venue, e);
                None
            }
            (_, Err(e)) => {
                log::warn!("Balances unavailable on {}: {}", b.venue, e);
                None
            }
        }
    }

    async fn refresh_balances(&mut self) -> bool {
        match self.fetch_balances().await {
            Some((balances_a, balances_b)) => {
                self.balances = BalanceSheet::from_balances(&balances_a, &balances_b);
                true
            }
            None => false,
        }
    }

    /// Refreshes the balance sheet and records a new ledger snapshot.
    async fn refresh_portfolio(&mut self) -> bool {
        let Some((balances_a, balances_b)) = self.fetch_balances().await else {
            return false;
        };
        self.balances = BalanceSheet::from_balances(&balances_a, &balances_b);
        self.ledger
            .record(PortfolioSnapshot::from_balances(&balances_a, &balances_b));
        true
    }

    fn shutdown_requested(&mut self) -> bool {
        if self.stopping {
            return true;
        }
        match self.shutdown_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                log::info!("Shutdown requested");
                self.stopping = true;
                true
            }
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Sleeps for `duration` unless shutdown arrives first. Returns whether to stop.
    async fn sleep_or_shutdown(&mut self, duration: Duration) -> bool {
        if self.stopping {
            return true;
        }
        tokio::select! {
            _ = self.shutdown_rx.recv() => {
                log::info!("Shutdown requested");
                self.stopping = true;
                true
            }
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
