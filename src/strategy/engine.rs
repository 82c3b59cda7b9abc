//! Engine: owns the scheduler loop and spawns one driver task per cycle.
//!
//! `stop` only prevents new cycles; in-flight drivers keep advancing.
//! `kill` additionally trips the watch channel every driver observes at
//! its transition boundaries, forcing them through CLEANUP.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::adapters::{CycleStore, ExchangeClient};
use crate::config::{AppConfig, DualEntryConfig, DualEntryPatch};
use crate::domain::Cycle;
use crate::error::{DuetError, Result};
use crate::strategy::aggregator::{self, Analytics, StatusSnapshot};
use crate::strategy::executor::OrderExecutor;
use crate::strategy::machine::CycleDriver;
use crate::strategy::scheduler::{next_window_start, SchedulerDecision, WindowScheduler};
use crate::strategy::volatility::VolatilityTracker;

pub struct Engine {
    config: Arc<RwLock<AppConfig>>,
    store: CycleStore,
    executor: Arc<OrderExecutor>,
    volatility: Arc<RwLock<VolatilityTracker>>,
    active: AtomicBool,
    kill_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn new(config: AppConfig, client: Arc<dyn ExchangeClient>) -> Self {
        let executor = Arc::new(OrderExecutor::new(client, config.execution.clone()));
        let window_secs = config.strategy.interval_secs;
        let (kill_tx, _) = watch::channel(false);
        Self {
            config: Arc::new(RwLock::new(config)),
            store: CycleStore::new(),
            executor,
            volatility: Arc::new(RwLock::new(VolatilityTracker::new(window_secs))),
            active: AtomicBool::new(false),
            kill_tx,
        }
    }

    pub fn store(&self) -> &CycleStore {
        &self.store
    }

    /// Begin creating cycles at window boundaries. Rejected while the
    /// market's token ids are unset.
    pub async fn start(&self) -> Result<()> {
        let config = self.config.read().await;
        if !config.market.is_tradeable() {
            return Err(DuetError::MarketNotConfigured(
                "yes_token_id and no_token_id must be set before start".into(),
            ));
        }
        drop(config);

        // A prior kill stays latched until the next explicit start
        self.kill_tx.send_replace(false);
        self.active.store(true, Ordering::SeqCst);
        info!("engine started");
        Ok(())
    }

    /// Stop creating new cycles. In-flight cycles continue to a terminal
    /// state on their own.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        info!("engine stopped, in-flight cycles continue");
    }

    /// Kill switch: stop the scheduler and force every in-flight cycle
    /// to unwind.
    pub fn kill(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.kill_tx.send_replace(true);
        warn!("kill switch tripped, unwinding all in-flight cycles");
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_killed(&self) -> bool {
        *self.kill_tx.borrow()
    }

    /// Scheduler loop. Samples the book into the volatility window once
    /// a second and evaluates filters at each interval boundary.
    pub async fn run(self: Arc<Self>) {
        let mut sample = tokio::time::interval(Duration::from_secs(1));
        sample.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let interval_secs = self.config.read().await.strategy.interval_secs;
            let boundary = next_window_start(chrono::Utc::now(), interval_secs);

            while chrono::Utc::now() < boundary {
                sample.tick().await;
                self.sample_volatility().await;
            }
            self.tick(boundary).await;
        }
    }

    /// Evaluate one window boundary: run the filters and either spawn a
    /// cycle driver or log the skip.
    pub async fn tick(&self, boundary: chrono::DateTime<chrono::Utc>) {
        if !self.is_running() {
            debug!(window_start = %boundary, "engine inactive, window ignored");
            return;
        }

        let (strategy, yes_token, no_token, dry_run) = {
            let config = self.config.read().await;
            (
                config.strategy.clone(),
                config.market.yes_token_id.clone(),
                config.market.no_token_id.clone(),
                config.dry_run.enabled,
            )
        };
        let (yes_token, no_token) = match (yes_token, no_token) {
            (Some(y), Some(n)) => (y, n),
            _ => {
                warn!("token ids unset while active, window ignored");
                return;
            }
        };

        let snapshot = {
            let tracker = self.volatility.read().await;
            tracker.snapshot(&strategy.volatility_filter)
        };
        let non_terminal = self.store.non_terminal_count().await;

        match WindowScheduler::evaluate(&strategy, &snapshot, boundary, non_terminal) {
            SchedulerDecision::Skip(reason) => {
                WindowScheduler::log_skip(boundary, reason);
            }
            SchedulerDecision::Start => {
                let number = self.store.next_cycle_number();
                let cycle = match WindowScheduler::create_cycle(
                    number,
                    boundary,
                    &strategy,
                    snapshot.current,
                    dry_run,
                ) {
                    Ok(cycle) => cycle,
                    Err(e) => {
                        warn!(cycle = number, error = %e, "cycle creation failed");
                        return;
                    }
                };
                self.store.insert(cycle.clone()).await;

                let driver = CycleDriver::new(
                    strategy,
                    yes_token,
                    no_token,
                    Arc::clone(&self.executor),
                    self.store.clone(),
                    Arc::clone(&self.volatility),
                    self.kill_tx.subscribe(),
                );
                tokio::spawn(driver.run(cycle));
            }
        }
    }

    /// Record the traded market's mid price as the volatility proxy
    async fn sample_volatility(&self) {
        let token = {
            let config = self.config.read().await;
            config.market.yes_token_id.clone()
        };
        let Some(token) = token else { return };

        if let Ok(quote) = self.executor.best_quote(&token).await {
            if let Some(mid) = quote.mid() {
                self.volatility.write().await.record(mid);
            }
        }
    }

    /// One consistent status snapshot for the poll endpoint
    pub async fn status(&self) -> StatusSnapshot {
        let config = self.config.read().await;
        let tracker = self.volatility.read().await;
        StatusSnapshot {
            running: self.is_running(),
            dry_run: config.dry_run.enabled,
            active_cycles: self.store.non_terminal_count().await,
            current_cycle: self.store.current().await,
            next_window_start: next_window_start(chrono::Utc::now(), config.strategy.interval_secs),
            volatility: tracker.snapshot(&config.strategy.volatility_filter),
        }
    }

    pub async fn history(&self) -> Vec<Cycle> {
        self.store.history().await
    }

    pub async fn cycle(&self, number: u64) -> Option<Cycle> {
        self.store.get(number).await
    }

    pub async fn analytics(&self) -> Analytics {
        aggregator::analyze(&self.store.history().await)
    }

    pub async fn strategy_config(&self) -> DualEntryConfig {
        self.config.read().await.strategy.clone()
    }

    /// Merge a validated partial update into the live configuration.
    /// Cycles already in flight keep their creation-time snapshot.
    pub async fn apply_patch(
        &self,
        patch: DualEntryPatch,
    ) -> std::result::Result<DualEntryConfig, Vec<String>> {
        let mut config = self.config.write().await;
        let merged = patch.apply_to(&config.strategy)?;
        config.strategy = merged.clone();
        info!("strategy configuration updated");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedExchange;
    use crate::config::HourFilterConfig;
    use crate::domain::CycleState;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn engine_with_sim(mut config: AppConfig, sim: SimulatedExchange) -> Arc<Engine> {
        config.market.yes_token_id = Some("tok-yes".into());
        config.market.no_token_id = Some("tok-no".into());
        config.strategy.entry_lead_secs = 1;
        config.strategy.exit_ttl_secs = 1;
        config.execution.poll_interval_ms = 10;
        config.execution.retry_backoff_ms = 1;
        Arc::new(Engine::new(config, Arc::new(sim)))
    }

    fn boundary() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, 14, 5, 0).unwrap()
    }

    #[tokio::test]
    async fn test_start_requires_token_ids() {
        let config = AppConfig::default_config(true, "BTCUSDT");
        let engine = Arc::new(Engine::new(config, Arc::new(SimulatedExchange::new())));
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, DuetError::MarketNotConfigured(_)));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_inactive_engine_ignores_windows() {
        let engine = engine_with_sim(
            AppConfig::default_config(true, "BTCUSDT"),
            SimulatedExchange::new(),
        );
        engine.tick(boundary()).await;
        assert!(engine.store().history().await.is_empty());
    }

    #[tokio::test]
    async fn test_tick_spawns_cycle() {
        let engine = engine_with_sim(
            AppConfig::default_config(true, "BTCUSDT"),
            SimulatedExchange::new(),
        );
        engine.start().await.unwrap();
        engine.tick(boundary()).await;

        let cycle = engine.store().get(1).await.unwrap();
        assert_eq!(cycle.cycle_number, 1);
        assert!(!cycle.state.is_terminal() || cycle.state == CycleState::Done);
    }

    #[tokio::test]
    async fn test_concurrency_cap_enforced() {
        let engine = engine_with_sim(
            AppConfig::default_config(true, "BTCUSDT"),
            SimulatedExchange::new(),
        );
        engine.start().await.unwrap();

        engine.tick(boundary()).await;
        // Second boundary arrives while cycle 1 is still non-terminal
        engine.tick(boundary() + chrono::Duration::seconds(300)).await;

        assert_eq!(engine.store().history().await.len(), 1);
        assert!(engine.store().non_terminal_count().await <= 1);
    }

    #[tokio::test]
    async fn test_hour_filter_skip_creates_nothing() {
        let mut config = AppConfig::default_config(true, "BTCUSDT");
        config.strategy.hour_filter = HourFilterConfig {
            enabled: true,
            allowed_hours: vec![9],
        };
        let engine = engine_with_sim(config, SimulatedExchange::new());
        engine.start().await.unwrap();

        engine.tick(boundary()).await;
        assert!(engine.store().history().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_blocks_new_cycles_only() {
        let engine = engine_with_sim(
            AppConfig::default_config(true, "BTCUSDT"),
            SimulatedExchange::new(),
        );
        engine.start().await.unwrap();
        engine.tick(boundary()).await;
        engine.stop();
        engine.tick(boundary() + chrono::Duration::seconds(300)).await;

        assert_eq!(engine.store().history().await.len(), 1);
        assert!(!engine.is_killed());
    }

    #[tokio::test]
    async fn test_patch_does_not_touch_inflight_snapshot() {
        let engine = engine_with_sim(
            AppConfig::default_config(true, "BTCUSDT"),
            SimulatedExchange::new(),
        );
        engine.start().await.unwrap();
        engine.tick(boundary()).await;

        let patch = DualEntryPatch {
            entry_price: Some(dec!(0.30)),
            ..Default::default()
        };
        engine.apply_patch(patch).await.unwrap();
        assert_eq!(engine.strategy_config().await.entry_price, dec!(0.30));

        // The cycle created before the patch keeps its original price
        let cycle = engine.store().get(1).await.unwrap();
        if let Some(price) = cycle.actual_entry_price {
            assert_eq!(price, dec!(0.45));
        }
    }

    #[tokio::test]
    async fn test_kill_unwinds_inflight_cycle() {
        let engine = engine_with_sim(
            AppConfig::default_config(true, "BTCUSDT"),
            SimulatedExchange::new(),
        );
        engine.start().await.unwrap();
        engine.tick(boundary()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        engine.kill();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let cycle = engine.store().get(1).await.unwrap();
        assert!(cycle.state.is_terminal());
        assert!(engine.is_killed());
        assert!(!engine.is_running());

        // Scheduler creates nothing after the kill
        engine.tick(boundary() + chrono::Duration::seconds(300)).await;
        assert_eq!(engine.store().history().await.len(), 1);
    }
}
