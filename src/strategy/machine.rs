//! Cycle state machine.
//!
//! One `CycleDriver` task owns one cycle from ARMED to a terminal state.
//! Every transition is applied to the owned cycle value and then swapped
//! into the store, so readers never observe a half-applied step. The
//! kill switch is checked at every wait point and transition boundary;
//! it forces the cycle through CLEANUP without rolling back fills.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::adapters::CycleStore;
use crate::config::DualEntryConfig;
use crate::domain::{
    Cycle, CycleOutcome, CycleState, FillReport, OrderLeg, OrderRequest, OrderStatus, Side,
};
use crate::error::{DuetError, Result};
use crate::strategy::executor::OrderExecutor;
use crate::strategy::modifiers::{self, LiveSignals};
use crate::strategy::volatility::VolatilityTracker;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Crossing price floor for the forced exit when no bid is quoted
const FORCED_EXIT_FLOOR: Decimal = dec!(0.01);

enum EntryWait {
    Winner(Side),
    NoFill,
    Killed,
}

enum ExitWait {
    Done,
    Killed,
}

pub struct CycleDriver {
    config: DualEntryConfig,
    yes_token: String,
    no_token: String,
    executor: Arc<OrderExecutor>,
    store: CycleStore,
    volatility: Arc<RwLock<VolatilityTracker>>,
    kill: watch::Receiver<bool>,
}

impl CycleDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DualEntryConfig,
        yes_token: String,
        no_token: String,
        executor: Arc<OrderExecutor>,
        store: CycleStore,
        volatility: Arc<RwLock<VolatilityTracker>>,
        kill: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            yes_token,
            no_token,
            executor,
            store,
            volatility,
            kill,
        }
    }

    /// Drive the cycle to a terminal state. Errors escalate to FAILSAFE;
    /// they never propagate out of the driver task.
    pub async fn run(mut self, mut cycle: Cycle) {
        let number = cycle.cycle_number;
        if let Err(e) = self.drive(&mut cycle).await {
            error!(cycle = number, error = %e, "cycle escalating to failsafe");
            self.failsafe(&mut cycle, &e).await;
        }
        self.store.update(cycle).await;
        info!(cycle = number, "cycle driver finished");
    }

    async fn drive(&mut self, cycle: &mut Cycle) -> Result<()> {
        if self.killed() {
            return self.cleanup(cycle, "kill switch before entry placement").await;
        }

        self.place_entries(cycle).await?;

        match self.wait_entries(cycle).await? {
            EntryWait::Killed => {
                return self.cleanup(cycle, "kill switch during entry wait").await
            }
            EntryWait::NoFill => {
                return self.cleanup(cycle, "entry lead time elapsed with no fill").await
            }
            EntryWait::Winner(side) => {
                self.resolve_partial_fill(cycle, side).await?;
            }
        }

        if self.killed() {
            return self.cleanup(cycle, "kill switch before exit placement").await;
        }

        self.place_exits(cycle).await?;

        match self.wait_exits(cycle).await? {
            ExitWait::Killed => self.cleanup(cycle, "kill switch during exit wait").await,
            ExitWait::Done => Ok(()),
        }
    }

    fn killed(&self) -> bool {
        *self.kill.borrow()
    }

    /// One status poll with bounded tolerance for transient failures.
    /// A failed poll is logged and skipped; only a run of consecutive
    /// failures exhausting the retry budget escalates. The counter
    /// resets on any successful poll.
    async fn poll_status(&self, order_id: &str, failures: &mut u8) -> Result<Option<FillReport>> {
        match self.executor.status(order_id).await {
            Ok(report) => {
                *failures = 0;
                Ok(Some(report))
            }
            Err(e) if *failures + 1 < self.executor.max_retries() => {
                *failures += 1;
                warn!(
                    order_id = %order_id,
                    consecutive = *failures,
                    error = %e,
                    "status poll failed, continuing"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn checkpoint(&self, cycle: &Cycle) {
        self.store.update(cycle.clone()).await;
    }

    /// Sample the live signals the modifier stages consume. A missing
    /// quote degrades to no spread reading, not an error.
    async fn signals(&self) -> LiveSignals {
        let spread = match self.executor.best_quote(&self.yes_token).await {
            Ok(quote) => quote.spread(),
            Err(_) => None,
        };
        let tracker = self.volatility.read().await;
        LiveSignals {
            spread,
            momentum: tracker.momentum(),
            volatility: tracker.current(),
        }
    }

    fn token_for(&self, side: Side) -> &str {
        match side {
            Side::Yes => &self.yes_token,
            Side::No => &self.no_token,
        }
    }

    /// ARMED -> ENTRY_WORKING: place resting buys on both sides. The
    /// modifier stages run here, at placement time, and their results
    /// are frozen into the cycle's analytics fields.
    async fn place_entries(&self, cycle: &mut Cycle) -> Result<()> {
        let signals = self.signals().await;
        let (price, method) = modifiers::entry_price(&self.config.dynamic_entry, self.config.entry_price, &signals);
        let size = modifiers::order_size(&self.config.dynamic_size, self.config.order_size, &signals);

        cycle.entry_method = method;
        cycle.actual_entry_price = Some(price);
        cycle.actual_order_size = Some(size);

        let yes_request =
            OrderRequest::buy_limit(self.yes_token.clone(), Side::Yes, size, price);
        let no_request = OrderRequest::buy_limit(self.no_token.clone(), Side::No, size, price);

        let mut yes_leg = OrderLeg::new(Side::Yes, yes_request.client_order_id.clone(), price, size);
        let mut no_leg = OrderLeg::new(Side::No, no_request.client_order_id.clone(), price, size);

        let yes_id = self.executor.place_with_retry(&yes_request).await?;
        yes_leg.exchange_order_id = Some(yes_id);

        let no_id = match self.executor.place_with_retry(&no_request).await {
            Ok(id) => id,
            Err(e) => {
                // One-sided entry must not rest; unwind before escalating
                if let Some(id) = &yes_leg.exchange_order_id {
                    if let Err(cancel_err) = self.executor.cancel(id).await {
                        warn!(order_id = %id, error = %cancel_err, "unwind cancel failed");
                    }
                }
                return Err(e);
            }
        };
        no_leg.exchange_order_id = Some(no_id);

        cycle.yes_entry = Some(yes_leg);
        cycle.no_entry = Some(no_leg);
        cycle.transition(
            CycleState::EntryWorking,
            format!("entries resting at {price} x {size}"),
        )?;
        self.checkpoint(cycle).await;
        Ok(())
    }

    /// ENTRY_WORKING wait: poll both legs until one fills, the lead time
    /// elapses, or the kill switch trips.
    async fn wait_entries(&mut self, cycle: &mut Cycle) -> Result<EntryWait> {
        let deadline = Instant::now() + Duration::from_secs(self.config.entry_lead_secs);
        let mut dead = [false; 2];
        let mut poll_failures: u8 = 0;

        while Instant::now() < deadline {
            if self.killed() {
                return Ok(EntryWait::Killed);
            }

            for side in [Side::Yes, Side::No] {
                let idx = match side {
                    Side::Yes => 0,
                    Side::No => 1,
                };
                if dead[idx] {
                    continue;
                }
                let order_id = match cycle.entry_leg(side).and_then(|l| l.exchange_order_id.clone()) {
                    Some(id) => id,
                    None => continue,
                };

                let report = match self.poll_status(&order_id, &mut poll_failures).await? {
                    Some(report) => report,
                    None => continue,
                };
                match report.status {
                    OrderStatus::Filled => {
                        let leg = cycle
                            .entry_leg_mut(side)
                            .ok_or_else(|| DuetError::UnexpectedState("entry leg missing".into()))?;
                        if !report.is_consistent_with(leg.size) {
                            return Err(DuetError::InconsistentFill {
                                order_id,
                                reason: format!(
                                    "fill {} exceeds requested {}",
                                    report.filled_size, leg.size
                                ),
                            });
                        }
                        let fill_price = report.avg_fill_price.unwrap_or(leg.price);
                        leg.record_fill(report.filled_size, fill_price);
                        cycle.log_event(
                            "entry_fill",
                            Some(format!("{side} filled {} @ {fill_price}", report.filled_size)),
                        );
                        self.checkpoint(cycle).await;
                        return Ok(EntryWait::Winner(side));
                    }
                    OrderStatus::Rejected | OrderStatus::Expired | OrderStatus::Cancelled => {
                        dead[idx] = true;
                        cycle.log_event(
                            "entry_dead",
                            Some(format!("{side} entry terminal without fill: {:?}", report.status)),
                        );
                        self.checkpoint(cycle).await;
                    }
                    OrderStatus::Open => {}
                }
            }

            if dead.iter().all(|d| *d) {
                return Ok(EntryWait::NoFill);
            }
            tokio::time::sleep(self.executor.poll_interval()).await;
        }

        Ok(EntryWait::NoFill)
    }

    /// PARTIAL_FILL -> HEDGED: record the winner, cancel the losing leg.
    /// A loser whose cancellation lost the race to a fill means both
    /// sides filled; that is an inconsistent book state and escalates.
    async fn resolve_partial_fill(&self, cycle: &mut Cycle, winner: Side) -> Result<()> {
        cycle.transition(CycleState::PartialFill, format!("{winner} entry filled"))?;
        self.checkpoint(cycle).await;

        let loser = winner.opposite();
        let loser_id = cycle
            .entry_leg(loser)
            .and_then(|l| l.exchange_order_id.clone())
            .ok_or_else(|| DuetError::UnexpectedState("losing entry leg missing".into()))?;

        match self.executor.cancel_with_retry(&loser_id).await {
            Ok(()) => {}
            Err(DuetError::FilledBeforeCancel { order_id }) => {
                return Err(DuetError::InconsistentFill {
                    order_id,
                    reason: "both entry legs filled in the same window".into(),
                });
            }
            Err(e) => return Err(e),
        }

        cycle.set_winner(winner)?;
        cycle.transition(CycleState::Hedged, format!("{loser} entry cancelled"))?;
        self.checkpoint(cycle).await;
        Ok(())
    }

    /// HEDGED -> EXIT_WORKING: place the take-profit / scratch pair on
    /// the winning side, sized to the actual entry fill.
    async fn place_exits(&self, cycle: &mut Cycle) -> Result<()> {
        let winner = cycle
            .winner_side
            .ok_or_else(|| DuetError::UnexpectedState("hedged cycle without winner".into()))?;
        let filled_size = cycle
            .entry_leg(winner)
            .map(|l| l.filled_size)
            .filter(|s| *s > Decimal::ZERO)
            .ok_or_else(|| DuetError::UnexpectedState("hedged cycle without entry fill".into()))?;

        let signals = self.signals().await;
        let tp = modifiers::tp_price(&self.config.momentum_tp, self.config.tp_price, &signals);
        cycle.actual_tp_price = Some(tp);

        let token = self.token_for(winner).to_string();
        let tp_request = OrderRequest::sell_limit(token.clone(), winner, filled_size, tp);
        let scratch_request =
            OrderRequest::sell_limit(token, winner, filled_size, self.config.scratch_price);

        let mut tp_leg = OrderLeg::new(winner, tp_request.client_order_id.clone(), tp, filled_size);
        let mut scratch_leg = OrderLeg::new(
            winner,
            scratch_request.client_order_id.clone(),
            self.config.scratch_price,
            filled_size,
        );

        tp_leg.exchange_order_id = Some(self.executor.place_with_retry(&tp_request).await?);
        scratch_leg.exchange_order_id =
            Some(self.executor.place_with_retry(&scratch_request).await?);

        cycle.take_profit = Some(tp_leg);
        cycle.scratch = Some(scratch_leg);
        cycle.transition(
            CycleState::ExitWorking,
            format!("exits resting: tp {tp}, scratch {}", self.config.scratch_price),
        )?;
        self.checkpoint(cycle).await;
        Ok(())
    }

    /// EXIT_WORKING wait: poll the exit pair until one fills or the TTL
    /// elapses, then settle the cycle.
    async fn wait_exits(&mut self, cycle: &mut Cycle) -> Result<ExitWait> {
        let deadline = Instant::now() + Duration::from_secs(self.config.exit_ttl_secs);
        let mut tp_filled_at: Option<Decimal> = None;
        let mut poll_failures: u8 = 0;

        while Instant::now() < deadline {
            if self.killed() {
                return Ok(ExitWait::Killed);
            }

            if tp_filled_at.is_none() {
                if let Some(price) = self
                    .poll_exit_fill(cycle, ExitLeg::TakeProfit, &mut poll_failures)
                    .await?
                {
                    tp_filled_at = Some(price);
                    if self.config.smart_scratch_cancel {
                        self.cancel_exit_leg(cycle, ExitLeg::Scratch).await?;
                        return self
                            .settle(cycle, CycleOutcome::TpHit, price, "take-profit filled, scratch cancelled")
                            .await
                            .map(|_| ExitWait::Done);
                    }
                    cycle.log_event(
                        "tp_fill",
                        Some("take-profit filled, scratch left to rest".into()),
                    );
                    self.checkpoint(cycle).await;
                }
            }

            if let Some(price) = self
                .poll_exit_fill(cycle, ExitLeg::Scratch, &mut poll_failures)
                .await?
            {
                if let Some(tp_price) = tp_filled_at {
                    // Double exit with smart cancel disabled; settle on the
                    // take-profit fill and surface the extra sale in the log
                    cycle.log_event(
                        "scratch_fill_after_tp",
                        Some(format!("scratch filled at {price} after take-profit")),
                    );
                    return self
                        .settle(cycle, CycleOutcome::TpHit, tp_price, "take-profit filled")
                        .await
                        .map(|_| ExitWait::Done);
                }
                self.cancel_exit_leg(cycle, ExitLeg::TakeProfit).await?;
                return self
                    .settle(cycle, CycleOutcome::ScratchHit, price, "scratch filled, take-profit cancelled")
                    .await
                    .map(|_| ExitWait::Done);
            }

            tokio::time::sleep(self.executor.poll_interval()).await;
        }

        if let Some(price) = tp_filled_at {
            self.cancel_exit_leg(cycle, ExitLeg::Scratch).await?;
            return self
                .settle(cycle, CycleOutcome::TpHit, price, "take-profit filled, scratch cancelled at ttl")
                .await
                .map(|_| ExitWait::Done);
        }

        self.forced_exit(cycle).await.map(|_| ExitWait::Done)
    }

    /// Exit TTL elapsed with no fill: cancel both resting exits and close
    /// the position with a spread-crossing sell.
    async fn forced_exit(&self, cycle: &mut Cycle) -> Result<()> {
        warn!(cycle = cycle.cycle_number, "exit ttl elapsed, forcing close");
        self.cancel_exit_leg(cycle, ExitLeg::TakeProfit).await?;
        self.cancel_exit_leg(cycle, ExitLeg::Scratch).await?;

        let winner = cycle
            .winner_side
            .ok_or_else(|| DuetError::UnexpectedState("forced exit without winner".into()))?;
        let size = cycle
            .entry_leg(winner)
            .map(|l| l.filled_size)
            .unwrap_or(Decimal::ZERO);
        let token = self.token_for(winner).to_string();

        let crossing_price = match self.executor.best_quote(&token).await {
            Ok(quote) => quote.best_bid.unwrap_or(FORCED_EXIT_FLOOR),
            Err(_) => FORCED_EXIT_FLOOR,
        };
        let request = OrderRequest::sell_marketable(token, winner, size, crossing_price);
        let order_id = self.executor.place_with_retry(&request).await?;
        cycle.log_event("forced_exit", Some(format!("marketable sell at {crossing_price}")));

        // Wait out the grace period for the crossing order to print
        let grace = Instant::now() + Duration::from_secs(self.config.cleanup_secs);
        let mut poll_failures: u8 = 0;
        loop {
            if let Some(report) = self.poll_status(&order_id, &mut poll_failures).await? {
                if report.status == OrderStatus::Filled {
                    let price = report.avg_fill_price.unwrap_or(crossing_price);
                    return self
                        .settle(cycle, CycleOutcome::Forced, price, "forced spread-crossing exit filled")
                        .await;
                }
            }
            if Instant::now() >= grace {
                return Err(DuetError::OrderTimeout(format!(
                    "forced exit {order_id} unfilled after {}s",
                    self.config.cleanup_secs
                )));
            }
            tokio::time::sleep(self.executor.poll_interval()).await;
        }
    }

    /// Terminal DONE settlement: fix the outcome and realized pnl in the
    /// same transition.
    async fn settle(
        &self,
        cycle: &mut Cycle,
        outcome: CycleOutcome,
        exit_price: Decimal,
        detail: &str,
    ) -> Result<()> {
        cycle.outcome = Some(outcome);
        cycle.pnl = cycle.realized_pnl(exit_price).or(Some(Decimal::ZERO));
        cycle.transition(CycleState::Done, format!("{detail} ({outcome})"))?;
        self.checkpoint(cycle).await;
        info!(
            cycle = cycle.cycle_number,
            outcome = %outcome,
            pnl = %cycle.pnl.unwrap_or_default(),
            "cycle settled"
        );
        Ok(())
    }

    async fn poll_exit_fill(
        &self,
        cycle: &mut Cycle,
        leg: ExitLeg,
        poll_failures: &mut u8,
    ) -> Result<Option<Decimal>> {
        let (order_id, limit_price, size) = {
            let leg_ref = match leg {
                ExitLeg::TakeProfit => cycle.take_profit.as_ref(),
                ExitLeg::Scratch => cycle.scratch.as_ref(),
            };
            match leg_ref {
                Some(l) if !l.filled => match &l.exchange_order_id {
                    Some(id) => (id.clone(), l.price, l.size),
                    None => return Ok(None),
                },
                _ => return Ok(None),
            }
        };

        let report = match self.poll_status(&order_id, poll_failures).await? {
            Some(report) => report,
            None => return Ok(None),
        };
        if report.status != OrderStatus::Filled {
            return Ok(None);
        }
        if !report.is_consistent_with(size) {
            return Err(DuetError::InconsistentFill {
                order_id,
                reason: format!("fill {} exceeds requested {size}", report.filled_size),
            });
        }

        let price = report.avg_fill_price.unwrap_or(limit_price);
        let leg_mut = match leg {
            ExitLeg::TakeProfit => cycle.take_profit.as_mut(),
            ExitLeg::Scratch => cycle.scratch.as_mut(),
        };
        if let Some(l) = leg_mut {
            l.record_fill(report.filled_size, price);
        }
        Ok(Some(price))
    }

    async fn cancel_exit_leg(&self, cycle: &mut Cycle, leg: ExitLeg) -> Result<()> {
        let order_id = {
            let leg_ref = match leg {
                ExitLeg::TakeProfit => cycle.take_profit.as_ref(),
                ExitLeg::Scratch => cycle.scratch.as_ref(),
            };
            match leg_ref {
                Some(l) if !l.filled => l.exchange_order_id.clone(),
                _ => None,
            }
        };
        if let Some(id) = order_id {
            self.executor.cancel_with_retry(&id).await?;
            cycle.log_event("exit_cancelled", Some(format!("{leg:?} leg cancelled")));
        }
        Ok(())
    }

    /// Forced unwind: cancel every resting order, then DONE. Cancellation
    /// failures here are never retried; the cycle goes straight to
    /// FAILSAFE so exposure is surfaced rather than silently chased.
    async fn cleanup(&self, cycle: &mut Cycle, reason: &str) -> Result<()> {
        cycle.transition(CycleState::Cleanup, reason)?;
        self.checkpoint(cycle).await;

        let mut resting: Vec<String> = Vec::new();
        for leg in [
            cycle.yes_entry.as_ref(),
            cycle.no_entry.as_ref(),
            cycle.take_profit.as_ref(),
            cycle.scratch.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            if !leg.filled {
                if let Some(id) = &leg.exchange_order_id {
                    resting.push(id.clone());
                }
            }
        }

        for order_id in resting {
            // Single attempt only
            if let Err(e) = self.executor.cancel(&order_id).await {
                return Err(DuetError::CancellationFailed {
                    order_id,
                    reason: format!("cleanup cancellation failed: {e}"),
                });
            }
        }

        // Settle on an exit fill that landed before the unwind; otherwise
        // pnl is zero whether flat (no fill) or still exposed (kill does
        // not market-close).
        let tp_fill = cycle.take_profit.as_ref().filter(|l| l.filled).and_then(|l| l.filled_price);
        let scratch_fill = cycle.scratch.as_ref().filter(|l| l.filled).and_then(|l| l.filled_price);
        let (outcome, pnl, detail) = if let Some(price) = tp_fill {
            (CycleOutcome::TpHit, cycle.realized_pnl(price), "take-profit filled before unwind")
        } else if let Some(price) = scratch_fill {
            (CycleOutcome::ScratchHit, cycle.realized_pnl(price), "scratch filled before unwind")
        } else if cycle.winner_side.is_some() {
            (CycleOutcome::Forced, None, "unwound with open exposure remaining")
        } else {
            (CycleOutcome::NoFill, None, "unwound with no fills")
        };
        cycle.outcome = Some(outcome);
        cycle.pnl = pnl.or(Some(Decimal::ZERO));
        cycle.transition(CycleState::Done, detail)?;
        self.checkpoint(cycle).await;
        Ok(())
    }

    /// Terminal FAILSAFE: stop touching orders, freeze the cycle with its
    /// partial state and logs for the operator.
    async fn failsafe(&self, cycle: &mut Cycle, err: &DuetError) {
        if cycle.state.is_terminal() {
            return;
        }
        cycle.outcome = Some(CycleOutcome::Failsafe);
        if cycle
            .transition(CycleState::Failsafe, format!("unrecoverable: {err}"))
            .is_err()
        {
            // can_transition_to admits FAILSAFE from every non-terminal
            // state, so this arm is unreachable; log defensively anyway
            error!(cycle = cycle.cycle_number, "failsafe transition rejected");
        }
        self.checkpoint(cycle).await;
    }
}

#[derive(Debug, Clone, Copy)]
enum ExitLeg {
    TakeProfit,
    Scratch,
}
