//! Status aggregation and rollup analytics.
//!
//! Pure reads over the cycle store. The aggregator never mutates cycle
//! records, and because the state machine swaps whole records into the
//! store, a snapshot taken here only ever reflects post-transition state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{Cycle, VolatilitySnapshot};

/// One consistent point-in-time view of the engine
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub dry_run: bool,
    /// Cycles currently in a non-terminal state
    pub active_cycles: usize,
    /// Most recent non-terminal cycle, if any
    pub current_cycle: Option<Cycle>,
    /// Next window boundary the scheduler will evaluate
    pub next_window_start: DateTime<Utc>,
    pub volatility: VolatilitySnapshot,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BucketStats {
    pub cycles: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_pnl: Decimal,
}

impl BucketStats {
    fn record(&mut self, pnl: Decimal) {
        self.cycles += 1;
        if pnl > Decimal::ZERO {
            self.wins += 1;
        }
        self.total_pnl += pnl;
        self.win_rate = self.wins as f64 / self.cycles as f64;
    }
}

/// Rollup over the full cycle history. A win is a settled cycle with
/// strictly positive realized pnl.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Analytics {
    pub total_cycles: usize,
    /// Cycles that reached DONE (FAILSAFE cycles are counted separately)
    pub settled_cycles: usize,
    pub failsafe_cycles: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub by_hour: BTreeMap<u8, BucketStats>,
    pub by_day_of_week: BTreeMap<u8, BucketStats>,
    pub by_entry_method: BTreeMap<String, BucketStats>,
    pub by_outcome: BTreeMap<String, usize>,
}

/// Compute rollup analytics over a cycle history. Idempotent: the same
/// history always yields the same rollup.
pub fn analyze(history: &[Cycle]) -> Analytics {
    let mut analytics = Analytics {
        total_cycles: history.len(),
        ..Default::default()
    };

    for cycle in history {
        if let Some(outcome) = cycle.outcome {
            *analytics
                .by_outcome
                .entry(outcome.as_str().to_string())
                .or_default() += 1;
        }

        if cycle.state == crate::domain::CycleState::Failsafe {
            analytics.failsafe_cycles += 1;
            continue;
        }
        let pnl = match (cycle.state.is_terminal(), cycle.pnl) {
            (true, Some(pnl)) => pnl,
            _ => continue,
        };

        analytics.settled_cycles += 1;
        if pnl > Decimal::ZERO {
            analytics.wins += 1;
        }
        analytics.total_pnl += pnl;

        analytics.by_hour.entry(cycle.hour_of_day).or_default().record(pnl);
        analytics
            .by_day_of_week
            .entry(cycle.day_of_week)
            .or_default()
            .record(pnl);
        analytics
            .by_entry_method
            .entry(cycle.entry_method.as_str().to_string())
            .or_default()
            .record(pnl);
    }

    if analytics.settled_cycles > 0 {
        analytics.win_rate = analytics.wins as f64 / analytics.settled_cycles as f64;
    }
    analytics
}
