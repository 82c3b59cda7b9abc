//! Window scheduler.
//!
//! Decides whether a cycle may start at an interval boundary. Filters
//! run in a fixed order (volatility, then hour-of-day, then concurrency
//! cap); the first failing filter is the recorded skip reason. A skipped
//! window is never queued or retried mid-window.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::DualEntryConfig;
use crate::domain::{Cycle, VolatilitySnapshot};

/// Why a window produced no cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    VolatilityOutOfRange,
    HourNotAllowed,
    ConcurrencyCap,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::VolatilityOutOfRange => "VOLATILITY_OUT_OF_RANGE",
            SkipReason::HourNotAllowed => "HOUR_NOT_ALLOWED",
            SkipReason::ConcurrencyCap => "CONCURRENCY_CAP",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of evaluating one window boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerDecision {
    Start,
    Skip(SkipReason),
}

/// Compute the next window boundary strictly after `now`, aligned to
/// `interval_secs` since the Unix epoch.
pub fn next_window_start(now: DateTime<Utc>, interval_secs: u64) -> DateTime<Utc> {
    let interval = interval_secs as i64;
    let ts = now.timestamp();
    let next = (ts.div_euclid(interval) + 1) * interval;
    Utc.timestamp_opt(next, 0).single().unwrap_or(now)
}

pub struct WindowScheduler;

impl WindowScheduler {
    /// Evaluate pre-entry filters for a window boundary.
    ///
    /// Order is fixed: volatility filter, hour filter, concurrency cap.
    /// First failure wins and becomes the skip reason.
    pub fn evaluate(
        config: &DualEntryConfig,
        volatility: &VolatilitySnapshot,
        boundary: DateTime<Utc>,
        non_terminal_cycles: usize,
    ) -> SchedulerDecision {
        if config.volatility_filter.enabled && !volatility.in_range {
            return SchedulerDecision::Skip(SkipReason::VolatilityOutOfRange);
        }

        if config.hour_filter.enabled {
            let hour = boundary.hour() as u8;
            if !config.hour_filter.allowed_hours.contains(&hour) {
                return SchedulerDecision::Skip(SkipReason::HourNotAllowed);
            }
        }

        if non_terminal_cycles >= config.max_concurrent_cycles as usize {
            return SchedulerDecision::Skip(SkipReason::ConcurrencyCap);
        }

        SchedulerDecision::Start
    }

    /// Instantiate a cycle for a window that passed all filters. The
    /// cycle is created in IDLE and immediately armed; analytics fields
    /// are frozen here.
    pub fn create_cycle(
        cycle_number: u64,
        boundary: DateTime<Utc>,
        config: &DualEntryConfig,
        btc_volatility: Decimal,
        dry_run: bool,
    ) -> crate::error::Result<Cycle> {
        let window_end = boundary + chrono::Duration::seconds(config.interval_secs as i64);
        let mut cycle = Cycle::new(cycle_number, boundary, window_end, btc_volatility, dry_run);

        info!(
            cycle = cycle_number,
            window_start = %boundary,
            "cycle created at window boundary"
        );
        cycle.transition(crate::domain::CycleState::Armed, "window boundary reached")?;
        Ok(cycle)
    }

    pub fn log_skip(boundary: DateTime<Utc>, reason: SkipReason) {
        debug!(window_start = %boundary, reason = %reason, "window skipped");
    }
}
