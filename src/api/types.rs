use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{Cycle, CycleEvent, CycleOutcome, CycleState, Side};
use crate::strategy::{Analytics, StatusSnapshot};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
}

/// Aggregate poll response: the point-in-time snapshot plus the rollup
/// over the full history. Safe to poll at any rate; pure read.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    pub analytics: Analytics,
    pub uptime_secs: i64,
}

/// One cycle in the history listing
#[derive(Debug, Serialize)]
pub struct CycleResponse {
    pub cycle_number: u64,
    pub state: CycleState,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub winner_side: Option<Side>,
    pub outcome: Option<CycleOutcome>,
    pub pnl: Option<Decimal>,
    pub entry_method: String,
    pub hour_of_day: u8,
    pub day_of_week: u8,
    pub is_dry_run: bool,
    pub logs: Vec<CycleEvent>,
}

impl From<Cycle> for CycleResponse {
    fn from(cycle: Cycle) -> Self {
        Self {
            cycle_number: cycle.cycle_number,
            state: cycle.state,
            window_start: cycle.window_start,
            window_end: cycle.window_end,
            winner_side: cycle.winner_side,
            outcome: cycle.outcome,
            pnl: cycle.pnl,
            entry_method: cycle.entry_method.as_str().to_string(),
            hour_of_day: cycle.hour_of_day,
            day_of_week: cycle.day_of_week,
            is_dry_run: cycle.is_dry_run,
            logs: cycle.logs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub running: bool,
    pub message: String,
}

/// 400 body for a rejected config write: every violated bound is listed
#[derive(Debug, Serialize)]
pub struct ValidationErrorResponse {
    pub error: String,
    pub violations: Vec<String>,
}
