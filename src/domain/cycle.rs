use chrono::{DateTime, Datelike, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CycleState, Side};
use crate::error::{DuetError, Result};

/// Terminal classification of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
    /// Take-profit leg filled
    #[serde(rename = "TP_HIT")]
    TpHit,
    /// Scratch (breakeven) leg filled
    #[serde(rename = "SCRATCH_HIT")]
    ScratchHit,
    /// Exit TTL elapsed, position closed with a spread-crossing order
    #[serde(rename = "forced")]
    Forced,
    /// No entry leg filled, cycle unwound
    #[serde(rename = "NO_FILL")]
    NoFill,
    /// Unrecoverable error
    #[serde(rename = "FAILSAFE")]
    Failsafe,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::TpHit => "TP_HIT",
            CycleOutcome::ScratchHit => "SCRATCH_HIT",
            CycleOutcome::Forced => "forced",
            CycleOutcome::NoFill => "NO_FILL",
            CycleOutcome::Failsafe => "FAILSAFE",
        }
    }
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tracked order leg (entry or exit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLeg {
    pub side: Side,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub price: Decimal,
    pub size: Decimal,
    pub filled: bool,
    pub filled_size: Decimal,
    pub filled_price: Option<Decimal>,
}

impl OrderLeg {
    pub fn new(side: Side, client_order_id: String, price: Decimal, size: Decimal) -> Self {
        Self {
            side,
            client_order_id,
            exchange_order_id: None,
            price,
            size,
            filled: false,
            filled_size: Decimal::ZERO,
            filled_price: None,
        }
    }

    pub fn record_fill(&mut self, filled_size: Decimal, filled_price: Decimal) {
        self.filled = true;
        self.filled_size = filled_size;
        self.filled_price = Some(filled_price);
    }
}

/// Cycle-scoped audit record. Appended once per state transition or
/// notable execution event, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleEvent {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub detail: Option<String>,
}

/// How the entry price was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMethod {
    Static,
    Dynamic,
}

impl EntryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMethod::Static => "static",
            EntryMethod::Dynamic => "dynamic",
        }
    }
}

/// One attempt at the dual-entry strategy within one time window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub cycle_number: u64,
    pub state: CycleState,
    /// Immutable after creation
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub yes_entry: Option<OrderLeg>,
    pub no_entry: Option<OrderLeg>,
    /// Set at most once, never cleared
    pub winner_side: Option<Side>,
    pub take_profit: Option<OrderLeg>,
    pub scratch: Option<OrderLeg>,
    /// Set only when `state` becomes terminal
    pub outcome: Option<CycleOutcome>,
    pub pnl: Option<Decimal>,
    /// Append-only, time-ordered audit trail
    pub logs: Vec<CycleEvent>,
    /// Immutable: simulated vs live execution path
    pub is_dry_run: bool,

    // Analytics fields, captured once at creation/entry time and frozen
    pub hour_of_day: u8,
    pub day_of_week: u8,
    pub btc_volatility: Decimal,
    pub entry_method: EntryMethod,
    pub actual_entry_price: Option<Decimal>,
    pub actual_tp_price: Option<Decimal>,
    pub actual_order_size: Option<Decimal>,
}

impl Cycle {
    pub fn new(
        cycle_number: u64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        btc_volatility: Decimal,
        is_dry_run: bool,
    ) -> Self {
        Self {
            cycle_number,
            state: CycleState::Idle,
            window_start,
            window_end,
            yes_entry: None,
            no_entry: None,
            winner_side: None,
            take_profit: None,
            scratch: None,
            outcome: None,
            pnl: None,
            logs: Vec::new(),
            is_dry_run,
            hour_of_day: window_start.hour() as u8,
            day_of_week: window_start.weekday().num_days_from_monday() as u8,
            btc_volatility,
            entry_method: EntryMethod::Static,
            actual_entry_price: None,
            actual_tp_price: None,
            actual_order_size: None,
        }
    }

    /// Append an event to the audit trail. Timestamps are clamped so the
    /// trail stays non-decreasing even across clock adjustments.
    pub fn log_event(&mut self, event: impl Into<String>, detail: Option<String>) {
        let mut now = Utc::now();
        if let Some(last) = self.logs.last() {
            if now < last.timestamp {
                now = last.timestamp;
            }
        }
        self.logs.push(CycleEvent {
            timestamp: now,
            event: event.into(),
            detail,
        });
    }

    /// Apply a state transition, appending exactly one log entry.
    /// No transition is silent.
    pub fn transition(&mut self, to: CycleState, detail: impl Into<String>) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(DuetError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        let from = self.state;
        self.state = to;
        self.log_event(format!("{} -> {}", from, to), Some(detail.into()));
        Ok(())
    }

    /// Fix the winning side. Write-once: a second call is a logic error.
    pub fn set_winner(&mut self, side: Side) -> Result<()> {
        if let Some(existing) = self.winner_side {
            return Err(DuetError::UnexpectedState(format!(
                "winner_side already set to {existing}, refusing to overwrite with {side}"
            )));
        }
        self.winner_side = Some(side);
        Ok(())
    }

    /// The entry leg for a side, if placed
    pub fn entry_leg(&self, side: Side) -> Option<&OrderLeg> {
        match side {
            Side::Yes => self.yes_entry.as_ref(),
            Side::No => self.no_entry.as_ref(),
        }
    }

    pub fn entry_leg_mut(&mut self, side: Side) -> Option<&mut OrderLeg> {
        match side {
            Side::Yes => self.yes_entry.as_mut(),
            Side::No => self.no_entry.as_mut(),
        }
    }

    /// Winner's entry fill price, once hedged
    pub fn winner_fill_price(&self) -> Option<Decimal> {
        let side = self.winner_side?;
        self.entry_leg(side).and_then(|leg| leg.filled_price)
    }

    /// Realized PnL for an exit at `exit_price` against the winner's entry
    pub fn realized_pnl(&self, exit_price: Decimal) -> Option<Decimal> {
        let side = self.winner_side?;
        let leg = self.entry_leg(side)?;
        let entry = leg.filled_price?;
        Some((exit_price - entry) * leg.filled_size)
    }
}
