use serde::{Deserialize, Serialize};
use std::fmt;

/// Cycle state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleState {
    /// Cycle created at the window boundary, nothing placed yet
    Idle,
    /// Pre-entry checks passed, ready to place entry orders
    Armed,
    /// Both entry orders (YES, NO) resting, waiting for a fill
    EntryWorking,
    /// Exactly one entry leg filled, loser cancellation pending
    PartialFill,
    /// Loser cancelled, directional exposure fixed on the winner
    Hedged,
    /// Take-profit and scratch exits resting on the winning side
    ExitWorking,
    /// Cycle resolved (terminal)
    Done,
    /// Forced unwind of all working orders
    Cleanup,
    /// Unrecoverable error, operator attention required (terminal)
    Failsafe,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleState::Idle => "IDLE",
            CycleState::Armed => "ARMED",
            CycleState::EntryWorking => "ENTRY_WORKING",
            CycleState::PartialFill => "PARTIAL_FILL",
            CycleState::Hedged => "HEDGED",
            CycleState::ExitWorking => "EXIT_WORKING",
            CycleState::Done => "DONE",
            CycleState::Cleanup => "CLEANUP",
            CycleState::Failsafe => "FAILSAFE",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: CycleState) -> bool {
        use CycleState::*;

        // Abort paths available from every non-terminal state
        if !self.is_terminal() && (target == Failsafe || target == Cleanup) {
            return true;
        }

        match (self, target) {
            // Forward path
            (Idle, Armed) => true,
            (Armed, EntryWorking) => true,
            (EntryWorking, PartialFill) => true,
            (PartialFill, Hedged) => true,
            (Hedged, ExitWorking) => true,
            (ExitWorking, Done) => true,

            // Unwind completes
            (Cleanup, Done) => true,

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<CycleState> {
        use CycleState::*;

        match self {
            Idle => vec![Armed, Cleanup, Failsafe],
            Armed => vec![EntryWorking, Cleanup, Failsafe],
            EntryWorking => vec![PartialFill, Cleanup, Failsafe],
            PartialFill => vec![Hedged, Cleanup, Failsafe],
            Hedged => vec![ExitWorking, Cleanup, Failsafe],
            ExitWorking => vec![Done, Cleanup, Failsafe],
            Cleanup => vec![Done, Failsafe],
            Done => vec![],
            Failsafe => vec![],
        }
    }

    /// Is this a terminal state for the cycle?
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleState::Done | CycleState::Failsafe)
    }

    /// Is this state past creation but not yet resolved?
    pub fn is_in_cycle(&self) -> bool {
        !matches!(self, CycleState::Idle) && !self.is_terminal()
    }

    /// Does this state imply resting orders on the exchange?
    pub fn has_working_orders(&self) -> bool {
        matches!(
            self,
            CycleState::EntryWorking
                | CycleState::PartialFill
                | CycleState::ExitWorking
                | CycleState::Cleanup
        )
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CycleState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "IDLE" => Ok(CycleState::Idle),
            "ARMED" => Ok(CycleState::Armed),
            "ENTRY_WORKING" => Ok(CycleState::EntryWorking),
            "PARTIAL_FILL" => Ok(CycleState::PartialFill),
            "HEDGED" => Ok(CycleState::Hedged),
            "EXIT_WORKING" => Ok(CycleState::ExitWorking),
            "DONE" => Ok(CycleState::Done),
            "CLEANUP" => Ok(CycleState::Cleanup),
            "FAILSAFE" => Ok(CycleState::Failsafe),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use CycleState::*;

        assert!(Idle.can_transition_to(Armed));
        assert!(Armed.can_transition_to(EntryWorking));
        assert!(EntryWorking.can_transition_to(PartialFill));
        assert!(PartialFill.can_transition_to(Hedged));
        assert!(Hedged.can_transition_to(ExitWorking));
        assert!(ExitWorking.can_transition_to(Done));
        assert!(Cleanup.can_transition_to(Done));

        // No skipping stages
        assert!(!Idle.can_transition_to(EntryWorking));
        assert!(!Armed.can_transition_to(PartialFill));
        assert!(!EntryWorking.can_transition_to(Hedged));
        assert!(!Hedged.can_transition_to(Done));
        // No going backwards
        assert!(!Hedged.can_transition_to(PartialFill));
        assert!(!Done.can_transition_to(Idle));
    }

    #[test]
    fn test_abort_paths() {
        use CycleState::*;

        for s in [Idle, Armed, EntryWorking, PartialFill, Hedged, ExitWorking] {
            assert!(s.can_transition_to(Failsafe), "{s} -> FAILSAFE");
            assert!(s.can_transition_to(Cleanup), "{s} -> CLEANUP");
        }
        assert!(Cleanup.can_transition_to(Failsafe));

        // Terminal states are sinks
        assert!(!Done.can_transition_to(Failsafe));
        assert!(!Failsafe.can_transition_to(Cleanup));
        assert!(Done.valid_transitions().is_empty());
        assert!(Failsafe.valid_transitions().is_empty());
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!(
            CycleState::try_from("ENTRY_WORKING").unwrap(),
            CycleState::EntryWorking
        );
        assert_eq!(
            CycleState::try_from("partial_fill").unwrap(),
            CycleState::PartialFill
        );
        assert!(CycleState::try_from("INVALID").is_err());
    }

    #[test]
    fn test_has_working_orders() {
        assert!(!CycleState::Idle.has_working_orders());
        assert!(!CycleState::Armed.has_working_orders());
        assert!(CycleState::EntryWorking.has_working_orders());
        assert!(CycleState::PartialFill.has_working_orders());
        assert!(!CycleState::Hedged.has_working_orders());
        assert!(CycleState::ExitWorking.has_working_orders());
        assert!(CycleState::Cleanup.has_working_orders());
        assert!(!CycleState::Done.has_working_orders());
    }
}
