//! In-memory cycle store.
//!
//! The state machine swaps whole cycle records under the write lock, so
//! readers (status aggregator, API handlers) only ever observe a cycle
//! post-transition, never with half-applied fields.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::Cycle;

#[derive(Clone, Default)]
pub struct CycleStore {
    cycles: Arc<RwLock<BTreeMap<u64, Cycle>>>,
    next_number: Arc<AtomicU64>,
}

impl CycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next monotonically increasing cycle number
    pub fn next_cycle_number(&self) -> u64 {
        self.next_number.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn insert(&self, cycle: Cycle) {
        self.cycles.write().await.insert(cycle.cycle_number, cycle);
    }

    /// Replace the stored record for this cycle in one atomic swap
    pub async fn update(&self, cycle: Cycle) {
        self.cycles.write().await.insert(cycle.cycle_number, cycle);
    }

    pub async fn get(&self, cycle_number: u64) -> Option<Cycle> {
        self.cycles.read().await.get(&cycle_number).cloned()
    }

    /// All cycles, ordered by cycle number
    pub async fn history(&self) -> Vec<Cycle> {
        self.cycles.read().await.values().cloned().collect()
    }

    /// Most recent cycle in a non-terminal state
    pub async fn current(&self) -> Option<Cycle> {
        self.cycles
            .read()
            .await
            .values()
            .rev()
            .find(|c| !c.state.is_terminal())
            .cloned()
    }

    /// Most recent cycle of any state (for display when nothing is active)
    pub async fn latest(&self) -> Option<Cycle> {
        self.cycles.read().await.values().next_back().cloned()
    }

    pub async fn non_terminal_count(&self) -> usize {
        self.cycles
            .read()
            .await
            .values()
            .filter(|c| !c.state.is_terminal())
            .count()
    }

    pub async fn non_terminal_numbers(&self) -> Vec<u64> {
        self.cycles
            .read()
            .await
            .values()
            .filter(|c| !c.state.is_terminal())
            .map(|c| c.cycle_number)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CycleState;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn cycle(number: u64, state: CycleState) -> Cycle {
        let start = Utc::now();
        let mut c = Cycle::new(
            number,
            start,
            start + chrono::Duration::seconds(300),
            dec!(0.01),
            true,
        );
        c.state = state;
        c
    }

    #[tokio::test]
    async fn test_cycle_numbers_monotonic() {
        let store = CycleStore::new();
        let a = store.next_cycle_number();
        let b = store.next_cycle_number();
        let c = store.next_cycle_number();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_current_is_most_recent_non_terminal() {
        let store = CycleStore::new();
        store.insert(cycle(1, CycleState::Done)).await;
        store.insert(cycle(2, CycleState::ExitWorking)).await;
        store.insert(cycle(3, CycleState::Failsafe)).await;

        let current = store.current().await.unwrap();
        assert_eq!(current.cycle_number, 2);
        assert_eq!(store.non_terminal_count().await, 1);
    }

    #[tokio::test]
    async fn test_history_ordered() {
        let store = CycleStore::new();
        store.insert(cycle(3, CycleState::Done)).await;
        store.insert(cycle(1, CycleState::Done)).await;
        store.insert(cycle(2, CycleState::Done)).await;

        let numbers: Vec<u64> = store
            .history()
            .await
            .iter()
            .map(|c| c.cycle_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_update_replaces_record() {
        let store = CycleStore::new();
        store.insert(cycle(1, CycleState::Armed)).await;

        let mut updated = cycle(1, CycleState::Done);
        updated.pnl = Some(dec!(1.5));
        store.update(updated).await;

        let stored = store.get(1).await.unwrap();
        assert_eq!(stored.state, CycleState::Done);
        assert_eq!(stored.pnl, Some(dec!(1.5)));
        assert_eq!(store.non_terminal_count().await, 0);
    }
}
