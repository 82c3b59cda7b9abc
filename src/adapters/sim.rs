//! Simulated exchange used for the dry-run execution path and tests.
//!
//! Fills are deterministic by default: limit orders rest until the test
//! (or the optional probabilistic fill model) fills them, marketable
//! orders fill immediately against the stored quote.

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::exchange::ExchangeClient;
use crate::domain::{FillReport, OrderRequest, OrderStatus, OrderType, Quote};
use crate::error::{DuetError, OrderError, Result};

#[derive(Debug, Clone)]
struct SimOrder {
    request: OrderRequest,
    status: OrderStatus,
    filled_size: Decimal,
    avg_fill_price: Option<Decimal>,
}

/// In-memory exchange double
#[derive(Clone, Default)]
pub struct SimulatedExchange {
    orders: Arc<Mutex<HashMap<String, SimOrder>>>,
    quotes: Arc<Mutex<HashMap<String, Quote>>>,
    next_id: Arc<AtomicU64>,
    /// Remaining placements to reject (transient-error injection)
    fail_placements: Arc<AtomicU64>,
    /// When set, every cancellation fails (FAILSAFE path testing)
    fail_cancels: Arc<AtomicBool>,
    /// Remaining cancellations to reject transiently
    fail_cancel_count: Arc<AtomicU64>,
    /// Remaining status polls to fail (network-error injection)
    fail_status_polls: Arc<AtomicU64>,
    /// Per-poll probability that an open limit order fills at its price,
    /// in percent. Zero disables the random fill model.
    fill_chance_pct: Arc<AtomicU64>,
}

impl SimulatedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the probabilistic fill model used by the dry-run loop
    pub fn with_fill_chance_pct(self, pct: u64) -> Self {
        self.fill_chance_pct.store(pct.min(100), Ordering::Relaxed);
        self
    }

    pub async fn set_quote(&self, token_id: &str, bid: Option<Decimal>, ask: Option<Decimal>) {
        self.quotes
            .lock()
            .await
            .insert(token_id.to_string(), Quote::new(bid, ask));
    }

    /// Force-fill an open order (test control)
    pub async fn fill(&self, exchange_order_id: &str, size: Decimal, price: Decimal) {
        let mut orders = self.orders.lock().await;
        if let Some(order) = orders.get_mut(exchange_order_id) {
            if order.status == OrderStatus::Open {
                order.status = OrderStatus::Filled;
                order.filled_size = size;
                order.avg_fill_price = Some(price);
            }
        }
    }

    /// Expire an open order (test control)
    pub async fn expire(&self, exchange_order_id: &str) {
        let mut orders = self.orders.lock().await;
        if let Some(order) = orders.get_mut(exchange_order_id) {
            if order.status == OrderStatus::Open {
                order.status = OrderStatus::Expired;
            }
        }
    }

    pub fn fail_next_placements(&self, count: u64) {
        self.fail_placements.store(count, Ordering::Relaxed);
    }

    pub fn set_fail_cancels(&self, fail: bool) {
        self.fail_cancels.store(fail, Ordering::Relaxed);
    }

    pub fn fail_next_cancels(&self, count: u64) {
        self.fail_cancel_count.store(count, Ordering::Relaxed);
    }

    pub fn fail_next_status_polls(&self, count: u64) {
        self.fail_status_polls.store(count, Ordering::Relaxed);
    }

    pub async fn open_order_count(&self) -> usize {
        self.orders
            .lock()
            .await
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .count()
    }

    pub async fn order_by_client_id(&self, client_order_id: &str) -> Option<String> {
        self.orders
            .lock()
            .await
            .iter()
            .find(|(_, o)| o.request.client_order_id == client_order_id)
            .map(|(id, _)| id.clone())
    }

    fn next_exchange_id(&self) -> String {
        format!("sim-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    async fn place_order(&self, request: &OrderRequest) -> Result<String> {
        let remaining = self.fail_placements.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_placements.store(remaining - 1, Ordering::Relaxed);
            return Err(DuetError::OrderSubmission(
                "simulated placement rejection".to_string(),
            ));
        }

        let exchange_id = self.next_exchange_id();
        let mut order = SimOrder {
            request: request.clone(),
            status: OrderStatus::Open,
            filled_size: Decimal::ZERO,
            avg_fill_price: None,
        };

        // Marketable orders cross the stored quote immediately
        if request.order_type == OrderType::Market {
            let quotes = self.quotes.lock().await;
            let fill_price = quotes
                .get(&request.token_id)
                .and_then(|q| q.best_bid)
                .unwrap_or(request.price);
            order.status = OrderStatus::Filled;
            order.filled_size = request.size;
            order.avg_fill_price = Some(fill_price);
        }

        debug!(
            exchange_id = %exchange_id,
            token = %request.token_id,
            "simulated order accepted"
        );
        self.orders.lock().await.insert(exchange_id.clone(), order);
        Ok(exchange_id)
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<()> {
        if self.fail_cancels.load(Ordering::Relaxed) {
            return Err(DuetError::CancellationFailed {
                order_id: exchange_order_id.to_string(),
                reason: "simulated cancellation failure".to_string(),
            });
        }

        let remaining = self.fail_cancel_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_cancel_count.store(remaining - 1, Ordering::Relaxed);
            return Err(DuetError::CancellationFailed {
                order_id: exchange_order_id.to_string(),
                reason: "simulated transient cancellation rejection".to_string(),
            });
        }

        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(exchange_order_id)
            .ok_or_else(|| DuetError::CancellationFailed {
                order_id: exchange_order_id.to_string(),
                reason: "order not found".to_string(),
            })?;

        match order.status {
            OrderStatus::Open => {
                order.status = OrderStatus::Cancelled;
                Ok(())
            }
            OrderStatus::Filled => Err(DuetError::FilledBeforeCancel {
                order_id: exchange_order_id.to_string(),
            }),
            // Cancelling an already-dead order is a no-op
            _ => Ok(()),
        }
    }

    async fn order_status(&self, exchange_order_id: &str) -> Result<FillReport> {
        let remaining = self.fail_status_polls.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_status_polls.store(remaining - 1, Ordering::Relaxed);
            return Err(DuetError::OrderTimeout(
                "simulated status poll timeout".to_string(),
            ));
        }

        let mut orders = self.orders.lock().await;
        let order = orders.get_mut(exchange_order_id).ok_or_else(|| {
            OrderError::NotFound {
                order_id: exchange_order_id.to_string(),
            }
        })?;

        // Optional random fill model for dry-run realism
        let chance = self.fill_chance_pct.load(Ordering::Relaxed);
        if chance > 0 && order.status == OrderStatus::Open {
            let roll: u64 = rand::thread_rng().gen_range(0..100);
            if roll < chance {
                order.status = OrderStatus::Filled;
                order.filled_size = order.request.size;
                order.avg_fill_price = Some(order.request.price);
            }
        }

        Ok(FillReport {
            exchange_order_id: exchange_order_id.to_string(),
            status: order.status,
            filled_size: order.filled_size,
            avg_fill_price: order.avg_fill_price,
        })
    }

    async fn best_quote(&self, token_id: &str) -> Result<Quote> {
        self.quotes
            .lock()
            .await
            .get(token_id)
            .copied()
            .ok_or_else(|| DuetError::QuoteUnavailable {
                token_id: token_id.to_string(),
            })
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_limit_order_rests_until_filled() {
        let sim = SimulatedExchange::new();
        let req = OrderRequest::buy_limit("tok-yes".into(), Side::Yes, dec!(5), dec!(0.45));
        let id = sim.place_order(&req).await.unwrap();

        let report = sim.order_status(&id).await.unwrap();
        assert_eq!(report.status, OrderStatus::Open);

        sim.fill(&id, dec!(5), dec!(0.45)).await;
        let report = sim.order_status(&id).await.unwrap();
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.filled_size, dec!(5));
    }

    #[tokio::test]
    async fn test_marketable_order_crosses_quote() {
        let sim = SimulatedExchange::new();
        sim.set_quote("tok-yes", Some(dec!(0.52)), Some(dec!(0.55)))
            .await;

        let req = OrderRequest::sell_marketable("tok-yes".into(), Side::Yes, dec!(5), dec!(0.01));
        let id = sim.place_order(&req).await.unwrap();

        let report = sim.order_status(&id).await.unwrap();
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.avg_fill_price, Some(dec!(0.52)));
    }

    #[tokio::test]
    async fn test_cancel_filled_order_fails() {
        let sim = SimulatedExchange::new();
        let req = OrderRequest::buy_limit("tok-no".into(), Side::No, dec!(5), dec!(0.45));
        let id = sim.place_order(&req).await.unwrap();
        sim.fill(&id, dec!(5), dec!(0.45)).await;

        assert!(matches!(
            sim.cancel_order(&id).await,
            Err(DuetError::FilledBeforeCancel { .. })
        ));
    }

    #[tokio::test]
    async fn test_transient_cancel_failure_injection() {
        let sim = SimulatedExchange::new();
        let req = OrderRequest::buy_limit("tok-yes".into(), Side::Yes, dec!(5), dec!(0.45));
        let id = sim.place_order(&req).await.unwrap();

        sim.fail_next_cancels(1);
        assert!(matches!(
            sim.cancel_order(&id).await,
            Err(DuetError::CancellationFailed { .. })
        ));
        assert!(sim.cancel_order(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_poll_failure_injection() {
        let sim = SimulatedExchange::new();
        let req = OrderRequest::buy_limit("tok-yes".into(), Side::Yes, dec!(5), dec!(0.45));
        let id = sim.place_order(&req).await.unwrap();

        sim.fail_next_status_polls(1);
        assert!(sim.order_status(&id).await.is_err());
        assert!(sim.order_status(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_placement_failure_injection() {
        let sim = SimulatedExchange::new();
        sim.fail_next_placements(1);

        let req = OrderRequest::buy_limit("tok-yes".into(), Side::Yes, dec!(5), dec!(0.45));
        assert!(sim.place_order(&req).await.is_err());
        assert!(sim.place_order(&req).await.is_ok());
    }
}
