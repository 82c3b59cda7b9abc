//! Order execution wrapper.
//!
//! Thin layer between the state machine and the exchange seam that owns
//! retry policy. Placement retries with exponential backoff; status
//! polls and quotes pass straight through.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::ExchangeClient;
use crate::config::ExecutionConfig;
use crate::domain::{FillReport, OrderRequest, Quote};
use crate::error::{DuetError, OrderError, Result};

pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    config: ExecutionConfig,
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn ExchangeClient>, config: ExecutionConfig) -> Self {
        Self { client, config }
    }

    pub fn is_dry_run(&self) -> bool {
        self.client.is_dry_run()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Retry budget shared by placement, cancellation and status polling
    pub fn max_retries(&self) -> u8 {
        self.config.max_retries
    }

    /// Place an order, retrying transient failures with exponential
    /// backoff. Exhausting the retry budget is an unrecoverable error.
    pub async fn place_with_retry(&self, request: &OrderRequest) -> Result<String> {
        let mut attempts: u8 = 0;
        loop {
            match self.client.place_order(request).await {
                Ok(order_id) => {
                    debug!(
                        client_order_id = %request.client_order_id,
                        order_id = %order_id,
                        attempts = attempts + 1,
                        "order placed"
                    );
                    return Ok(order_id);
                }
                Err(e) if attempts + 1 < self.config.max_retries => {
                    warn!(
                        client_order_id = %request.client_order_id,
                        attempt = attempts + 1,
                        error = %e,
                        "order placement failed, retrying"
                    );
                    let backoff = self.config.retry_backoff_ms * (1 << attempts);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempts += 1;
                }
                Err(e) => {
                    warn!(
                        client_order_id = %request.client_order_id,
                        attempts = attempts + 1,
                        error = %e,
                        "order placement exhausted retries"
                    );
                    return Err(OrderError::MaxRetriesExceeded {
                        attempts: attempts + 1,
                    }
                    .into());
                }
            }
        }
    }

    pub async fn cancel(&self, exchange_order_id: &str) -> Result<()> {
        self.client.cancel_order(exchange_order_id).await
    }

    /// Cancel with the same backoff policy as placement. A cancel that
    /// lost the race to a fill is NOT retried; that condition is
    /// surfaced to the caller immediately. Rejections and network
    /// failures are transient and retried.
    pub async fn cancel_with_retry(&self, exchange_order_id: &str) -> Result<()> {
        let mut attempts: u8 = 0;
        loop {
            match self.client.cancel_order(exchange_order_id).await {
                Ok(()) => return Ok(()),
                Err(e @ DuetError::FilledBeforeCancel { .. }) => return Err(e),
                Err(e) if attempts + 1 < self.config.max_retries => {
                    warn!(
                        order_id = %exchange_order_id,
                        attempt = attempts + 1,
                        error = %e,
                        "cancel failed, retrying"
                    );
                    let backoff = self.config.retry_backoff_ms * (1 << attempts);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn status(&self, exchange_order_id: &str) -> Result<FillReport> {
        self.client.order_status(exchange_order_id).await
    }

    pub async fn best_quote(&self, token_id: &str) -> Result<Quote> {
        self.client.best_quote(token_id).await
    }
}
