//! Exchange client seam.
//!
//! The state machine only ever talks to an `ExchangeClient`. The live
//! implementation is a thin JSON/REST client; the dry-run implementation
//! lives in `sim.rs`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::{FillReport, OrderRequest, OrderStatus, Quote};
use crate::error::{DuetError, Result};

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit an order, returning the exchange order id
    async fn place_order(&self, request: &OrderRequest) -> Result<String>;

    /// Cancel a resting order
    async fn cancel_order(&self, exchange_order_id: &str) -> Result<()>;

    /// Current status and fill report for an order
    async fn order_status(&self, exchange_order_id: &str) -> Result<FillReport>;

    /// Top-of-book quote for a token
    async fn best_quote(&self, token_id: &str) -> Result<Quote>;

    /// Whether this client simulates fills instead of reaching an exchange
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Live REST exchange client
pub struct RestExchange {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderStatusResponse {
    order_id: String,
    status: String,
    filled_size: Decimal,
    #[serde(default)]
    avg_fill_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct BookResponse {
    #[serde(default)]
    best_bid: Option<Decimal>,
    #[serde(default)]
    best_ask: Option<Decimal>,
}

impl RestExchange {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn parse_status(raw: &str) -> Result<OrderStatus> {
        match raw.to_uppercase().as_str() {
            "OPEN" | "LIVE" => Ok(OrderStatus::Open),
            "FILLED" | "MATCHED" => Ok(OrderStatus::Filled),
            "CANCELLED" | "CANCELED" => Ok(OrderStatus::Cancelled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "EXPIRED" => Ok(OrderStatus::Expired),
            other => Err(DuetError::OrderRejected(format!(
                "unknown order status from exchange: {other}"
            ))),
        }
    }
}

#[async_trait]
impl ExchangeClient for RestExchange {
    #[instrument(skip(self, request), fields(client_order_id = %request.client_order_id))]
    async fn place_order(&self, request: &OrderRequest) -> Result<String> {
        let url = format!("{}/orders", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DuetError::OrderSubmission(format!("{status}: {body}")));
        }

        let placed: PlaceOrderResponse = resp.json().await?;
        debug!(order_id = %placed.order_id, "order placed");
        Ok(placed.order_id)
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<()> {
        let url = format!("{}/orders/{}", self.base_url, exchange_order_id);
        let resp = self.client.delete(&url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            // The venue rejects a cancel of a matched order; that race
            // is terminal, everything else is worth retrying
            if body.to_lowercase().contains("filled") || body.to_lowercase().contains("matched") {
                return Err(DuetError::FilledBeforeCancel {
                    order_id: exchange_order_id.to_string(),
                });
            }
            return Err(DuetError::CancellationFailed {
                order_id: exchange_order_id.to_string(),
                reason: format!("{status}: {body}"),
            });
        }
        Ok(())
    }

    async fn order_status(&self, exchange_order_id: &str) -> Result<FillReport> {
        let url = format!("{}/orders/{}", self.base_url, exchange_order_id);
        let resp: OrderStatusResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(FillReport {
            exchange_order_id: resp.order_id,
            status: Self::parse_status(&resp.status)?,
            filled_size: resp.filled_size,
            avg_fill_price: resp.avg_fill_price,
        })
    }

    async fn best_quote(&self, token_id: &str) -> Result<Quote> {
        let url = format!("{}/book", self.base_url);
        let resp: BookResponse = self
            .client
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Quote::new(resp.best_bid, resp.best_ask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(RestExchange::parse_status("live").unwrap(), OrderStatus::Open);
        assert_eq!(
            RestExchange::parse_status("MATCHED").unwrap(),
            OrderStatus::Filled
        );
        assert_eq!(
            RestExchange::parse_status("canceled").unwrap(),
            OrderStatus::Cancelled
        );
        assert!(RestExchange::parse_status("weird").is_err());
    }
}
