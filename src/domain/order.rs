use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Side;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    /// Spread-crossing marketable order, used only for the forced TTL exit
    Market,
}

/// Order status as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Resting on the book
    Open,
    /// Fully filled
    Filled,
    /// Cancelled by us
    Cancelled,
    /// Rejected by the exchange
    Rejected,
    /// Expired on the exchange
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Open)
    }
}

/// Order request (what we want the exchange to do)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub token_id: String,
    pub market_side: Side,
    pub order_side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub size: Decimal,
}

impl OrderRequest {
    pub fn buy_limit(token_id: String, market_side: Side, size: Decimal, price: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            token_id,
            market_side,
            order_side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price,
            size,
        }
    }

    pub fn sell_limit(token_id: String, market_side: Side, size: Decimal, price: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            token_id,
            market_side,
            order_side: OrderSide::Sell,
            order_type: OrderType::Limit,
            price,
            size,
        }
    }

    /// Marketable sell used for the forced exit when the exit TTL elapses.
    /// The price is a crossing limit (at or through the far side of the book).
    pub fn sell_marketable(
        token_id: String,
        market_side: Side,
        size: Decimal,
        crossing_price: Decimal,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            token_id,
            market_side,
            order_side: OrderSide::Sell,
            order_type: OrderType::Market,
            price: crossing_price,
            size,
        }
    }
}

/// Fill/status report from the exchange for one order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillReport {
    pub exchange_order_id: String,
    pub status: OrderStatus,
    pub filled_size: Decimal,
    pub avg_fill_price: Option<Decimal>,
}

impl FillReport {
    /// A report claiming more filled than requested is inconsistent and
    /// must escalate to FAILSAFE.
    pub fn is_consistent_with(&self, requested_size: Decimal) -> bool {
        self.filled_size <= requested_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_request_ids_unique() {
        let a = OrderRequest::buy_limit("tok".into(), Side::Yes, dec!(5), dec!(0.45));
        let b = OrderRequest::buy_limit("tok".into(), Side::Yes, dec!(5), dec!(0.45));
        assert_ne!(a.client_order_id, b.client_order_id);
        assert_eq!(a.order_side, OrderSide::Buy);
        assert_eq!(a.order_type, OrderType::Limit);
    }

    #[test]
    fn test_fill_report_consistency() {
        let report = FillReport {
            exchange_order_id: "x1".into(),
            status: OrderStatus::Filled,
            filled_size: dec!(5),
            avg_fill_price: Some(dec!(0.45)),
        };
        assert!(report.is_consistent_with(dec!(5)));
        assert!(!report.is_consistent_with(dec!(4)));
    }

    #[test]
    fn test_status_terminality() {
        assert!(OrderStatus::Open.is_active());
        assert!(!OrderStatus::Open.is_terminal());
        for s in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert!(s.is_terminal());
        }
    }
}
