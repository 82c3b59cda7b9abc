use thiserror::Error;

/// Main error type for the cycle engine
#[derive(Error, Debug)]
pub enum DuetError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Quote unavailable for token: {token_id}")]
    QuoteUnavailable { token_id: String },

    #[error("Market not configured: {0}")]
    MarketNotConfigured(String),

    // Order execution errors
    #[error("Order submission failed: {0}")]
    OrderSubmission(String),

    #[error("Order timeout: {0}")]
    OrderTimeout(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Cancellation failed for order {order_id}: {reason}")]
    CancellationFailed { order_id: String, reason: String },

    #[error("Order {order_id} filled before it could be cancelled")]
    FilledBeforeCancel { order_id: String },

    #[error("Inconsistent fill report for order {order_id}: {reason}")]
    InconsistentFill { order_id: String, reason: String },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unexpected state: {0}")]
    UnexpectedState(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DuetError
pub type Result<T> = std::result::Result<T, DuetError>;

/// Specific error types for order execution
#[derive(Error, Debug, Clone)]
pub enum OrderError {
    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("Timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Max retries exceeded: {attempts}")]
    MaxRetriesExceeded { attempts: u8 },
}

impl From<OrderError> for DuetError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Timeout { elapsed_ms } => {
                DuetError::OrderTimeout(format!("{elapsed_ms}ms"))
            }
            _ => DuetError::OrderSubmission(err.to_string()),
        }
    }
}
