use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market side for a binary-outcome market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Side {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "YES" => Ok(Side::Yes),
            "NO" => Ok(Side::No),
            _ => Err(format!("Unknown side: {}", s)),
        }
    }
}

/// Top-of-book quote for one token
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(best_bid: Option<Decimal>, best_ask: Option<Decimal>) -> Self {
        Self {
            best_bid,
            best_ask,
            timestamp: Utc::now(),
        }
    }

    /// Absolute bid/ask spread, when both sides are quoted
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) if ask >= bid => Some(ask - bid),
            _ => None,
        }
    }

    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }
}

/// Point-in-time volatility reading exposed to the scheduler and the
/// status endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolatilitySnapshot {
    /// Annualization-free realized volatility over the window (fractional)
    pub current: Decimal,
    /// Window length the reading covers, seconds
    pub window_secs: u64,
    /// Lowest underlying price seen in the window
    pub window_min: Option<Decimal>,
    /// Highest underlying price seen in the window
    pub window_max: Option<Decimal>,
    /// Whether the reading is inside the configured filter band
    pub in_range: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.opposite(), Side::Yes);
        assert_eq!(Side::try_from("yes").unwrap(), Side::Yes);
        assert!(Side::try_from("MAYBE").is_err());
    }

    #[test]
    fn test_quote_spread() {
        let q = Quote::new(Some(dec!(0.44)), Some(dec!(0.47)));
        assert_eq!(q.spread(), Some(dec!(0.03)));
        assert_eq!(q.mid(), Some(dec!(0.455)));

        let one_sided = Quote::new(Some(dec!(0.44)), None);
        assert_eq!(one_sided.spread(), None);
    }
}
