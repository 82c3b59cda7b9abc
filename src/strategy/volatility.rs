//! Rolling volatility and momentum readings for the underlying.
//!
//! Feeds the scheduler's volatility filter, the dynamic modifier
//! pipeline, and the volatility block of the status snapshot.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::VecDeque;

use crate::config::VolatilityFilterConfig;
use crate::domain::VolatilitySnapshot;

#[derive(Debug, Clone, Copy)]
struct PricePoint {
    price: Decimal,
    timestamp: DateTime<Utc>,
}

/// Tracks recent underlying prices over a fixed time window
#[derive(Debug, Clone)]
pub struct VolatilityTracker {
    points: VecDeque<PricePoint>,
    window_secs: u64,
}

impl VolatilityTracker {
    pub fn new(window_secs: u64) -> Self {
        Self {
            points: VecDeque::new(),
            window_secs,
        }
    }

    /// Record a new underlying price
    pub fn record(&mut self, price: Decimal) {
        self.record_at(price, Utc::now());
    }

    pub fn record_at(&mut self, price: Decimal, timestamp: DateTime<Utc>) {
        self.points.push_back(PricePoint { price, timestamp });
        let cutoff = timestamp - Duration::seconds(self.window_secs as i64);
        while let Some(front) = self.points.front() {
            if front.timestamp < cutoff {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    /// Realized volatility over the window: standard deviation of
    /// per-update simple returns. Zero until two points exist.
    pub fn current(&self) -> Decimal {
        if self.points.len() < 2 {
            return Decimal::ZERO;
        }

        let prices: Vec<f64> = self
            .points
            .iter()
            .filter_map(|p| p.price.to_f64())
            .collect();

        let returns: Vec<f64> = prices
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();

        if returns.is_empty() {
            return Decimal::ZERO;
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;

        Decimal::from_f64(variance.sqrt()).unwrap_or(Decimal::ZERO)
    }

    /// Signed fractional move from the oldest to the newest point in
    /// the window. Positive = underlying drifting up.
    pub fn momentum(&self) -> Decimal {
        let (first, last) = match (self.points.front(), self.points.back()) {
            (Some(f), Some(l)) => (f.price, l.price),
            _ => return Decimal::ZERO,
        };
        if first.is_zero() {
            return Decimal::ZERO;
        }
        (last - first) / first
    }

    pub fn window_min(&self) -> Option<Decimal> {
        self.points.iter().map(|p| p.price).min()
    }

    pub fn window_max(&self) -> Option<Decimal> {
        self.points.iter().map(|p| p.price).max()
    }

    /// Snapshot for the scheduler filter and the status endpoint
    pub fn snapshot(&self, filter: &VolatilityFilterConfig) -> VolatilitySnapshot {
        let current = self.current();
        let in_range = if filter.enabled {
            current >= filter.vol_min_threshold && current <= filter.vol_max_threshold
        } else {
            true
        };

        VolatilitySnapshot {
            current,
            window_secs: self.window_secs,
            window_min: self.window_min(),
            window_max: self.window_max(),
            in_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tracker_with(prices: &[Decimal]) -> VolatilityTracker {
        let mut tracker = VolatilityTracker::new(300);
        let base = Utc::now();
        for (i, p) in prices.iter().enumerate() {
            tracker.record_at(*p, base + Duration::seconds(i as i64));
        }
        tracker
    }

    #[test]
    fn test_flat_prices_zero_volatility() {
        let tracker = tracker_with(&[dec!(50000), dec!(50000), dec!(50000)]);
        assert_eq!(tracker.current(), Decimal::ZERO);
        assert_eq!(tracker.momentum(), Decimal::ZERO);
    }

    #[test]
    fn test_moving_prices_positive_volatility() {
        let tracker = tracker_with(&[dec!(50000), dec!(50500), dec!(49800), dec!(50200)]);
        assert!(tracker.current() > Decimal::ZERO);
        assert_eq!(tracker.window_min(), Some(dec!(49800)));
        assert_eq!(tracker.window_max(), Some(dec!(50500)));
    }

    #[test]
    fn test_momentum_sign() {
        let up = tracker_with(&[dec!(50000), dec!(50250)]);
        assert!(up.momentum() > Decimal::ZERO);

        let down = tracker_with(&[dec!(50000), dec!(49750)]);
        assert!(down.momentum() < Decimal::ZERO);
    }

    #[test]
    fn test_old_points_pruned() {
        let mut tracker = VolatilityTracker::new(60);
        let base = Utc::now();
        tracker.record_at(dec!(50000), base - Duration::seconds(120));
        tracker.record_at(dec!(51000), base);
        // Only the fresh point remains, so no returns to measure
        assert_eq!(tracker.current(), Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_range_check() {
        let tracker = tracker_with(&[dec!(50000), dec!(50500), dec!(49800)]);
        let filter = VolatilityFilterConfig {
            enabled: true,
            vol_min_threshold: dec!(0.5),
            vol_max_threshold: dec!(0.9),
        };
        let snap = tracker.snapshot(&filter);
        assert!(!snap.in_range);

        let disabled = VolatilityFilterConfig::default();
        assert!(tracker.snapshot(&disabled).in_range);
    }
}
