//! Optional decision stages for order pricing and sizing.
//!
//! Each stage takes the configured base value and either passes it
//! through unchanged (disabled) or replaces it with a value interpolated
//! against a live signal and clamped to the configured [min, max] band.
//! The state machine runs the stages at order-placement time, never at
//! config time, and records the results in the cycle's `actual_*` fields.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::{DynamicEntryConfig, DynamicSizeConfig, MomentumTpConfig};
use crate::domain::EntryMethod;

/// Spread width treated as "maximally wide" for entry interpolation
const SPREAD_REF: Decimal = dec!(0.10);
/// Absolute momentum reading treated as full-strength for TP interpolation
const MOMENTUM_REF: Decimal = dec!(0.005);
/// Volatility reading treated as full-strength for size interpolation
const VOLATILITY_REF: Decimal = dec!(0.02);

/// Live readings sampled at the moment an order is placed
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveSignals {
    /// Bid/ask spread width on the traded market
    pub spread: Option<Decimal>,
    /// Signed underlying momentum, fractional
    pub momentum: Decimal,
    /// Realized underlying volatility, fractional
    pub volatility: Decimal,
}

fn clamp(value: Decimal, min: Decimal, max: Decimal) -> Decimal {
    value.max(min).min(max)
}

/// Map `signal` in [0, reference] onto [0, 1], saturating
fn unit_scale(signal: Decimal, reference: Decimal) -> Decimal {
    if reference <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    clamp(signal / reference, Decimal::ZERO, Decimal::ONE)
}

/// Entry price stage: a wider spread pulls the resting entry toward the
/// bottom of the band (less aggressive when the book is thin).
pub fn entry_price(
    cfg: &DynamicEntryConfig,
    base: Decimal,
    signals: &LiveSignals,
) -> (Decimal, EntryMethod) {
    if !cfg.enabled {
        return (base, EntryMethod::Static);
    }
    let spread = match signals.spread {
        Some(s) => s,
        // No usable spread reading: fall back to the static price
        None => return (base, EntryMethod::Static),
    };

    let weight = unit_scale(spread, SPREAD_REF);
    let computed = cfg.max_price - (cfg.max_price - cfg.min_price) * weight;
    (clamp(computed, cfg.min_price, cfg.max_price), EntryMethod::Dynamic)
}

/// Take-profit stage: momentum in the winner's favor stretches the TP
/// toward the top of the band, adverse momentum compresses it.
pub fn tp_price(cfg: &MomentumTpConfig, base: Decimal, signals: &LiveSignals) -> Decimal {
    if !cfg.enabled {
        return base;
    }

    // Shift signed momentum into [0, 1] around the band midpoint
    let strength = clamp(
        signals.momentum / MOMENTUM_REF,
        dec!(-1),
        Decimal::ONE,
    );
    let half = (cfg.max_price - cfg.min_price) / Decimal::TWO;
    let mid = cfg.min_price + half;
    clamp(mid + half * strength, cfg.min_price, cfg.max_price)
}

/// Size stage: higher realized volatility shrinks the order toward the
/// bottom of the band.
pub fn order_size(cfg: &DynamicSizeConfig, base: Decimal, signals: &LiveSignals) -> Decimal {
    if !cfg.enabled {
        return base;
    }

    let weight = unit_scale(signals.volatility, VOLATILITY_REF);
    let computed = cfg.max_size - (cfg.max_size - cfg.min_size) * weight;
    clamp(computed, cfg.min_size, cfg.max_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(spread: Option<Decimal>, momentum: Decimal, volatility: Decimal) -> LiveSignals {
        LiveSignals {
            spread,
            momentum,
            volatility,
        }
    }

    #[test]
    fn test_disabled_stages_pass_through() {
        let s = signals(Some(dec!(0.08)), dec!(0.004), dec!(0.03));

        let (price, method) = entry_price(&DynamicEntryConfig::default(), dec!(0.45), &s);
        assert_eq!(price, dec!(0.45));
        assert_eq!(method, EntryMethod::Static);

        assert_eq!(tp_price(&MomentumTpConfig::default(), dec!(0.65), &s), dec!(0.65));
        assert_eq!(order_size(&DynamicSizeConfig::default(), dec!(5), &s), dec!(5));
    }

    #[test]
    fn test_entry_price_responds_to_spread() {
        let cfg = DynamicEntryConfig {
            enabled: true,
            min_price: dec!(0.40),
            max_price: dec!(0.48),
        };

        // Tight book: entry near the top of the band
        let (tight, method) = entry_price(&cfg, dec!(0.45), &signals(Some(dec!(0.00)), dec!(0), dec!(0)));
        assert_eq!(tight, dec!(0.48));
        assert_eq!(method, EntryMethod::Dynamic);

        // Wide book: entry pinned to the bottom of the band
        let (wide, _) = entry_price(&cfg, dec!(0.45), &signals(Some(dec!(0.20)), dec!(0), dec!(0)));
        assert_eq!(wide, dec!(0.40));
    }

    #[test]
    fn test_entry_price_no_spread_falls_back_static() {
        let cfg = DynamicEntryConfig {
            enabled: true,
            min_price: dec!(0.40),
            max_price: dec!(0.48),
        };
        let (price, method) = entry_price(&cfg, dec!(0.45), &signals(None, dec!(0), dec!(0)));
        assert_eq!(price, dec!(0.45));
        assert_eq!(method, EntryMethod::Static);
    }

    #[test]
    fn test_tp_price_clamped_to_band() {
        let cfg = MomentumTpConfig {
            enabled: true,
            min_price: dec!(0.60),
            max_price: dec!(0.80),
        };

        // Neutral momentum: band midpoint
        assert_eq!(tp_price(&cfg, dec!(0.65), &signals(None, dec!(0), dec!(0))), dec!(0.70));
        // Strong positive momentum saturates at the top
        assert_eq!(
            tp_price(&cfg, dec!(0.65), &signals(None, dec!(0.05), dec!(0))),
            dec!(0.80)
        );
        // Strong negative momentum saturates at the bottom
        assert_eq!(
            tp_price(&cfg, dec!(0.65), &signals(None, dec!(-0.05), dec!(0))),
            dec!(0.60)
        );
    }

    #[test]
    fn test_order_size_shrinks_with_volatility() {
        let cfg = DynamicSizeConfig {
            enabled: true,
            min_size: dec!(2),
            max_size: dec!(10),
        };

        let calm = order_size(&cfg, dec!(5), &signals(None, dec!(0), dec!(0)));
        assert_eq!(calm, dec!(10));

        let stormy = order_size(&cfg, dec!(5), &signals(None, dec!(0), dec!(0.05)));
        assert_eq!(stormy, dec!(2));
    }
}
