use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub strategy: DualEntryConfig,
    pub execution: ExecutionConfig,
    pub dry_run: DryRunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Status/control API port (default: 8080)
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_api_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// REST API endpoint for order execution
    pub rest_url: String,
    /// Underlying symbol the windows are keyed to (e.g., "BTCUSDT")
    pub symbol: String,
    /// Token ID for the YES side (required before start)
    #[serde(default)]
    pub yes_token_id: Option<String>,
    /// Token ID for the NO side (required before start)
    #[serde(default)]
    pub no_token_id: Option<String>,
}

impl MarketConfig {
    /// Both token ids must be present before the engine may start
    pub fn is_tradeable(&self) -> bool {
        self.yes_token_id.is_some() && self.no_token_id.is_some()
    }
}

/// Dual-entry strategy parameters. A snapshot of this record is copied
/// into every cycle at creation; live config writes never affect cycles
/// already in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualEntryConfig {
    /// Resting entry price for both legs, in (0, 1)
    pub entry_price: Decimal,
    /// Take-profit price on the winning side, in (0, 1)
    pub tp_price: Decimal,
    /// Scratch (breakeven) price on the winning side, in (0, 1)
    pub scratch_price: Decimal,
    /// Shares per entry leg
    pub order_size: Decimal,
    /// Window interval in seconds (default: 300)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds to leave entry orders working before no-fill cleanup
    #[serde(default = "default_entry_lead_secs")]
    pub entry_lead_secs: u64,
    /// Seconds to leave exit orders working before the forced close
    #[serde(default = "default_exit_ttl_secs")]
    pub exit_ttl_secs: u64,
    /// Grace period for cleanup cancellations
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_secs: u64,
    /// Maximum cycles in a non-terminal state at once (1..=8)
    #[serde(default = "default_max_concurrent_cycles")]
    pub max_concurrent_cycles: u32,
    /// Cancel the scratch leg in the same transition that records a TP fill
    #[serde(default = "default_true")]
    pub smart_scratch_cancel: bool,

    // Optional behavioral modifiers, each independently enable-flagged.
    // Bounds of a disabled modifier are ignored.
    #[serde(default)]
    pub volatility_filter: VolatilityFilterConfig,
    #[serde(default)]
    pub dynamic_entry: DynamicEntryConfig,
    #[serde(default)]
    pub momentum_tp: MomentumTpConfig,
    #[serde(default)]
    pub dynamic_size: DynamicSizeConfig,
    #[serde(default)]
    pub hour_filter: HourFilterConfig,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_entry_lead_secs() -> u64 {
    180
}

fn default_exit_ttl_secs() -> u64 {
    120
}

fn default_cleanup_secs() -> u64 {
    30
}

fn default_max_concurrent_cycles() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolatilityFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub vol_min_threshold: Decimal,
    #[serde(default)]
    pub vol_max_threshold: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicEntryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_price: Decimal,
    #[serde(default)]
    pub max_price: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MomentumTpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_price: Decimal,
    #[serde(default)]
    pub max_price: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicSizeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_size: Decimal,
    #[serde(default)]
    pub max_size: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    /// UTC hours (0..=23) in which new cycles may start
    #[serde(default)]
    pub allowed_hours: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum retry attempts for order placement
    pub max_retries: u8,
    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Polling interval for order status in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_retry_backoff() -> u64 {
    100
}

fn default_poll_interval() -> u64 {
    500
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 100,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    /// Enable dry run mode (no real orders)
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("execution.max_retries", 3)?
            .set_default("execution.poll_interval_ms", 500)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DUET_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (DUET_MARKET__REST_URL, etc.)
            .add_source(
                Environment::with_prefix("DUET")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(dry_run: bool, symbol: &str) -> Self {
        use rust_decimal_macros::dec;

        Self {
            market: MarketConfig {
                rest_url: "https://clob.polymarket.com".to_string(),
                symbol: symbol.to_string(),
                yes_token_id: None,
                no_token_id: None,
            },
            strategy: DualEntryConfig {
                entry_price: dec!(0.45),
                tp_price: dec!(0.65),
                scratch_price: dec!(0.45),
                order_size: dec!(5),
                interval_secs: 300,
                entry_lead_secs: 180,
                exit_ttl_secs: 120,
                cleanup_secs: 30,
                max_concurrent_cycles: 1,
                smart_scratch_cancel: true,
                volatility_filter: VolatilityFilterConfig::default(),
                dynamic_entry: DynamicEntryConfig::default(),
                momentum_tp: MomentumTpConfig::default(),
                dynamic_size: DynamicSizeConfig::default(),
                hour_filter: HourFilterConfig::default(),
            },
            execution: ExecutionConfig::default(),
            dry_run: DryRunConfig { enabled: dry_run },
            logging: LoggingConfig::default(),
            api_port: 8080,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.strategy.validate_errors();

        if self.market.rest_url.is_empty() {
            errors.push("market.rest_url must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl DualEntryConfig {
    fn validate_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, price) in [
            ("entry_price", self.entry_price),
            ("tp_price", self.tp_price),
            ("scratch_price", self.scratch_price),
        ] {
            if price <= Decimal::ZERO || price >= Decimal::ONE {
                errors.push(format!("{name} must be between 0 and 1"));
            }
        }

        if self.order_size <= Decimal::ZERO {
            errors.push("order_size must be positive".to_string());
        }

        for (name, secs) in [
            ("interval_secs", self.interval_secs),
            ("entry_lead_secs", self.entry_lead_secs),
            ("exit_ttl_secs", self.exit_ttl_secs),
            ("cleanup_secs", self.cleanup_secs),
        ] {
            if secs == 0 {
                errors.push(format!("{name} must be positive"));
            }
        }

        if self.entry_lead_secs >= self.interval_secs {
            errors.push("entry_lead_secs must be less than interval_secs".to_string());
        }

        if !(1..=8).contains(&self.max_concurrent_cycles) {
            errors.push("max_concurrent_cycles must be between 1 and 8".to_string());
        }

        if self.volatility_filter.enabled
            && self.volatility_filter.vol_min_threshold > self.volatility_filter.vol_max_threshold
        {
            errors.push("volatility_filter thresholds inverted".to_string());
        }

        if self.dynamic_entry.enabled && self.dynamic_entry.min_price > self.dynamic_entry.max_price
        {
            errors.push("dynamic_entry price band inverted".to_string());
        }

        if self.momentum_tp.enabled && self.momentum_tp.min_price > self.momentum_tp.max_price {
            errors.push("momentum_tp price band inverted".to_string());
        }

        if self.dynamic_size.enabled && self.dynamic_size.min_size > self.dynamic_size.max_size {
            errors.push("dynamic_size band inverted".to_string());
        }

        if self.hour_filter.enabled {
            if self.hour_filter.allowed_hours.is_empty() {
                errors.push("hour_filter.allowed_hours must not be empty when enabled".to_string());
            }
            if self.hour_filter.allowed_hours.iter().any(|h| *h > 23) {
                errors.push("hour_filter.allowed_hours entries must be 0..=23".to_string());
            }
        }

        errors
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let errors = self.validate_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Partial-update document accepted by the config write endpoint.
/// Every present field is validated against its bounds before any of
/// them is merged; an invalid patch changes nothing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DualEntryPatch {
    pub entry_price: Option<Decimal>,
    pub tp_price: Option<Decimal>,
    pub scratch_price: Option<Decimal>,
    pub order_size: Option<Decimal>,
    pub interval_secs: Option<u64>,
    pub entry_lead_secs: Option<u64>,
    pub exit_ttl_secs: Option<u64>,
    pub cleanup_secs: Option<u64>,
    pub max_concurrent_cycles: Option<u32>,
    pub smart_scratch_cancel: Option<bool>,
    pub volatility_filter: Option<VolatilityFilterConfig>,
    pub dynamic_entry: Option<DynamicEntryConfig>,
    pub momentum_tp: Option<MomentumTpConfig>,
    pub dynamic_size: Option<DynamicSizeConfig>,
    pub hour_filter: Option<HourFilterConfig>,
}

impl DualEntryPatch {
    /// Merge the patch into `base`, all-or-nothing. Returns the field
    /// violations when the merged document would be out of bounds.
    pub fn apply_to(&self, base: &DualEntryConfig) -> Result<DualEntryConfig, Vec<String>> {
        let mut merged = base.clone();

        if let Some(v) = self.entry_price {
            merged.entry_price = v;
        }
        if let Some(v) = self.tp_price {
            merged.tp_price = v;
        }
        if let Some(v) = self.scratch_price {
            merged.scratch_price = v;
        }
        if let Some(v) = self.order_size {
            merged.order_size = v;
        }
        if let Some(v) = self.interval_secs {
            merged.interval_secs = v;
        }
        if let Some(v) = self.entry_lead_secs {
            merged.entry_lead_secs = v;
        }
        if let Some(v) = self.exit_ttl_secs {
            merged.exit_ttl_secs = v;
        }
        if let Some(v) = self.cleanup_secs {
            merged.cleanup_secs = v;
        }
        if let Some(v) = self.max_concurrent_cycles {
            merged.max_concurrent_cycles = v;
        }
        if let Some(v) = self.smart_scratch_cancel {
            merged.smart_scratch_cancel = v;
        }
        if let Some(ref v) = self.volatility_filter {
            merged.volatility_filter = v.clone();
        }
        if let Some(ref v) = self.dynamic_entry {
            merged.dynamic_entry = v.clone();
        }
        if let Some(ref v) = self.momentum_tp {
            merged.momentum_tp = v.clone();
        }
        if let Some(ref v) = self.dynamic_size {
            merged.dynamic_size = v.clone();
        }
        if let Some(ref v) = self.hour_filter {
            merged.hour_filter = v.clone();
        }

        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default_config(true, "BTCUSDT");
        assert!(config.validate().is_ok());
        assert!(!config.market.is_tradeable());
    }

    #[test]
    fn test_price_bounds() {
        let mut config = AppConfig::default_config(true, "BTCUSDT");
        config.strategy.entry_price = dec!(1.2);
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("entry_price")));
    }

    #[test]
    fn test_patch_rejects_out_of_bounds() {
        let base = AppConfig::default_config(true, "BTCUSDT").strategy;

        let patch = DualEntryPatch {
            tp_price: Some(dec!(0)),
            ..Default::default()
        };
        let errors = patch.apply_to(&base).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("tp_price")));

        // Base untouched by the failed patch
        assert_eq!(base.tp_price, dec!(0.65));
    }

    #[test]
    fn test_patch_merges_only_present_fields() {
        let base = AppConfig::default_config(true, "BTCUSDT").strategy;

        let patch = DualEntryPatch {
            exit_ttl_secs: Some(90),
            ..Default::default()
        };
        let merged = patch.apply_to(&base).unwrap();
        assert_eq!(merged.exit_ttl_secs, 90);
        assert_eq!(merged.entry_price, base.entry_price);
        assert_eq!(merged.max_concurrent_cycles, base.max_concurrent_cycles);
    }

    #[test]
    fn test_concurrency_cap_range() {
        let base = AppConfig::default_config(true, "BTCUSDT").strategy;
        let patch = DualEntryPatch {
            max_concurrent_cycles: Some(20),
            ..Default::default()
        };
        assert!(patch.apply_to(&base).is_err());

        let patch = DualEntryPatch {
            max_concurrent_cycles: Some(4),
            ..Default::default()
        };
        assert_eq!(patch.apply_to(&base).unwrap().max_concurrent_cycles, 4);
    }

    #[test]
    fn test_enabled_hour_filter_bounds() {
        let base = AppConfig::default_config(true, "BTCUSDT").strategy;
        let patch = DualEntryPatch {
            hour_filter: Some(HourFilterConfig {
                enabled: true,
                allowed_hours: vec![9, 24],
            }),
            ..Default::default()
        };
        assert!(patch.apply_to(&base).is_err());
    }
}
