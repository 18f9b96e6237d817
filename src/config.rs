//! Layered configuration: built-in defaults, an optional TOML file, then
//! `TRADESIM__SECTION__KEY` environment variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::book::{
    MetricWindows, DEFAULT_DEPTH_LEVELS, DEFAULT_IMBALANCE_LEVELS, DEFAULT_VOLATILITY_WINDOW,
    MID_PRICE_CAPACITY,
};
use crate::engine::types::FeeRates;
use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "TRADESIM";
pub const DEFAULT_FEED_URL: &str = "wss://ws.gomarket-cpp.goquant.io/ws/l2-orderbook/okx/BTC-USDT-SWAP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    /// Raw JSON text sent once after each successful connect.
    pub subscribe: Option<String>,
    pub reconnect_delay_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            subscribe: None,
            reconnect_delay_ms: 2_000,
            read_timeout_ms: 30_000,
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    pub mid_capacity: usize,
    pub depth_levels: usize,
    pub imbalance_levels: usize,
    pub volatility_window: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            mid_capacity: MID_PRICE_CAPACITY,
            depth_levels: DEFAULT_DEPTH_LEVELS,
            imbalance_levels: DEFAULT_IMBALANCE_LEVELS,
            volatility_window: DEFAULT_VOLATILITY_WINDOW,
        }
    }
}

impl BookConfig {
    pub fn windows(&self) -> MetricWindows {
        MetricWindows {
            depth_levels: self.depth_levels,
            imbalance_levels: self.imbalance_levels,
            volatility_window: self.volatility_window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub gamma: f64,
    pub eta: f64,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self { gamma: 0.1, eta: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Most recent samples retained for refits.
    pub capacity: usize,
    /// Samples required before the first fit.
    pub min_samples: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self { capacity: 1_000, min_samples: 30 }
    }
}

pub fn default_fee_table() -> BTreeMap<String, FeeRates> {
    BTreeMap::from([
        ("VIP0".to_string(), FeeRates { maker: 0.0008, taker: 0.001 }),
        ("VIP1".to_string(), FeeRates { maker: 0.0007, taker: 0.0009 }),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub feed: FeedConfig,
    pub book: BookConfig,
    pub impact: ImpactConfig,
    pub predictor: PredictorConfig,
    pub fees: BTreeMap<String, FeeRates>,
    pub poll_interval_ms: u64,
    pub stale_after_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            book: BookConfig::default(),
            impact: ImpactConfig::default(),
            predictor: PredictorConfig::default(),
            fees: default_fee_table(),
            poll_interval_ms: 1_000,
            stale_after_ms: 5_000,
        }
    }
}

impl SimulatorConfig {
    /// Load defaults, then `path` (if given and present), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: SimulatorConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid { field, reason: reason.to_string() }
        }

        if self.feed.url.trim().is_empty() {
            return Err(invalid("feed.url", "must not be empty"));
        }
        if self.feed.read_timeout_ms == 0 {
            return Err(invalid("feed.read_timeout_ms", "must be positive"));
        }
        if self.book.mid_capacity == 0 {
            return Err(invalid("book.mid_capacity", "must be positive"));
        }
        if self.book.depth_levels == 0 || self.book.imbalance_levels == 0 {
            return Err(invalid("book.depth_levels", "level counts must be positive"));
        }
        if self.book.volatility_window == 0 {
            return Err(invalid("book.volatility_window", "must be positive"));
        }
        if self.book.volatility_window > self.book.mid_capacity {
            return Err(invalid("book.volatility_window", "must not exceed mid_capacity"));
        }
        if !(self.impact.gamma.is_finite() && self.impact.eta.is_finite()) {
            return Err(invalid("impact", "gamma and eta must be finite"));
        }
        if self.predictor.capacity == 0 || self.predictor.min_samples == 0 {
            return Err(invalid("predictor", "capacity and min_samples must be positive"));
        }
        if self.predictor.min_samples > self.predictor.capacity {
            return Err(invalid("predictor.min_samples", "must not exceed capacity"));
        }
        if self.fees.is_empty() {
            return Err(invalid("fees", "at least one fee tier is required"));
        }
        for rates in self.fees.values() {
            let ok = |r: f64| r.is_finite() && r >= 0.0;
            if !(ok(rates.maker) && ok(rates.taker)) {
                return Err(invalid("fees", "rates must be finite and non-negative"));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be positive"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = SimulatorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.book.mid_capacity, 200);
        assert_eq!(cfg.predictor.min_samples, 30);
        assert_eq!(cfg.fees["VIP0"].taker, 0.001);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("tradesim-config-{}.toml", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "stale_after_ms = 2500").unwrap();
            writeln!(file, "[impact]").unwrap();
            writeln!(file, "gamma = 0.2").unwrap();
        }

        let cfg = SimulatorConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.stale_after_ms, 2500);
        assert_eq!(cfg.impact.gamma, 0.2);
        assert_eq!(cfg.impact.eta, 0.1);
        assert_eq!(cfg.feed.url, DEFAULT_FEED_URL);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut cfg = SimulatorConfig::default();
        cfg.predictor.min_samples = 2_000;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "predictor.min_samples", .. })));

        let mut cfg = SimulatorConfig::default();
        cfg.book.volatility_window = 201;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { field: "book.volatility_window", .. })));
        cfg.book.mid_capacity = 201;
        assert!(cfg.validate().is_ok());

        let mut cfg = SimulatorConfig::default();
        cfg.feed.url = "  ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = SimulatorConfig::default();
        cfg.fees.insert("BAD".to_string(), FeeRates { maker: f64::NAN, taker: 0.001 });
        assert!(cfg.validate().is_err());
    }
}
