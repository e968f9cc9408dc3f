//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use chrono::NaiveDate;
use std::env;
use std::time::Duration;

use marlow_domain::CurrencyScales;
use marlow_gateway::RetryPolicy;

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Inbound feed configuration
    pub feed: FeedConfig,

    /// Settlement gateway configuration
    pub gateway: GatewayConfig,

    /// Business-day calendar holidays
    pub holidays: Vec<NaiveDate>,

    /// Currency scale table
    pub scales: CurrencyScales,

    /// Outbox redrive cadence
    pub redrive_interval: Duration,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Inbound feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Broker bootstrap addresses
    pub brokers: Vec<String>,
    /// Topic carrying execution fills
    pub topic: String,
    /// Idle poll backoff
    pub poll_interval: Duration,
    /// Dedupe retention past trade date, in business days
    pub dedupe_horizon_days: u32,
    /// Dedupe set shard count
    pub dedupe_shards: usize,
}

/// Settlement gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway base URL; unset uses the stub (test/dev)
    pub base_url: Option<String>,
    /// Retry schedule for sends
    pub retry: RetryPolicy,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let feed = Self::load_feed_config()?;
        let gateway = Self::load_gateway_config()?;
        let holidays = Self::load_holidays()?;
        let scales = Self::load_scales()?;

        let redrive_ms = Self::load_u64("MARLOW_REDRIVE_INTERVAL_MS", 500)?;

        Ok(Self {
            feed,
            gateway,
            holidays,
            scales,
            redrive_interval: Duration::from_millis(redrive_ms),
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            feed: FeedConfig {
                brokers: vec!["localhost:9092".to_string()],
                topic: "fix.executions".to_string(),
                poll_interval: Duration::from_millis(10),
                dedupe_horizon_days: 7,
                dedupe_shards: 4,
            },
            gateway: GatewayConfig { base_url: None, retry: RetryPolicy::default() },
            holidays: Vec::new(),
            scales: CurrencyScales::default(),
            redrive_interval: Duration::from_millis(20),
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("MARLOW_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid MARLOW_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_feed_config() -> DaemonResult<FeedConfig> {
        let brokers_str =
            env::var("MARLOW_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
        let brokers: Vec<String> = brokers_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if brokers.is_empty() {
            return Err(DaemonError::Config("MARLOW_BROKERS cannot be empty".to_string()));
        }

        let topic = env::var("MARLOW_FEED_TOPIC").unwrap_or_else(|_| "fix.executions".to_string());
        let poll_ms = Self::load_u64("MARLOW_FEED_POLL_INTERVAL_MS", 100)?;
        let horizon = Self::load_u64("MARLOW_DEDUPE_HORIZON_DAYS", 7)? as u32;
        let shards = Self::load_u64("MARLOW_DEDUPE_SHARDS", 8)? as usize;
        if shards == 0 {
            return Err(DaemonError::Config("MARLOW_DEDUPE_SHARDS must be >= 1".to_string()));
        }

        Ok(FeedConfig {
            brokers,
            topic,
            poll_interval: Duration::from_millis(poll_ms),
            dedupe_horizon_days: horizon,
            dedupe_shards: shards,
        })
    }

    fn load_gateway_config() -> DaemonResult<GatewayConfig> {
        let base_url = env::var("MARLOW_GATEWAY_URL").ok().filter(|v| !v.trim().is_empty());

        let retry = RetryPolicy {
            initial: Duration::from_millis(Self::load_u64("MARLOW_GATEWAY_RETRY_INITIAL_MS", 250)?),
            cap: Duration::from_secs(Self::load_u64("MARLOW_GATEWAY_RETRY_CAP_SECS", 30)?),
            jitter: 0.2,
            max_elapsed: Duration::from_secs(Self::load_u64("MARLOW_GATEWAY_RETRY_BUDGET_SECS", 60)?),
        };

        Ok(GatewayConfig { base_url, retry })
    }

    /// Holidays as comma-separated `YYYYMMDD` in `MARLOW_HOLIDAYS`.
    fn load_holidays() -> DaemonResult<Vec<NaiveDate>> {
        let raw = match env::var("MARLOW_HOLIDAYS") {
            Ok(v) => v,
            Err(_) => return Ok(Vec::new()),
        };
        raw.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y%m%d")
                    .map_err(|_| DaemonError::Config(format!("Invalid MARLOW_HOLIDAYS date: {}", s)))
            })
            .collect()
    }

    /// Currency scales as `CCY:scale` pairs in `MARLOW_CURRENCY_SCALES`,
    /// e.g. `USD:2,JPY:0`. Unset uses the built-in defaults.
    fn load_scales() -> DaemonResult<CurrencyScales> {
        let raw = match env::var("MARLOW_CURRENCY_SCALES") {
            Ok(v) => v,
            Err(_) => return Ok(CurrencyScales::default()),
        };
        let mut pairs = Vec::new();
        for part in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let (ccy, scale) = part.split_once(':').ok_or_else(|| {
                DaemonError::Config(format!("Invalid MARLOW_CURRENCY_SCALES entry: {}", part))
            })?;
            let scale: u32 = scale.parse().map_err(|_| {
                DaemonError::Config(format!("Invalid scale in MARLOW_CURRENCY_SCALES: {}", part))
            })?;
            pairs.push((ccy.to_uppercase(), scale));
        }
        Ok(CurrencyScales::new(pairs))
    }

    fn load_u64(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
