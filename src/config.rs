//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::messaging::CreateUpdateMode;
use crate::retry::RetryPolicy;

/// Backend used for the aggregate store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Inclusive worker count range, written `min-max` or a single number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyRange {
    pub min: usize,
    pub max: usize,
}

impl FromStr for ConcurrencyRange {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = match s.split_once('-') {
            Some((min, max)) => (min.trim(), max.trim()),
            None => (s.trim(), s.trim()),
        };

        let min: usize = min.parse().map_err(|_| ())?;
        let max: usize = max.parse().map_err(|_| ())?;

        if min == 0 || max < min {
            return Err(());
        }

        Ok(Self { min, max })
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Aggregate store backend
    pub store_backend: StoreBackend,

    /// Database connection URL (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Queue carrying inbound change-events
    pub ingestion_queue: String,

    /// Queue receiving rejected change-events
    pub dead_letter_queue: String,

    /// Ingestion worker count range
    pub listener_concurrency: ConcurrencyRange,

    /// Bounded wait of a single receive
    pub receive_timeout: Duration,

    /// Broker redelivery of nacked messages
    pub redelivery: RetryPolicy,

    /// Time a delivery may stay unsettled before the broker reclaims it
    pub visibility_timeout: Duration,

    /// Additive or replacing CREATE_UPDATE handling
    pub create_update_mode: CreateUpdateMode,

    /// Emit JSON log lines
    pub log_json: bool,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    var_or(name, default)
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend: StoreBackend = parse_var("STORE_BACKEND", "postgres")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", "10")?;

        let host = var_or("HOST", "127.0.0.1");

        let port = parse_var("PORT", "3000")?;

        let environment = var_or("ENVIRONMENT", "development");

        let ingestion_queue = var_or("INGESTION_QUEUE", "trainer.workload");
        let dead_letter_queue = var_or("DEAD_LETTER_QUEUE", "trainer.workload.dlq");

        let listener_concurrency = parse_var("LISTENER_CONCURRENCY", "3-10")?;

        let receive_timeout = Duration::from_millis(parse_var("RECEIVE_TIMEOUT_MS", "1000")?);

        let redelivery = RetryPolicy {
            max_attempts: parse_var("REDELIVERY_MAX_ATTEMPTS", "3")?,
            initial_delay: Duration::from_millis(parse_var("REDELIVERY_INITIAL_DELAY_MS", "1000")?),
            max_delay: Duration::from_millis(parse_var("REDELIVERY_MAX_DELAY_MS", "10000")?),
            multiplier: parse_var("REDELIVERY_MULTIPLIER", "2.0")?,
        };
        if redelivery.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("REDELIVERY_MAX_ATTEMPTS"));
        }
        if !redelivery.multiplier.is_finite() || redelivery.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue("REDELIVERY_MULTIPLIER"));
        }

        let visibility_timeout =
            Duration::from_millis(parse_var("VISIBILITY_TIMEOUT_MS", "30000")?);
        if visibility_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("VISIBILITY_TIMEOUT_MS"));
        }

        let create_update_mode = parse_var("CREATE_UPDATE_MODE", "accumulate")?;

        let log_json = var_or("LOG_FORMAT", "text").trim().eq_ignore_ascii_case("json");

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            ingestion_queue,
            dead_letter_queue,
            listener_concurrency,
            receive_timeout,
            redelivery,
            visibility_timeout,
            create_update_mode,
            log_json,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
