//! Configuration module for boq-service.

use service_core::config as core_config;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BoqConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub billing: BillingConfig,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Longest a unit of work waits on a row or table lock.
    pub lock_timeout_ms: u64,
}

/// Retry budget for transient storage conflicts.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl BillingConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
            ..Default::default()
        }
    }
}

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl BoqConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "boq-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2),
                lock_timeout_ms: env_or("DATABASE_LOCK_TIMEOUT_MS", 5000),
            },
            billing: BillingConfig {
                max_retries: env_or("BILLING_MAX_RETRIES", 3),
                retry_backoff_ms: env_or("BILLING_RETRY_BACKOFF_MS", 50),
            },
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}
