//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or malformed.
//! The database URL is wrapped in a secret so it never lands in logs.

pub mod secrets;

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::db::DbOptions;
use crate::error::{Error, Result};
use crate::queue::{LifecyclePolicy, QueueOptions, RetryPolicy};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub db: DbOptions,
    pub queue: QueueOptions,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let db_defaults = DbOptions::default();
        let retry_defaults = RetryPolicy::default();

        let db = DbOptions {
            max_connections: optional_var("WORKQ_MAX_CONNECTIONS")?
                .unwrap_or(db_defaults.max_connections),
            busy_timeout: optional_var("WORKQ_BUSY_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(db_defaults.busy_timeout),
            acquire_timeout: optional_var("WORKQ_ACQUIRE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(db_defaults.acquire_timeout),
        };

        let retry = RetryPolicy {
            max_attempts: optional_var("WORKQ_RETRY_ATTEMPTS")?
                .unwrap_or(retry_defaults.max_attempts),
            backoff: optional_var("WORKQ_RETRY_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.backoff),
        };
        if retry.max_attempts == 0 {
            return Err(Error::Config(
                "WORKQ_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let lifecycle = if optional_var::<bool>("WORKQ_STRICT_LIFECYCLE")?.unwrap_or(false) {
            LifecyclePolicy::Strict
        } else {
            LifecyclePolicy::Lenient
        };

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db,
            queue: QueueOptions { retry, lifecycle },
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("environment variable {name} is malformed: {raw}"))),
        Err(_) => Ok(None),
    }
}
