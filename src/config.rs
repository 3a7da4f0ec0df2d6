use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Reconciliation
    pub mutation_timeout: Duration,
    pub debounce_window: Duration,

    // Leave
    pub annual_leave_cap: i64,

    // Rate limiting
    pub rate_read_per_min: u32,
    pub rate_mutation_per_min: u32,

    // Logging
    pub log_dir: String,
    pub log_level: tracing::Level,
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let log_level = match env::var("LOG_LEVEL") {
            Ok(raw) => tracing::Level::from_str(raw.trim())
                .map_err(|_| anyhow::anyhow!("LOG_LEVEL has an invalid value: {raw}"))?,
            Err(_) => tracing::Level::INFO,
        };

        Ok(Self {
            server_addr: env::var("SERVER_ADDR").context("SERVER_ADDR must be set")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            mutation_timeout: Duration::from_secs(var_or("MUTATION_TIMEOUT_SECS", 10)?),
            debounce_window: Duration::from_millis(var_or("DEBOUNCE_WINDOW_MS", 2_000)?),

            annual_leave_cap: var_or("ANNUAL_LEAVE_CAP", 12)?,

            rate_read_per_min: var_or("RATE_READ_PER_MIN", 600)?,
            rate_mutation_per_min: var_or("RATE_MUTATION_PER_MIN", 60)?,

            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_level,
        })
    }
}
