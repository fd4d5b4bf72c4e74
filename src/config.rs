use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,
    pub log_dir: String,
    /// `EnvFilter` directives, e.g. `info,sqlx=warn`.
    pub log_level: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    // Payroll
    pub payroll_batch_limit: usize,
    pub serial_max_attempts: usize,
    pub serial_max_batch_attempts: usize,
    pub serial_filter_capacity: usize,
    pub serial_warmup_chunk: u32,
    pub settled_cache_capacity: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),

            rate_protected_per_min: parse_or("RATE_PROTECTED_PER_MIN", 1000)?,

            payroll_batch_limit: parse_or("PAYROLL_BATCH_LIMIT", 200)?,
            serial_max_attempts: parse_or("SERIAL_MAX_ATTEMPTS", 100)?,
            serial_max_batch_attempts: parse_or("SERIAL_MAX_BATCH_ATTEMPTS", 1000)?,
            serial_filter_capacity: parse_or("SERIAL_FILTER_CAPACITY", 100_000)?,
            serial_warmup_chunk: parse_or("SERIAL_WARMUP_CHUNK", 200)?,
            settled_cache_capacity: parse_or("SETTLED_CACHE_CAPACITY", 100_000)?,
        })
    }

    pub fn log_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.log_level)
            .with_context(|| format!("LOG_LEVEL has an invalid value: {}", self.log_level))
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(log_level: &str) -> Config {
        Config {
            database_url: "mysql://localhost/payroll".into(),
            jwt_secret: "secret".into(),
            server_addr: "127.0.0.1:8080".into(),
            api_prefix: "/api".into(),
            log_dir: "logs".into(),
            log_level: log_level.into(),
            rate_protected_per_min: 1000,
            payroll_batch_limit: 200,
            serial_max_attempts: 100,
            serial_max_batch_attempts: 1000,
            serial_filter_capacity: 100_000,
            serial_warmup_chunk: 200,
            settled_cache_capacity: 100_000,
        }
    }

    #[test]
    fn unset_values_fall_back() {
        assert_eq!(parse_or("PAYROLL_LEDGER_TEST_UNSET", 42u32).unwrap(), 42);
    }

    #[test]
    fn log_level_drives_the_filter() {
        assert!(config("info,sqlx=warn").log_filter().is_ok());
        assert!(config("payroll=loud").log_filter().is_err());
    }
}
