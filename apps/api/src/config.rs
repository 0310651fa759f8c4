use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Which association store backend the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Rest,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "rest" => Ok(StoreBackend::Rest),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("Unknown STORE_BACKEND '{other}' (expected postgres, rest or memory)"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if a variable required by the selected backend is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub store_rest_url: Option<String>,
    pub store_api_key: Option<String>,
    /// Optional: enables the Redis change feed.
    pub redis_url: Option<String>,
    pub dialog_idle_timeout_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let store_backend = optional_env("STORE_BACKEND")
            .map(|v| v.parse::<StoreBackend>())
            .transpose()?
            .unwrap_or(StoreBackend::Postgres);

        let config = Config {
            store_backend,
            database_url: optional_env("DATABASE_URL"),
            store_rest_url: optional_env("STORE_REST_URL"),
            store_api_key: optional_env("STORE_API_KEY"),
            redis_url: optional_env("REDIS_URL"),
            dialog_idle_timeout_secs: optional_env("DIALOG_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|| "1800".to_string())
                .parse::<u64>()
                .context("DIALOG_IDLE_TIMEOUT_SECS must be a whole number of seconds")?,
            port: optional_env("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the selected backend has everything it needs.
    pub fn validate(&self) -> Result<()> {
        match self.store_backend {
            StoreBackend::Postgres if self.database_url.is_none() => {
                bail!("Required environment variable 'DATABASE_URL' is not set")
            }
            StoreBackend::Rest if self.store_rest_url.is_none() => {
                bail!("Required environment variable 'STORE_REST_URL' is not set")
            }
            StoreBackend::Rest if self.store_api_key.is_none() => {
                bail!("Required environment variable 'STORE_API_KEY' is not set")
            }
            _ => Ok(()),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
