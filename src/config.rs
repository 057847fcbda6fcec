use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

/// Longest accepted lockout window: one year.
pub const MAX_LOCKOUT_DURATION_MINUTES: i64 = 525_600;

/// Account lockout settings read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub attempts: u32,
    pub duration_minutes: i64,
}

impl LockoutConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.attempts > 0, "LOCKOUT_ATTEMPTS must be positive");
        anyhow::ensure!(
            self.duration_minutes > 0,
            "LOCKOUT_DURATION_MINUTES must be positive"
        );
        anyhow::ensure!(
            self.duration_minutes <= MAX_LOCKOUT_DURATION_MINUTES,
            "LOCKOUT_DURATION_MINUTES must be at most {MAX_LOCKOUT_DURATION_MINUTES}"
        );
        Ok(())
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            duration_minutes: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` selects the in-memory user store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub lockout: LockoutConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let bind_addr: SocketAddr = format!(
            "{}:{}",
            std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
        )
        .parse()
        .context("parse APP_HOST/APP_PORT")?;

        let defaults = LockoutConfig::default();
        let lockout = LockoutConfig {
            attempts: env_or("LOCKOUT_ATTEMPTS", defaults.attempts)?,
            duration_minutes: env_or("LOCKOUT_DURATION_MINUTES", defaults.duration_minutes)?,
        };
        lockout.validate()?;

        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            lockout,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("parse {key}={raw:?}")),
        Err(_) => Ok(default),
    }
}
