use crate::auth::clock::SystemClock;
use crate::auth::lockout::LockoutPolicy;
use crate::auth::memory::MemoryUserStore;
use crate::auth::password::Argon2Hasher;
use crate::auth::repo::{PgUserStore, UserStore};
use crate::auth::services::Authenticator;
use crate::config::AppConfig;
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Authenticator,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                Arc::new(PgUserStore::new(db))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; accounts are kept in memory only");
                Arc::new(MemoryUserStore::new())
            }
        };

        let auth = Authenticator::new(
            store,
            Arc::new(Argon2Hasher::default()),
            Arc::new(SystemClock),
            LockoutPolicy::try_from(&config.lockout)?,
        );

        tracing::info!(
            lockout_attempts = config.lockout.attempts,
            lockout_minutes = config.lockout.duration_minutes,
            "authenticator ready"
        );
        Ok(Self { config, auth })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            max_connections: 1,
            bind_addr: ([127, 0, 0, 1], 0).into(),
            lockout: crate::config::LockoutConfig::default(),
        });
        let auth = Authenticator::new(
            Arc::new(MemoryUserStore::new()),
            Arc::new(crate::auth::password::fast_hasher()),
            Arc::new(SystemClock),
            LockoutPolicy::try_from(&config.lockout).expect("default lockout config is valid"),
        );
        Self { config, auth }
    }
}
