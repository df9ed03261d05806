use anyhow::Result;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;
use std::time::Duration;
use dotenvy::dotenv;

use crate::constants::{DEFAULT_DB_MAX_CONNECTIONS, DEFAULT_DB_MAX_IDLE_TIME_SECS, DEFAULT_QUERY_TIMEOUT_SECS};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub max_idle_time: Duration,
    /// Bound applied to every storage round-trip, including pool checkout.
    pub query_timeout: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            max_idle_time: Duration::from_secs(
                env::var("DB_MAX_IDLE_TIME_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_DB_MAX_IDLE_TIME_SECS),
            ),
            query_timeout: Duration::from_secs(
                env::var("QUERY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            ),
        })
    }
}

pub async fn get_db_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .idle_timeout(config.max_idle_time)
        .acquire_timeout(config.query_timeout)
        .connect(&config.database_url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        "Connected to database"
    );

    Ok(pool)
}
