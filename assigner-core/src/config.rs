use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::{pool::PoolOptions, PgPool};

// A pool config object, designed to be passable across API boundaries
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    pub db_url: String,
    pub max_connections: Option<u32>,         // Default to 10
    pub min_connections: Option<u32>,         // Default to 1
    pub acquire_timeout_seconds: Option<u64>, // Default to 5
    pub max_lifetime_seconds: Option<u64>,    // Default to 1800
    pub idle_timeout_seconds: Option<u64>,    // Default to 300
}

impl PoolConfig {
    pub fn new(db_url: &str) -> Self {
        Self {
            db_url: db_url.to_owned(),
            max_connections: None,
            min_connections: None,
            acquire_timeout_seconds: None,
            max_lifetime_seconds: None,
            idle_timeout_seconds: None,
        }
    }

    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        let builder = PoolOptions::new()
            .max_connections(self.max_connections.unwrap_or(10))
            .min_connections(self.min_connections.unwrap_or(1))
            .max_lifetime(Duration::from_secs(
                self.max_lifetime_seconds.unwrap_or(1800),
            ))
            .idle_timeout(Duration::from_secs(self.idle_timeout_seconds.unwrap_or(300)))
            // Fail fast, an outage should surface as an error rather than a pile of waiting requests
            .acquire_timeout(Duration::from_secs(
                self.acquire_timeout_seconds.unwrap_or(5),
            ))
            .test_before_acquire(true);

        builder.connect(&self.db_url).await
    }
}
