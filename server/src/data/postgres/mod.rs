//! PostgreSQL database service
//!
//! Connection pooling, schema migrations, and the repository modules. All
//! reads and writes in the backend go through the repositories; every
//! operation is individually atomic and compound flows rely on idempotent
//! inserts (`was_new`) to stay convergent under firehose replay.

mod migrations;
pub mod repositories;
pub mod schema;

pub use sqlx::PgPool;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use crate::core::config::PostgresConfig;
use crate::data::error::StoreError;

const MAX_CONNECTIONS: u32 = 16;
const MIN_CONNECTIONS: u32 = 1;
const ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Initialize the pool and bring the schema up to date.
pub async fn init(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    if config.url.is_empty() {
        return Err(StoreError::Config("postgres url is required".into()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(MIN_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
        .connect(&config.url)
        .await?;

    migrations::run_migrations(&pool).await?;
    tracing::debug!("postgres ready");
    Ok(pool)
}
