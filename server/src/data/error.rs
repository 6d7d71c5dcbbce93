//! Unified error type for the data layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// PostgreSQL database error
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Row lookup that the caller requires to exist
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Migration failed
    #[error("migration to v{version} failed: {error}")]
    MigrationFailed { version: i32, error: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
