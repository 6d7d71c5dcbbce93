//! DID/handle mapping repository

use sqlx::PgPool;

use crate::data::error::StoreError;

/// Insert a `(did, handle)` pair. Idempotent: conflicts on either column
/// leave the existing row in place.
pub async fn store_did_handle(pool: &PgPool, did: &str, handle: &str) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO did_handles (did, handle) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(did)
        .bind(handle)
        .execute(pool)
        .await?;
    Ok(())
}

/// Replace whatever pairing exists for `did` when resolution detects a
/// handle change.
pub async fn refresh_did_handle(pool: &PgPool, did: &str, handle: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM did_handles WHERE did = $1 OR handle = $2")
        .bind(did)
        .bind(handle)
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO did_handles (did, handle) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(did)
        .bind(handle)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn resolve_handle(pool: &PgPool, handle: &str) -> Result<Option<String>, StoreError> {
    let did: Option<(String,)> = sqlx::query_as("SELECT did FROM did_handles WHERE handle = $1")
        .bind(handle)
        .fetch_optional(pool)
        .await?;
    Ok(did.map(|(d,)| d))
}

pub async fn resolve_did(pool: &PgPool, did: &str) -> Result<Option<String>, StoreError> {
    let handle: Option<(String,)> = sqlx::query_as("SELECT handle FROM did_handles WHERE did = $1")
        .bind(did)
        .fetch_optional(pool)
        .await?;
    Ok(handle.map(|(h,)| h))
}
