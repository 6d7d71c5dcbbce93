//! Signet repository
//!
//! The `(channel_uri, message_id)` unique constraint enforces at most one
//! attestation per line; `store_signet` reports `was_new` so the caller can
//! gate broadcasts on the first occurrence.

use sqlx::PgPool;

use crate::data::error::StoreError;
use crate::data::types::Signet;

/// Insert a signet. Returns `true` iff a row was actually inserted.
pub async fn store_signet(pool: &PgPool, signet: &Signet) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO signets (uri, issuer_did, author_handle, channel_uri, message_id, cid, started_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT DO NOTHING",
    )
    .bind(&signet.uri)
    .bind(&signet.issuer_did)
    .bind(&signet.author_handle)
    .bind(&signet.channel_uri)
    .bind(signet.message_id as i64)
    .bind(&signet.cid)
    .bind(signet.started_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Upsert the mutable fields of a signet record.
pub async fn update_signet(pool: &PgPool, signet: &Signet) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO signets (uri, issuer_did, author_handle, channel_uri, message_id, cid, started_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (uri) DO UPDATE SET
            author_handle = EXCLUDED.author_handle,
            cid = EXCLUDED.cid,
            started_at = EXCLUDED.started_at,
            indexed_at = now()",
    )
    .bind(&signet.uri)
    .bind(&signet.issuer_did)
    .bind(&signet.author_handle)
    .bind(&signet.channel_uri)
    .bind(signet.message_id as i64)
    .bind(&signet.cid)
    .bind(signet.started_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_signet(pool: &PgPool, uri: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM signets WHERE uri = $1")
        .bind(uri)
        .execute(pool)
        .await?;
    Ok(())
}

/// Look a signet up by its channel position.
pub async fn query_signet(
    pool: &PgPool,
    channel_uri: &str,
    message_id: u32,
) -> Result<Option<(String, String)>, StoreError> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT uri, author_handle FROM signets WHERE channel_uri = $1 AND message_id = $2",
    )
    .bind(channel_uri)
    .bind(message_id as i64)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn query_signet_handle(pool: &PgPool, uri: &str) -> Result<Option<String>, StoreError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT author_handle FROM signets WHERE uri = $1")
        .bind(uri)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(h,)| h))
}

/// A signet's channel position, for nonce verification.
pub async fn query_signet_channel_id(
    pool: &PgPool,
    uri: &str,
) -> Result<Option<(String, u32)>, StoreError> {
    let row: Option<(String, i64)> =
        sqlx::query_as("SELECT channel_uri, message_id FROM signets WHERE uri = $1")
            .bind(uri)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(curi, id)| (curi, id.max(0) as u32)))
}

pub async fn get_signet(pool: &PgPool, uri: &str) -> Result<Option<Signet>, StoreError> {
    let row: Option<(
        String,
        String,
        String,
        i64,
        String,
        chrono::DateTime<chrono::Utc>,
    )> = sqlx::query_as(
        "SELECT issuer_did, author_handle, channel_uri, message_id, cid, started_at
         FROM signets WHERE uri = $1",
    )
    .bind(uri)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(issuer_did, author_handle, channel_uri, message_id, cid, started_at)| Signet {
            uri: uri.to_string(),
            issuer_did,
            author_handle,
            channel_uri,
            message_id: message_id.max(0) as u32,
            cid,
            started_at,
        },
    ))
}

/// Where an author's handle most recently opened a line.
pub async fn get_last_seen(
    pool: &PgPool,
    handle: &str,
) -> Result<Option<(String, chrono::DateTime<chrono::Utc>)>, StoreError> {
    let row: Option<(String, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
        "SELECT channel_uri, started_at FROM signets
         WHERE author_handle = $1
         ORDER BY started_at DESC
         LIMIT 1",
    )
    .bind(handle)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
