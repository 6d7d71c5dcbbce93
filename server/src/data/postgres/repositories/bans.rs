//! Ban repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::data::error::StoreError;
use crate::data::types::Ban;

pub async fn add_ban(
    pool: &PgPool,
    did: &str,
    reason: Option<&str>,
    until: Option<DateTime<Utc>>,
) -> Result<Ban, StoreError> {
    let row: (i64, DateTime<Utc>) = sqlx::query_as(
        "INSERT INTO bans (did, reason, until_at) VALUES ($1, $2, $3)
         RETURNING id, banned_at",
    )
    .bind(did)
    .bind(reason)
    .bind(until)
    .fetch_one(pool)
    .await?;

    Ok(Ban {
        id: row.0,
        did: did.to_string(),
        reason: reason.map(String::from),
        until,
        banned_at: row.1,
    })
}

type BanRow = (i64, String, Option<String>, Option<DateTime<Utc>>, DateTime<Utc>);

fn ban_from_row((id, did, reason, until, banned_at): BanRow) -> Ban {
    Ban {
        id,
        did,
        reason,
        until,
        banned_at,
    }
}

pub async fn get_banned(pool: &PgPool, did: &str) -> Result<Vec<Ban>, StoreError> {
    let rows: Vec<BanRow> = sqlx::query_as(
        "SELECT id, did, reason, until_at, banned_at FROM bans WHERE did = $1 ORDER BY banned_at DESC",
    )
    .bind(did)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ban_from_row).collect())
}

pub async fn get_ban(pool: &PgPool, id: i64) -> Result<Option<Ban>, StoreError> {
    let row: Option<BanRow> =
        sqlx::query_as("SELECT id, did, reason, until_at, banned_at FROM bans WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(ban_from_row))
}

/// True if the actor has a ban that is either indefinite or not yet lapsed.
pub async fn is_banned(pool: &PgPool, did: &str) -> Result<bool, StoreError> {
    let banned: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM bans WHERE did = $1 AND (until_at IS NULL OR until_at > now())
        )",
    )
    .bind(did)
    .fetch_one(pool)
    .await?;
    Ok(banned)
}
