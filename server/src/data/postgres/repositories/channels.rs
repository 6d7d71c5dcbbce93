//! Channel repository

use sqlx::PgPool;

use crate::data::error::StoreError;
use crate::data::types::{Channel, ChannelHead};
use crate::domain::views::{CHANNEL_VIEW_TYPE, ChannelView, PROFILE_VIEW_TYPE, ProfileView};

/// Insert a channel. Returns `true` iff a row was actually inserted.
pub async fn store_channel(pool: &PgPool, channel: &Channel) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO channels (uri, cid, did, host, title, topic, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (uri) DO NOTHING",
    )
    .bind(&channel.uri)
    .bind(&channel.cid)
    .bind(&channel.did)
    .bind(&channel.host)
    .bind(&channel.title)
    .bind(&channel.topic)
    .bind(channel.created_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Upsert the mutable fields of a channel record.
pub async fn update_channel(pool: &PgPool, channel: &Channel) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO channels (uri, cid, did, host, title, topic, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (uri) DO UPDATE SET
            cid = EXCLUDED.cid,
            host = EXCLUDED.host,
            title = EXCLUDED.title,
            topic = EXCLUDED.topic,
            indexed_at = now()",
    )
    .bind(&channel.uri)
    .bind(&channel.cid)
    .bind(&channel.did)
    .bind(&channel.host)
    .bind(&channel.title)
    .bind(&channel.topic)
    .bind(channel.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_channel(pool: &PgPool, uri: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM channels WHERE uri = $1")
        .bind(uri)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_channel(pool: &PgPool, uri: &str) -> Result<Option<Channel>, StoreError> {
    let row: Option<(
        String,
        String,
        String,
        String,
        Option<String>,
        chrono::DateTime<chrono::Utc>,
    )> = sqlx::query_as(
        "SELECT cid, did, host, title, topic, created_at FROM channels WHERE uri = $1",
    )
    .bind(uri)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(cid, did, host, title, topic, created_at)| Channel {
        uri: uri.to_string(),
        cid,
        did,
        host,
        title,
        topic,
        created_at,
    }))
}

type ChannelViewRow = (
    String,
    String,
    String,
    Option<String>,
    chrono::DateTime<chrono::Utc>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
);

fn view_from_row(row: ChannelViewRow) -> ChannelView {
    let (uri, host, title, topic, created_at, did, handle, display_name, status, color, avatar) =
        row;
    ChannelView {
        lex_type: CHANNEL_VIEW_TYPE,
        uri,
        host,
        creator: ProfileView {
            lex_type: PROFILE_VIEW_TYPE,
            did,
            handle: handle.unwrap_or_default(),
            display_name,
            status,
            color: color.map(|c| c as u64),
            avatar,
            default_nick: None,
        },
        title,
        connected_count: None,
        topic,
        created_at,
    }
}

const CHANNEL_VIEW_SELECT: &str = "SELECT
        c.uri, c.host, c.title, c.topic, c.created_at,
        c.did, dh.handle, p.display_name, p.status, p.color, p.avatar_cid
     FROM channels c
     LEFT JOIN did_handles dh ON dh.did = c.did
     LEFT JOIN profiles p ON p.did = c.did";

/// Newest channels first, with their creators' profiles.
pub async fn get_channel_views(pool: &PgPool, limit: i64) -> Result<Vec<ChannelView>, StoreError> {
    let rows: Vec<ChannelViewRow> =
        sqlx::query_as(&format!("{CHANNEL_VIEW_SELECT} ORDER BY c.created_at DESC LIMIT $1"))
            .bind(limit)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(view_from_row).collect())
}

pub async fn get_channel_view(pool: &PgPool, uri: &str) -> Result<Option<ChannelView>, StoreError> {
    let row: Option<ChannelViewRow> =
        sqlx::query_as(&format!("{CHANNEL_VIEW_SELECT} WHERE c.uri = $1"))
            .bind(uri)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(view_from_row))
}

/// Every known channel with its high-water message id
/// (`max(signets.message_id)` or 0).
pub async fn get_channel_heads(pool: &PgPool) -> Result<Vec<ChannelHead>, StoreError> {
    let rows: Vec<(String, String, Option<String>, Option<i64>)> = sqlx::query_as(
        "SELECT c.uri, c.host, c.topic, max(s.message_id)
         FROM channels c
         LEFT JOIN signets s ON s.channel_uri = c.uri
         GROUP BY c.uri, c.host, c.topic",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(uri, host, topic, last)| ChannelHead {
            uri,
            host,
            topic,
            last_message_id: last.unwrap_or(0).max(0) as u32,
        })
        .collect())
}
