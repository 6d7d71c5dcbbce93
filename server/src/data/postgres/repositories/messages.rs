//! Message repository
//!
//! Listing is keyed by the signet sequence, not the author's clock:
//! descending by `signets.message_id`, with an exclusive cursor.

use sqlx::PgPool;

use crate::core::constants::{MESSAGES_MAX_LIMIT, MESSAGES_MIN_LIMIT};
use crate::data::error::StoreError;
use crate::data::types::Message;
use crate::domain::views::{
    PROFILE_VIEW_TYPE, ProfileView, SIGNED_MESSAGE_VIEW_TYPE, SIGNET_VIEW_TYPE, SignedMessageView,
    SignetView,
};

/// Insert a message. Returns `true` iff a row was actually inserted.
pub async fn store_message(pool: &PgPool, message: &Message) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO messages (uri, did, cid, signet_uri, body, nick, color, posted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (uri) DO NOTHING",
    )
    .bind(&message.uri)
    .bind(&message.did)
    .bind(&message.cid)
    .bind(&message.signet_uri)
    .bind(&message.body)
    .bind(&message.nick)
    .bind(message.color.map(|c| c as i64))
    .bind(message.posted_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Upsert the mutable fields of a message record.
pub async fn update_message(pool: &PgPool, message: &Message) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO messages (uri, did, cid, signet_uri, body, nick, color, posted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (uri) DO UPDATE SET
            cid = EXCLUDED.cid,
            body = EXCLUDED.body,
            nick = EXCLUDED.nick,
            color = EXCLUDED.color,
            posted_at = EXCLUDED.posted_at,
            indexed_at = now()",
    )
    .bind(&message.uri)
    .bind(&message.did)
    .bind(&message.cid)
    .bind(&message.signet_uri)
    .bind(&message.body)
    .bind(&message.nick)
    .bind(message.color.map(|c| c as i64))
    .bind(message.posted_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_message(pool: &PgPool, uri: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM messages WHERE uri = $1")
        .bind(uri)
        .execute(pool)
        .await?;
    Ok(())
}

/// The channel a message belongs to, via its signet.
pub async fn get_msg_channel_uri(
    pool: &PgPool,
    signet_uri: &str,
) -> Result<Option<String>, StoreError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT channel_uri FROM signets WHERE uri = $1")
        .bind(signet_uri)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(u,)| u))
}

/// Clamp a requested page size into the allowed window.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(crate::core::constants::MESSAGES_DEFAULT_LIMIT)
        .clamp(MESSAGES_MIN_LIMIT, MESSAGES_MAX_LIMIT)
}

/// Page through a channel's messages, newest first. The cursor is the
/// message id of the previous page's last row and is excluded from the
/// result.
pub async fn get_messages(
    pool: &PgPool,
    channel_uri: &str,
    limit: i64,
    cursor: Option<u32>,
) -> Result<(Vec<SignedMessageView>, Option<String>), StoreError> {
    let rows = sqlx::query(
        "SELECT
            m.uri, m.did, m.body, m.nick, m.color, m.posted_at,
            s.uri AS signet_uri, s.author_handle, s.message_id, s.started_at,
            adh.handle AS author_handle_map, idh.handle AS issuer_handle,
            p.display_name, p.status, p.color AS profile_color, p.avatar_cid, p.default_nick
         FROM messages m
         JOIN signets s ON m.signet_uri = s.uri
         LEFT JOIN did_handles adh ON adh.did = m.did
         LEFT JOIN did_handles idh ON idh.did = s.issuer_did
         LEFT JOIN profiles p ON p.did = m.did
         WHERE s.channel_uri = $1 AND ($2::bigint IS NULL OR s.message_id < $2)
         ORDER BY s.message_id DESC
         LIMIT $3",
    )
    .bind(channel_uri)
    .bind(cursor.map(|c| c as i64))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let full_page = rows.len() as i64 == limit;
    let views = rows
        .into_iter()
        .map(|row| signed_view_from_row(channel_uri, &row))
        .collect::<Result<Vec<_>, sqlx::Error>>()?;
    let next_cursor = full_page
        .then(|| views.last().map(|v| v.signet.lrc_id.to_string()))
        .flatten();
    Ok((views, next_cursor))
}

fn signed_view_from_row(
    channel_uri: &str,
    row: &sqlx::postgres::PgRow,
) -> Result<SignedMessageView, sqlx::Error> {
    use sqlx::Row;

    let message_id: i64 = row.try_get("message_id")?;
    Ok(SignedMessageView {
        lex_type: SIGNED_MESSAGE_VIEW_TYPE,
        uri: row.try_get("uri")?,
        author: ProfileView {
            lex_type: PROFILE_VIEW_TYPE,
            did: row.try_get("did")?,
            handle: row
                .try_get::<Option<String>, _>("author_handle_map")?
                .unwrap_or_default(),
            display_name: row.try_get("display_name")?,
            status: row.try_get("status")?,
            color: row
                .try_get::<Option<i64>, _>("profile_color")?
                .map(|c| c as u64),
            avatar: row.try_get("avatar_cid")?,
            default_nick: row.try_get("default_nick")?,
        },
        body: row.try_get("body")?,
        nick: row.try_get("nick")?,
        color: row.try_get::<Option<i64>, _>("color")?.map(|c| c as u32),
        signet: SignetView {
            lex_type: SIGNET_VIEW_TYPE,
            uri: row.try_get("signet_uri")?,
            issuer_handle: row
                .try_get::<Option<String>, _>("issuer_handle")?
                .unwrap_or_default(),
            channel_uri: channel_uri.to_string(),
            lrc_id: message_id.max(0) as u32,
            author_handle: row.try_get("author_handle")?,
            started_at: row.try_get("started_at")?,
        },
        posted_at: row.try_get("posted_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_into_window() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-3)), 1);
        assert_eq!(clamp_limit(Some(1000)), 100);
        assert_eq!(clamp_limit(Some(72)), 72);
    }
}
