//! Profile repository

use sqlx::PgPool;

use crate::data::error::StoreError;
use crate::data::types::{Profile, ProfilePatch};
use crate::domain::views::{PROFILE_VIEW_TYPE, ProfileView};

/// Create the default profile row on first login. Existing rows win.
pub async fn initialize_profile(
    pool: &PgPool,
    did: &str,
    display_name: &str,
    default_nick: &str,
    status: &str,
    color: u64,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO profiles (did, display_name, default_nick, status, color)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (did) DO NOTHING",
    )
    .bind(did)
    .bind(display_name)
    .bind(default_nick)
    .bind(status)
    .bind(color as i64)
    .execute(pool)
    .await?;
    Ok(())
}

/// Apply a partial profile write. Fields absent from the patch keep their
/// stored value; a missing row is created from the patch alone.
pub async fn upsert_profile(
    pool: &PgPool,
    did: &str,
    patch: &ProfilePatch,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO profiles
            (did, display_name, default_nick, status, avatar_cid, avatar_mime, color, record_cid)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (did) DO UPDATE SET
            display_name = COALESCE(EXCLUDED.display_name, profiles.display_name),
            default_nick = COALESCE(EXCLUDED.default_nick, profiles.default_nick),
            status = COALESCE(EXCLUDED.status, profiles.status),
            avatar_cid = COALESCE(EXCLUDED.avatar_cid, profiles.avatar_cid),
            avatar_mime = COALESCE(EXCLUDED.avatar_mime, profiles.avatar_mime),
            color = COALESCE(EXCLUDED.color, profiles.color),
            record_cid = COALESCE(EXCLUDED.record_cid, profiles.record_cid),
            indexed_at = now()",
    )
    .bind(did)
    .bind(&patch.display_name)
    .bind(&patch.default_nick)
    .bind(&patch.status)
    .bind(&patch.avatar_cid)
    .bind(&patch.avatar_mime)
    .bind(patch.color.map(|c| c as i64))
    .bind(&patch.record_cid)
    .execute(pool)
    .await?;
    Ok(())
}

/// Tombstone a profile, but only if the stored record CID matches.
pub async fn delete_profile(pool: &PgPool, did: &str, cid: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM profiles WHERE did = $1 AND record_cid = $2")
        .bind(did)
        .bind(cid)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_profile(pool: &PgPool, did: &str) -> Result<Option<Profile>, StoreError> {
    let row: Option<(
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<i64>,
    )> = sqlx::query_as(
        "SELECT display_name, default_nick, status, avatar_cid, avatar_mime, color
         FROM profiles WHERE did = $1",
    )
    .bind(did)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(display_name, default_nick, status, avatar_cid, avatar_mime, color)| Profile {
            did: did.to_string(),
            display_name,
            default_nick,
            status,
            avatar_cid,
            avatar_mime,
            color: color.map(|c| c as u64),
        },
    ))
}

/// Profile joined with the handle map, shaped for broadcasting. An actor
/// with no profile row still yields a bare view when the handle is known.
pub async fn get_profile_view(pool: &PgPool, did: &str) -> Result<Option<ProfileView>, StoreError> {
    let row: Option<(
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<i64>,
    )> = sqlx::query_as(
        "SELECT dh.handle, p.display_name, p.status, p.default_nick, p.avatar_cid, p.color
         FROM did_handles dh
         LEFT JOIN profiles p ON p.did = dh.did
         WHERE dh.did = $1",
    )
    .bind(did)
    .fetch_optional(pool)
    .await?;

    Ok(
        row.map(|(handle, display_name, status, default_nick, avatar, color)| ProfileView {
            lex_type: PROFILE_VIEW_TYPE,
            did: did.to_string(),
            handle,
            display_name,
            status,
            color: color.map(|c| c as u64),
            avatar,
            default_nick,
        }),
    )
}
