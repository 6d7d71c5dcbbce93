//! Image repository

use sqlx::PgPool;

use crate::data::error::StoreError;
use crate::data::types::Image;

/// Insert an image. Returns `true` iff a row was actually inserted.
pub async fn store_image(pool: &PgPool, image: &Image) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO images
            (uri, did, cid, signet_uri, blob_cid, blob_mime, alt, nick, color, width, height, posted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (uri) DO NOTHING",
    )
    .bind(&image.uri)
    .bind(&image.did)
    .bind(&image.cid)
    .bind(&image.signet_uri)
    .bind(&image.blob_cid)
    .bind(&image.blob_mime)
    .bind(&image.alt)
    .bind(&image.nick)
    .bind(image.color.map(|c| c as i64))
    .bind(image.width)
    .bind(image.height)
    .bind(image.posted_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Upsert the mutable fields of a media record.
pub async fn update_image(pool: &PgPool, image: &Image) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO images
            (uri, did, cid, signet_uri, blob_cid, blob_mime, alt, nick, color, width, height, posted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (uri) DO UPDATE SET
            cid = EXCLUDED.cid,
            blob_cid = EXCLUDED.blob_cid,
            blob_mime = EXCLUDED.blob_mime,
            alt = EXCLUDED.alt,
            nick = EXCLUDED.nick,
            color = EXCLUDED.color,
            width = EXCLUDED.width,
            height = EXCLUDED.height,
            indexed_at = now()",
    )
    .bind(&image.uri)
    .bind(&image.did)
    .bind(&image.cid)
    .bind(&image.signet_uri)
    .bind(&image.blob_cid)
    .bind(&image.blob_mime)
    .bind(&image.alt)
    .bind(&image.nick)
    .bind(image.color.map(|c| c as i64))
    .bind(image.width)
    .bind(image.height)
    .bind(image.posted_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_image(pool: &PgPool, uri: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM images WHERE uri = $1")
        .bind(uri)
        .execute(pool)
        .await?;
    Ok(())
}

type ImageRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<i64>,
    Option<i64>,
    Option<i64>,
    chrono::DateTime<chrono::Utc>,
);

fn image_from_row(uri: String, row: ImageRow) -> Image {
    let (did, cid, signet_uri, blob_cid, blob_mime, alt, nick, color, width, height, posted_at) =
        row;
    Image {
        uri,
        did,
        cid,
        signet_uri,
        blob_cid,
        blob_mime,
        alt,
        nick,
        color: color.map(|c| c as u32),
        width,
        height,
        posted_at,
    }
}

pub async fn get_image(pool: &PgPool, uri: &str) -> Result<Option<Image>, StoreError> {
    let row: Option<ImageRow> = sqlx::query_as(
        "SELECT did, cid, signet_uri, blob_cid, blob_mime, alt, nick, color, width, height, posted_at
         FROM images WHERE uri = $1",
    )
    .bind(uri)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| image_from_row(uri.to_string(), r)))
}

pub async fn get_image_by_did_cid(
    pool: &PgPool,
    did: &str,
    blob_cid: &str,
) -> Result<Option<Image>, StoreError> {
    let uri: Option<(String,)> =
        sqlx::query_as("SELECT uri FROM images WHERE did = $1 AND blob_cid = $2")
            .bind(did)
            .bind(blob_cid)
            .fetch_optional(pool)
            .await?;
    match uri {
        Some((uri,)) => get_image(pool, &uri).await,
        None => Ok(None),
    }
}
