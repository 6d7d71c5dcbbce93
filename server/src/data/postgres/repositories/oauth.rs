//! OAuth session and auth-request repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::data::error::StoreError;
use crate::data::types::{OAuthRequestRow, OAuthSessionRow};

pub async fn save_auth_request(pool: &PgPool, req: &OAuthRequestRow) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO oauth_requests
            (state, did, pds_url, authserver_iss, token_endpoint, pkce_verifier,
             dpop_authserver_nonce, dpop_private_multibase)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&req.state)
    .bind(&req.did)
    .bind(&req.pds_url)
    .bind(&req.authserver_iss)
    .bind(&req.token_endpoint)
    .bind(&req.pkce_verifier)
    .bind(&req.dpop_authserver_nonce)
    .bind(&req.dpop_private_multibase)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_auth_request(
    pool: &PgPool,
    state: &str,
) -> Result<Option<OAuthRequestRow>, StoreError> {
    let row: Option<(String, String, String, String, String, String, String)> = sqlx::query_as(
        "SELECT did, pds_url, authserver_iss, token_endpoint, pkce_verifier,
                dpop_authserver_nonce, dpop_private_multibase
         FROM oauth_requests WHERE state = $1",
    )
    .bind(state)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(
            did,
            pds_url,
            authserver_iss,
            token_endpoint,
            pkce_verifier,
            dpop_authserver_nonce,
            dpop_private_multibase,
        )| OAuthRequestRow {
            state: state.to_string(),
            did,
            pds_url,
            authserver_iss,
            token_endpoint,
            pkce_verifier,
            dpop_authserver_nonce,
            dpop_private_multibase,
        },
    ))
}

pub async fn delete_auth_request(pool: &PgPool, state: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM oauth_requests WHERE state = $1")
        .bind(state)
        .execute(pool)
        .await?;
    Ok(())
}

/// Upsert a session by its session id.
pub async fn save_session(pool: &PgPool, session: &OAuthSessionRow) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO oauth_sessions
            (did, session_id, pds_url, authserver_iss, token_endpoint, access_token,
             refresh_token, dpop_private_multibase, dpop_authserver_nonce, dpop_pds_nonce,
             scopes, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (session_id) DO UPDATE SET
            access_token = EXCLUDED.access_token,
            refresh_token = EXCLUDED.refresh_token,
            dpop_authserver_nonce = EXCLUDED.dpop_authserver_nonce,
            dpop_pds_nonce = EXCLUDED.dpop_pds_nonce,
            expires_at = EXCLUDED.expires_at",
    )
    .bind(&session.did)
    .bind(&session.session_id)
    .bind(&session.pds_url)
    .bind(&session.authserver_iss)
    .bind(&session.token_endpoint)
    .bind(&session.access_token)
    .bind(&session.refresh_token)
    .bind(&session.dpop_private_multibase)
    .bind(&session.dpop_authserver_nonce)
    .bind(&session.dpop_pds_nonce)
    .bind(&session.scopes)
    .bind(session.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_session(
    pool: &PgPool,
    did: &str,
    session_id: &str,
) -> Result<Option<OAuthSessionRow>, StoreError> {
    let row: Option<(
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        String,
        DateTime<Utc>,
    )> = sqlx::query_as(
        "SELECT pds_url, authserver_iss, token_endpoint, access_token, refresh_token,
                dpop_private_multibase, dpop_authserver_nonce, dpop_pds_nonce, scopes, expires_at
         FROM oauth_sessions WHERE did = $1 AND session_id = $2",
    )
    .bind(did)
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(
            pds_url,
            authserver_iss,
            token_endpoint,
            access_token,
            refresh_token,
            dpop_private_multibase,
            dpop_authserver_nonce,
            dpop_pds_nonce,
            scopes,
            expires_at,
        )| OAuthSessionRow {
            did: did.to_string(),
            session_id: session_id.to_string(),
            pds_url,
            authserver_iss,
            token_endpoint,
            access_token,
            refresh_token,
            dpop_private_multibase,
            dpop_authserver_nonce,
            dpop_pds_nonce,
            scopes,
            expires_at,
        },
    ))
}

pub async fn delete_session(pool: &PgPool, did: &str, session_id: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM oauth_sessions WHERE did = $1 AND session_id = $2")
        .bind(did)
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_all_sessions(pool: &PgPool, did: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM oauth_sessions WHERE did = $1")
        .bind(did)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist a rotated PDS DPoP nonce so replicas pick it up.
pub async fn set_dpop_pds_nonce(
    pool: &PgPool,
    session_id: &str,
    nonce: &str,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE oauth_sessions SET dpop_pds_nonce = $2 WHERE session_id = $1")
        .bind(session_id)
        .bind(nonce)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist a rotated authserver DPoP nonce.
pub async fn set_dpop_authserver_nonce(
    pool: &PgPool,
    session_id: &str,
    nonce: &str,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE oauth_sessions SET dpop_authserver_nonce = $2 WHERE session_id = $1")
        .bind(session_id)
        .bind(nonce)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persist refreshed tokens and the new expiry.
pub async fn update_session_tokens(
    pool: &PgPool,
    session_id: &str,
    access_token: &str,
    refresh_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE oauth_sessions
         SET access_token = $2, refresh_token = $3, expires_at = $4
         WHERE session_id = $1",
    )
    .bind(session_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}
