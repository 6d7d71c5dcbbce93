//! Session cookie and extractors
//!
//! One cookie (`oauthsession`) carries the session claims, HMAC-signed with
//! the configured key. During the auth flow it holds only the pending state
//! and lives five minutes; once logged in it holds `{did, id, scopes}` for
//! a week. Handlers receive the resolved session explicitly: [`MaybeSession`]
//! for routes that accept anonymous traffic, [`RequireSession`] for those
//! that do not.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{ApiError, ApiState};
use crate::atproto::OAuthClient;
use crate::core::constants::{
    AUTH_FLOW_COOKIE_MAX_AGE, SESSION_COOKIE_MAX_AGE, SESSION_COOKIE_NAME,
};

type HmacSha256 = Hmac<Sha256>;

/// Claims stored in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_did: Option<String>,
}

/// Signs and verifies the cookie value: `b64(json) . b64(hmac)`.
#[derive(Clone)]
pub struct CookieCodec {
    key: Arc<Vec<u8>>,
}

impl CookieCodec {
    pub fn new(key: &str) -> Self {
        Self {
            key: Arc::new(key.as_bytes().to_vec()),
        }
    }

    fn mac(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("hmac accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    pub fn encode(&self, claims: &SessionClaims) -> String {
        let payload = serde_json::to_vec(claims).expect("claims serialize");
        let signature = self.mac(&payload);
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify and decode; tampered or malformed values yield `None`.
    pub fn decode(&self, value: &str) -> Option<SessionClaims> {
        let (payload, signature) = value.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(&payload);
        mac.verify_slice(&signature).ok()?;
        serde_json::from_slice(&payload).ok()
    }

    fn build_cookie(&self, claims: &SessionClaims, max_age_secs: i64) -> Cookie<'static> {
        let mut cookie = Cookie::new(SESSION_COOKIE_NAME, self.encode(claims));
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(time::Duration::seconds(max_age_secs));
        cookie
    }

    /// Cookie for a logged-in session.
    pub fn session_cookie(&self, claims: &SessionClaims) -> Cookie<'static> {
        self.build_cookie(claims, SESSION_COOKIE_MAX_AGE)
    }

    /// Short-lived cookie for the auth flow.
    pub fn flow_cookie(&self, claims: &SessionClaims) -> Cookie<'static> {
        self.build_cookie(claims, AUTH_FLOW_COOKIE_MAX_AGE)
    }

    /// Expired cookie that clears the session.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(SESSION_COOKIE_NAME, "");
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_max_age(time::Duration::seconds(-1));
        cookie
    }

    pub fn claims_from_jar(&self, jar: &CookieJar) -> Option<SessionClaims> {
        self.decode(jar.get(SESSION_COOKIE_NAME)?.value())
    }
}

/// A resolved, live session.
#[derive(Clone)]
pub struct AuthSession {
    pub did: String,
    pub session_id: String,
    pub scopes: String,
    pub client: Arc<OAuthClient>,
}

async fn resolve_session(state: &ApiState, parts: &mut Parts) -> Result<Option<AuthSession>, ApiError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let Some(claims) = state.cookies.claims_from_jar(&jar) else {
        return Ok(None);
    };
    let (Some(did), Some(id)) = (claims.did, claims.id) else {
        return Ok(None);
    };

    // Banned actors lose their sessions at the door.
    if state.store.is_banned(&did).await? {
        state.store.delete_all_sessions(&did).await?;
        state.sessions.delete(&id).await;
        return Err(ApiError::forbidden("banned"));
    }

    let Some((client, _refreshed)) = state.sessions.map(&did, &id).await? else {
        return Ok(None);
    };
    Ok(Some(AuthSession {
        did,
        session_id: id,
        scopes: client.scopes(),
        client,
    }))
}

/// Nullable session for routes that accept anonymous traffic.
pub struct MaybeSession(pub Option<AuthSession>);

impl FromRequestParts<ApiState> for MaybeSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve_session(state, parts).await?))
    }
}

/// Session-required extractor; missing or expired sessions reject with 401.
pub struct RequireSession(pub AuthSession);

impl FromRequestParts<ApiState> for RequireSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        resolve_session(state, parts)
            .await?
            .map(Self)
            .ok_or_else(|| ApiError::unauthorized("no session"))
    }
}

/// Admin-only extractor: a live session whose DID is the configured admin.
pub struct RequireAdmin(pub AuthSession);

impl FromRequestParts<ApiState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let RequireSession(session) = RequireSession::from_request_parts(parts, state).await?;
        match &state.config.admin_did {
            Some(admin) if *admin == session.did => Ok(Self(session)),
            _ => Err(ApiError::forbidden("admin only")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> CookieCodec {
        CookieCodec::new("a-session-key")
    }

    fn claims() -> SessionClaims {
        SessionClaims {
            did: Some("did:plc:alice".into()),
            id: Some("sess-1".into()),
            scopes: Some("atproto transition:generic".into()),
            oauth_state: None,
            oauth_did: None,
        }
    }

    #[test]
    fn cookie_round_trips() {
        let codec = codec();
        let encoded = codec.encode(&claims());
        assert_eq!(codec.decode(&encoded), Some(claims()));
    }

    #[test]
    fn tampered_cookie_is_rejected() {
        let codec = codec();
        let encoded = codec.encode(&claims());
        let (payload, signature) = encoded.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&SessionClaims {
                did: Some("did:plc:mallory".into()),
                ..claims()
            })
            .unwrap(),
        );
        assert!(codec.decode(&format!("{forged_payload}.{signature}")).is_none());
        assert!(codec.decode(payload).is_none());
        assert!(codec.decode("garbage").is_none());
    }

    #[test]
    fn different_keys_do_not_verify() {
        let encoded = codec().encode(&claims());
        assert!(CookieCodec::new("other-key").decode(&encoded).is_none());
    }

    #[test]
    fn cookie_attributes_match_the_contract() {
        let codec = codec();
        let cookie = codec.session_cookie(&claims());
        assert_eq!(cookie.name(), SESSION_COOKIE_NAME);
        assert_eq!(cookie.path(), Some("/"));
        assert!(cookie.http_only().unwrap_or(false));
        assert_eq!(
            cookie.max_age(),
            Some(time::Duration::seconds(SESSION_COOKIE_MAX_AGE))
        );
        let flow = codec.flow_cookie(&claims());
        assert_eq!(
            flow.max_age(),
            Some(time::Duration::seconds(AUTH_FLOW_COOKIE_MAX_AGE))
        );
    }
}
