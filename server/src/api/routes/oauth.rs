//! OAuth and session routes

use axum::Form;
use axum::Json;
use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::api::session::{RequireAdmin, RequireSession, SessionClaims};
use crate::api::{ApiError, ApiState};
use crate::data::types::Ban;
use crate::domain::views::ProfileView;
use crate::records::requests::BanRequest;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub identifier: String,
}

/// POST /oauth/login — start the flow and park its state in a short-lived
/// cookie.
pub async fn login(
    State(state): State<ApiState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), ApiError> {
    if form.identifier.is_empty() {
        return Err(ApiError::bad_request("identifier is required"));
    }
    let flow = state.oauth.start_auth_flow(&form.identifier).await?;

    if state.store.is_banned(&flow.did).await? {
        return Err(ApiError::forbidden("banned"));
    }

    let claims = SessionClaims {
        oauth_state: Some(flow.state),
        oauth_did: Some(flow.did),
        ..Default::default()
    };
    let jar = jar.add(state.cookies.flow_cookie(&claims));
    Ok((jar, Redirect::to(&flow.redirect_url)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: String,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// GET /oauth/callback — PKCE callback. The state must match the flow
/// cookie minted at login.
pub async fn callback(
    State(state): State<ApiState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(CookieJar, Redirect), ApiError> {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or_default();
        return Err(ApiError::bad_request(format!(
            "authorization failed: {error} {detail}"
        )));
    }
    let code = query
        .code
        .ok_or_else(|| ApiError::bad_request("missing code"))?;

    let claims = state.cookies.claims_from_jar(&jar);
    let bound_state = claims.as_ref().and_then(|c| c.oauth_state.as_deref());
    if bound_state != Some(query.state.as_str()) {
        return Err(ApiError::unauthorized("state does not match this browser"));
    }

    let session = state
        .oauth
        .process_callback(&query.state, &code, query.iss.as_deref())
        .await?;

    if let Err(e) = state.manager.create_initial_profile(&session).await {
        tracing::warn!(did = %session.did, error = %e, "initial profile bootstrap failed");
    }

    let claims = SessionClaims {
        did: Some(session.did),
        id: Some(session.session_id),
        scopes: Some(session.scopes),
        oauth_state: None,
        oauth_did: None,
    };
    let jar = jar.add(state.cookies.session_cookie(&claims));
    Ok((jar, Redirect::to("/")))
}

/// POST /oauth/logout — drop the session everywhere.
pub async fn logout(
    State(state): State<ApiState>,
    RequireSession(session): RequireSession,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    state
        .store
        .delete_session(&session.did, &session.session_id)
        .await?;
    state.sessions.delete(&session.session_id).await;
    let jar = jar.add(state.cookies.removal_cookie());
    Ok((jar, Redirect::to("/")))
}

/// GET /oauth/whoami — the caller's profile view.
pub async fn whoami(
    State(state): State<ApiState>,
    RequireSession(session): RequireSession,
) -> Result<Json<ProfileView>, ApiError> {
    let view = match state.store.get_profile_view(&session.did).await? {
        Some(view) => view,
        None => {
            let handle = state.resolver.full_resolve_did(&session.did).await?;
            ProfileView::bare(session.did, handle)
        }
    };
    Ok(Json(view))
}

/// POST /oauth/ban — admin only. Persists the ban, drops the target's
/// sessions, and notifies the configured moderation endpoint.
pub async fn post_ban(
    State(state): State<ApiState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(request): Json<BanRequest>,
) -> Result<Json<Ban>, ApiError> {
    let ban = state
        .store
        .add_ban(&request.did, request.reason.as_deref(), request.until)
        .await?;
    state.store.delete_all_sessions(&request.did).await?;

    if let Some(endpoint) = &state.config.ban_endpoint {
        let payload = serde_json::json!({
            "did": ban.did,
            "reason": ban.reason,
            "bannedAt": ban.banned_at,
        });
        let result = state.http.post(endpoint).json(&payload).send().await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "ban endpoint notification failed");
        }
    }
    Ok(Json(ban))
}

#[derive(Debug, Deserialize)]
pub struct GetBanQuery {
    pub id: i64,
}

/// GET /oauth/ban?id — admin only.
pub async fn get_ban(
    State(state): State<ApiState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<GetBanQuery>,
) -> Result<Json<Ban>, ApiError> {
    let ban = state
        .store
        .get_ban(query.id)
        .await?
        .ok_or_else(|| ApiError::not_found("ban"))?;
    Ok(Json(ban))
}
