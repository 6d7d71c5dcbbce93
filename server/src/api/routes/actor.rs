//! Actor queries

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, ApiState};
use crate::core::constants::COLLECTION_CHANNEL;
use crate::domain::AtUri;
use crate::domain::views::ProfileView;

#[derive(Debug, Deserialize)]
pub struct ResolveChannelQuery {
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub did: Option<String>,
    pub rkey: String,
}

#[derive(Debug, Serialize)]
pub struct ResolveChannelOutput {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// GET /xrpc/org.xcvr.actor.resolveChannel
pub async fn resolve_channel(
    State(state): State<ApiState>,
    Query(query): Query<ResolveChannelQuery>,
) -> Result<Json<ResolveChannelOutput>, ApiError> {
    let did = match (query.did, query.handle) {
        (Some(did), _) => did,
        (None, Some(handle)) => state.resolver.full_resolve_handle(&handle).await?,
        (None, None) => return Err(ApiError::bad_request("provide did or handle")),
    };
    let uri = AtUri::new(did.clone(), COLLECTION_CHANNEL, query.rkey.clone()).to_string();
    Ok(Json(ResolveChannelOutput {
        url: format!("/lrc/{did}/{}/ws", query.rkey),
        uri: Some(uri),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
}

async fn resolve_actor(state: &ApiState, query: ActorQuery) -> Result<String, ApiError> {
    match (query.did, query.handle) {
        (Some(did), _) => Ok(did),
        (None, Some(handle)) => Ok(state.resolver.full_resolve_handle(&handle).await?),
        (None, None) => Err(ApiError::bad_request("provide did or handle")),
    }
}

/// GET /xrpc/org.xcvr.actor.getProfileView
pub async fn get_profile_view(
    State(state): State<ApiState>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<ProfileView>, ApiError> {
    let did = resolve_actor(&state, query).await?;
    let view = state
        .store
        .get_profile_view(&did)
        .await?
        .ok_or_else(|| ApiError::not_found("profile"))?;
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
pub struct LastSeenOutput {
    #[serde(rename = "where")]
    pub location: String,
    pub when: DateTime<Utc>,
}

/// GET /xrpc/org.xcvr.actor.getLastSeen — the channel where the actor most
/// recently opened a line.
pub async fn get_last_seen(
    State(state): State<ApiState>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<LastSeenOutput>, ApiError> {
    let did = resolve_actor(&state, query).await?;
    let handle = state.resolver.full_resolve_did(&did).await?;
    let (channel_uri, when) = state
        .store
        .get_last_seen(&handle)
        .await?
        .ok_or_else(|| ApiError::not_found("never seen"))?;
    Ok(Json(LastSeenOutput {
        location: channel_uri,
        when,
    }))
}
