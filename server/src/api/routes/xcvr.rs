//! Authenticated write routes

use axum::Json;
use axum::extract::{Multipart, State};
use serde::Serialize;
use serde_json::json;

use crate::api::session::{MaybeSession, RequireSession};
use crate::api::{ApiError, ApiState};
use crate::domain::records::BlobRef;
use crate::records::requests::{
    PostChannelRequest, PostMediaRequest, PostMessageRequest, PostProfileRequest,
};

#[derive(Debug, Serialize)]
pub struct PostChannelOutput {
    pub did: String,
    pub uri: String,
}

/// POST /lrc/channel — create a channel under the session identity, or
/// under the backend's own identity for anonymous callers.
pub async fn post_channel(
    State(state): State<ApiState>,
    MaybeSession(session): MaybeSession,
    Json(request): Json<PostChannelRequest>,
) -> Result<Json<PostChannelOutput>, ApiError> {
    let (did, uri) = match &session {
        Some(session) => state.manager.post_channel(&session.client, &request).await?,
        None => state.manager.post_my_channel(&request).await?,
    };
    Ok(Json(PostChannelOutput { did, uri }))
}

/// POST /lrc/message — post a message body against a signet. Anonymous
/// callers go through the nonce-guarded "my message" path.
pub async fn post_message(
    State(state): State<ApiState>,
    MaybeSession(session): MaybeSession,
    Json(request): Json<PostMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let uri = match &session {
        Some(session) => state.manager.post_message(&session.client, &request).await?,
        None => state.manager.post_my_message(&request).await?,
    };
    Ok(Json(json!({ "uri": uri })))
}

/// POST /lrc/image — multipart upload; returns the blob descriptor to embed
/// in a follow-up media record.
pub async fn post_image(
    State(state): State<ApiState>,
    RequireSession(session): RequireSession,
    mut multipart: Multipart,
) -> Result<Json<BlobRef>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") && field.name() != Some("image") {
            continue;
        }
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let blob = state
            .manager
            .post_image(&session.client, bytes.to_vec(), &mime)
            .await?;
        return Ok(Json(blob));
    }
    Err(ApiError::bad_request("no file field in upload"))
}

/// POST /lrc/media — attach an uploaded blob to a signet.
pub async fn post_media(
    State(state): State<ApiState>,
    RequireSession(session): RequireSession,
    Json(request): Json<PostMediaRequest>,
) -> Result<(), ApiError> {
    state.manager.post_media(&session.client, &request).await?;
    Ok(())
}

/// POST /xcvr/profile — update the caller's profile record.
pub async fn post_profile(
    State(state): State<ApiState>,
    RequireSession(session): RequireSession,
    Json(request): Json<PostProfileRequest>,
) -> Result<(), ApiError> {
    state.manager.post_profile(&session.client, &request).await?;
    Ok(())
}

/// POST /xcvr/beep — publish the fixed post to the wider feed network.
pub async fn beep(
    State(state): State<ApiState>,
    RequireSession(session): RequireSession,
) -> Result<(), ApiError> {
    state.manager.beep(&session.client).await?;
    Ok(())
}
