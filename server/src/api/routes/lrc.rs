//! Live chat and lexicon stream routes

use axum::Json;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::api::session::RequireSession;
use crate::api::{ApiError, ApiState};
use crate::atproto::xrpc::{GET_BLOB, xrpc_url};
use crate::core::constants::COLLECTION_CHANNEL;
use crate::domain::AtUri;
use crate::domain::views::SignedMessageView;
use crate::runtime::run_subscriber;

#[derive(Debug, Deserialize)]
pub struct GetMessagesQuery {
    #[serde(rename = "channelURI")]
    pub channel_uri: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct GetMessagesOutput {
    pub messages: Vec<SignedMessageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// GET /xrpc/org.xcvr.lrc.getMessages
pub async fn get_messages(
    State(state): State<ApiState>,
    Query(query): Query<GetMessagesQuery>,
) -> Result<Json<GetMessagesOutput>, ApiError> {
    let (messages, cursor) = state
        .store
        .get_messages(&query.channel_uri, query.limit, query.cursor)
        .await?;
    Ok(Json(GetMessagesOutput { messages, cursor }))
}

#[derive(Debug, Deserialize)]
pub struct LexStreamQuery {
    pub uri: String,
}

/// GET /xrpc/org.xcvr.lrc.subscribeLexStream — websocket view stream.
pub async fn subscribe_lex_stream(
    State(state): State<ApiState>,
    Query(query): Query<LexStreamQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let (id, queue, cancel) = state.runtime.open_lex_stream(&query.uri)?;
    let runtime = state.runtime.clone();
    let uri = query.uri.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        run_subscriber(socket, queue, cancel).await;
        runtime.close_lex_stream(&uri, id);
    }))
}

/// GET /lrc/{did}/{rkey}/ws — raw LRC chat websocket.
pub async fn chat_ws(
    State(state): State<ApiState>,
    Path((did, rkey)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let uri = AtUri::new(did, COLLECTION_CHANNEL, rkey).to_string();
    let server = state.runtime.ws_server(&uri).await?;
    Ok(ws.on_upgrade(move |socket| server.accept(socket)))
}

/// DELETE /lrc/{did}/{rkey}/ws — delete a channel (owner or admin).
pub async fn delete_channel(
    State(state): State<ApiState>,
    Path((did, rkey)): Path<(String, String)>,
    RequireSession(session): RequireSession,
) -> Result<(), ApiError> {
    let uri = AtUri::new(did, COLLECTION_CHANNEL, rkey.clone()).to_string();
    let channel = state
        .store
        .get_channel(&uri)
        .await?
        .ok_or_else(|| ApiError::not_found("channel"))?;

    let is_owner = channel.did == session.did;
    let is_admin = state.config.admin_did.as_deref() == Some(session.did.as_str());
    if !is_owner && !is_admin {
        return Err(ApiError::forbidden("not the channel owner"));
    }

    // Owners also remove the record from their repo; admin deletion only
    // drops the derived view.
    if is_owner {
        session.client.delete_record(COLLECTION_CHANNEL, &rkey).await?;
    }
    state.manager.accept_channel_delete(&uri).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct GetImageQuery {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub cid: Option<String>,
}

/// GET /xrpc/org.xcvr.lrc.getImage?uri | did&cid | handle&cid — proxies the
/// blob bytes from the author's repo host.
pub async fn get_image(
    State(state): State<ApiState>,
    Query(query): Query<GetImageQuery>,
) -> Result<Response, ApiError> {
    let image = match (query.uri, query.did, query.handle, query.cid) {
        (Some(uri), _, _, _) => state.store.get_image(&uri).await?,
        (None, Some(did), _, Some(cid)) => state.store.get_image_by_did_cid(&did, &cid).await?,
        (None, None, Some(handle), Some(cid)) => {
            let did = state.resolver.full_resolve_handle(&handle).await?;
            state.store.get_image_by_did_cid(&did, &cid).await?
        }
        _ => return Err(ApiError::bad_request("provide uri, did&cid, or handle&cid")),
    };
    let image = image.ok_or_else(|| ApiError::not_found("image"))?;
    let blob_cid = image
        .blob_cid
        .ok_or_else(|| ApiError::not_found("image blob"))?;

    let pds = state.resolver.pds_for_did(&image.did).await?;
    let response = state
        .http
        .get(xrpc_url(&pds, GET_BLOB))
        .query(&[("did", image.did.as_str()), ("cid", blob_cid.as_str())])
        .send()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ApiError::not_found("blob"));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let mime = image
        .blob_mime
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}
