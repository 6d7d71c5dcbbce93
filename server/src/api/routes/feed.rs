//! Channel feed queries

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::api::{ApiError, ApiState};
use crate::core::constants::COLLECTION_CHANNEL;
use crate::domain::AtUri;
use crate::domain::views::ChannelView;

const CHANNELS_DEFAULT_LIMIT: i64 = 50;
const CHANNELS_MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct GetChannelsQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// GET /xrpc/org.xcvr.feed.getChannels
pub async fn get_channels(
    State(state): State<ApiState>,
    Query(query): Query<GetChannelsQuery>,
) -> Result<Json<Vec<ChannelView>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(CHANNELS_DEFAULT_LIMIT)
        .clamp(1, CHANNELS_MAX_LIMIT);
    Ok(Json(state.store.get_channel_views(limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct GetChannelQuery {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub rkey: Option<String>,
}

/// GET /xrpc/org.xcvr.feed.getChannel?uri | handle&rkey
pub async fn get_channel(
    State(state): State<ApiState>,
    Query(query): Query<GetChannelQuery>,
) -> Result<Json<ChannelView>, ApiError> {
    let uri = match (query.uri, query.handle, query.rkey) {
        (Some(uri), _, _) => uri,
        (None, Some(handle), Some(rkey)) => {
            let did = state.resolver.full_resolve_handle(&handle).await?;
            AtUri::new(did, COLLECTION_CHANNEL, rkey).to_string()
        }
        _ => {
            return Err(ApiError::bad_request("provide uri, or handle and rkey"));
        }
    };

    let mut view = state
        .store
        .get_channel_view(&uri)
        .await?
        .ok_or_else(|| ApiError::not_found("channel"))?;
    view.connected_count = state.runtime.connected(&uri).await;
    Ok(Json(view))
}
