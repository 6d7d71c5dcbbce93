//! Public metadata routes

use axum::Json;
use axum::extract::State;

use crate::api::ApiState;
use crate::atproto::metadata;

/// GET client-metadata path — the OAuth client metadata document.
pub async fn client_metadata(State(state): State<ApiState>) -> Json<metadata::ClientMetadata> {
    Json(metadata::client_metadata(&state.config))
}

/// GET JWKS path — the public keys for the client assertion key.
pub async fn jwks(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let credentials = state.oauth.credentials();
    Json(metadata::jwks(&credentials.key, &credentials.key_id))
}

/// GET terms-of-service path.
pub async fn tos() -> &'static str {
    "be normal be normal be normal be normal be normal be normal be normal"
}

/// GET policy path.
pub async fn policy() -> &'static str {
    "i'll be normal i'll be normal i'll be normal i'll be normal"
}
