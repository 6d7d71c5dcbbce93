//! Stored row types
//!
//! The durable, derived view of records seen on the network. User repos are
//! the source of truth; these rows converge on them through idempotent
//! upserts keyed by record uri.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidHandle {
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub did: String,
    pub display_name: Option<String>,
    pub default_nick: Option<String>,
    pub status: Option<String>,
    pub avatar_cid: Option<String>,
    pub avatar_mime: Option<String>,
    pub color: Option<u64>,
}

/// A partial profile write; absent fields leave the stored row unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub default_nick: Option<String>,
    pub status: Option<String>,
    pub avatar_cid: Option<String>,
    pub avatar_mime: Option<String>,
    pub color: Option<u64>,
    /// CID of the profile record this patch was derived from, kept for
    /// tombstone matching.
    pub record_cid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub uri: String,
    pub cid: String,
    pub did: String,
    pub host: String,
    pub title: String,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Signet {
    pub uri: String,
    pub issuer_did: String,
    pub author_handle: String,
    pub channel_uri: String,
    pub message_id: u32,
    pub cid: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub uri: String,
    pub did: String,
    pub cid: String,
    pub signet_uri: String,
    pub body: String,
    pub nick: Option<String>,
    pub color: Option<u32>,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Image {
    pub uri: String,
    pub did: String,
    pub cid: String,
    pub signet_uri: String,
    pub blob_cid: Option<String>,
    pub blob_mime: Option<String>,
    pub alt: String,
    pub nick: Option<String>,
    pub color: Option<u32>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub posted_at: DateTime<Utc>,
}

/// Channel identity plus the high-water message id, used to warm the
/// channel runtime at startup.
#[derive(Debug, Clone)]
pub struct ChannelHead {
    pub uri: String,
    pub host: String,
    pub topic: Option<String>,
    pub last_message_id: u32,
}

#[derive(Debug, Clone)]
pub struct OAuthRequestRow {
    pub state: String,
    pub did: String,
    pub pds_url: String,
    pub authserver_iss: String,
    pub token_endpoint: String,
    pub pkce_verifier: String,
    pub dpop_authserver_nonce: String,
    pub dpop_private_multibase: String,
}

#[derive(Debug, Clone)]
pub struct OAuthSessionRow {
    pub did: String,
    pub session_id: String,
    pub pds_url: String,
    pub authserver_iss: String,
    pub token_endpoint: String,
    pub access_token: String,
    pub refresh_token: String,
    pub dpop_private_multibase: String,
    pub dpop_authserver_nonce: String,
    pub dpop_pds_nonce: String,
    pub scopes: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ban {
    pub id: i64,
    pub did: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    pub banned_at: DateTime<Utc>,
}
