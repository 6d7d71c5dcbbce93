//! Client-facing write request bodies

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostChannelRequest {
    pub title: String,
    pub host: String,
    #[serde(default)]
    pub topic: Option<String>,
}

/// A message post names its signet either directly by uri or by channel
/// position. The nonce is present only on "post my message" flows.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    #[serde(default, rename = "signetURI")]
    pub signet_uri: Option<String>,
    #[serde(default, rename = "channelURI")]
    pub channel_uri: Option<String>,
    #[serde(default, rename = "messageID")]
    pub message_id: Option<u32>,
    pub body: String,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub color: Option<u64>,
    /// Base64 authorship nonce from the LRC ack frame.
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub default_nick: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub avatar: Option<crate::domain::records::BlobRef>,
    #[serde(default)]
    pub color: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMediaRequest {
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(default, rename = "signetURI")]
    pub signet_uri: Option<String>,
    #[serde(default, rename = "channelURI")]
    pub channel_uri: Option<String>,
    #[serde(default, rename = "messageID")]
    pub message_id: Option<u32>,
    #[serde(default)]
    pub image: Option<crate::domain::records::ImageEmbed>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub color: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanRequest {
    pub did: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}
