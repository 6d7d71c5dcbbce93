//! Record bodies
//!
//! The JSON shapes written to (and ingested from) user repositories. Every
//! record carries its collection id in `$type`; deserialization tolerates a
//! missing discriminator since the firehose already routes by collection.

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    COLLECTION_CHANNEL, COLLECTION_MEDIA, COLLECTION_MESSAGE, COLLECTION_PROFILE,
    COLLECTION_SIGNET,
};

/// An atproto blob reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    #[serde(rename = "$type", default = "blob_type")]
    pub blob_type: String,
    #[serde(rename = "ref")]
    pub link: BlobLink,
    pub mime_type: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlobLink {
    #[serde(rename = "$link")]
    pub cid: String,
}

fn blob_type() -> String {
    "blob".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(rename = "$type", default = "profile_type")]
    pub record_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<BlobRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u64>,
}

fn profile_type() -> String {
    COLLECTION_PROFILE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    #[serde(rename = "$type", default = "channel_type")]
    pub record_type: String,
    pub title: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub created_at: String,
}

fn channel_type() -> String {
    COLLECTION_CHANNEL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    #[serde(rename = "$type", default = "message_type")]
    pub record_type: String,
    #[serde(rename = "signetURI")]
    pub signet_uri: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u64>,
    pub posted_at: String,
}

fn message_type() -> String {
    COLLECTION_MESSAGE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignetRecord {
    #[serde(rename = "$type", default = "signet_type")]
    pub record_type: String,
    pub author_handle: String,
    #[serde(rename = "channelURI")]
    pub channel_uri: String,
    pub lrc_id: u64,
    pub started_at: String,
}

fn signet_type() -> String {
    COLLECTION_SIGNET.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AspectRatio {
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageEmbed {
    pub image: BlobRef,
    #[serde(default)]
    pub alt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageEmbed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    #[serde(rename = "$type", default = "media_type")]
    pub record_type: String,
    #[serde(rename = "signetURI")]
    pub signet_uri: String,
    pub media: MediaEmbed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u64>,
    pub posted_at: String,
}

fn media_type() -> String {
    COLLECTION_MEDIA.to_string()
}

impl ChannelRecord {
    pub fn new(title: String, host: String, topic: Option<String>, created_at: String) -> Self {
        Self {
            record_type: channel_type(),
            title,
            host,
            topic,
            created_at,
        }
    }
}

impl SignetRecord {
    pub fn new(author_handle: String, channel_uri: String, lrc_id: u64, started_at: String) -> Self {
        Self {
            record_type: signet_type(),
            author_handle,
            channel_uri,
            lrc_id,
            started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_record_serializes_with_type_tag() {
        let rec = ChannelRecord::new(
            "general".into(),
            "transmitter.test".into(),
            None,
            "2026-01-01T00:00:00.000Z".into(),
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["$type"], COLLECTION_CHANNEL);
        assert_eq!(json["title"], "general");
        assert!(json.get("topic").is_none());
    }

    #[test]
    fn message_record_parses_without_type_tag() {
        let rec: MessageRecord = serde_json::from_str(
            r#"{"signetURI":"at://did:plc:bk/org.xcvr.lrc.signet/rk","body":"hi","postedAt":"2026-01-01T00:00:00.000Z"}"#,
        )
        .unwrap();
        assert_eq!(rec.record_type, COLLECTION_MESSAGE);
        assert_eq!(rec.body, "hi");
        assert!(rec.nick.is_none());
    }

    #[test]
    fn blob_ref_round_trips_link_shape() {
        let json = r#"{"$type":"blob","ref":{"$link":"bafyrei"},"mimeType":"image/png","size":123}"#;
        let blob: BlobRef = serde_json::from_str(json).unwrap();
        assert_eq!(blob.link.cid, "bafyrei");
        let back = serde_json::to_string(&blob).unwrap();
        assert!(back.contains(r#""$link":"bafyrei""#));
    }
}
