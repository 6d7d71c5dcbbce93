//! View objects
//!
//! What the backend serves over XRPC and streams to lexicon subscribers.
//! Each view is tagged with its `$type` discriminator, mirroring the record
//! collections' `defs` namespaces.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::records::AspectRatio;

pub const PROFILE_VIEW_TYPE: &str = "org.xcvr.actor.defs#profileView";
pub const CHANNEL_VIEW_TYPE: &str = "org.xcvr.feed.defs#channelView";
pub const SIGNET_VIEW_TYPE: &str = "org.xcvr.lrc.defs#signetView";
pub const MESSAGE_VIEW_TYPE: &str = "org.xcvr.lrc.defs#messageView";
pub const SIGNED_MESSAGE_VIEW_TYPE: &str = "org.xcvr.lrc.defs#signedMessageView";
pub const MEDIA_VIEW_TYPE: &str = "org.xcvr.lrc.defs#mediaView";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(rename = "$type")]
    pub lex_type: &'static str,
    pub did: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_nick: Option<String>,
}

impl ProfileView {
    /// A view for an actor we know only by identity, before any profile
    /// record has been seen.
    pub fn bare(did: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            lex_type: PROFILE_VIEW_TYPE,
            did: did.into(),
            handle: handle.into(),
            display_name: None,
            status: None,
            color: None,
            avatar: None,
            default_nick: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    #[serde(rename = "$type")]
    pub lex_type: &'static str,
    pub uri: String,
    pub host: String,
    pub creator: ProfileView,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignetView {
    #[serde(rename = "$type")]
    pub lex_type: &'static str,
    pub uri: String,
    pub issuer_handle: String,
    #[serde(rename = "channelURI")]
    pub channel_uri: String,
    #[serde(rename = "lrcID")]
    pub lrc_id: u32,
    pub author_handle: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(rename = "$type")]
    pub lex_type: &'static str,
    pub uri: String,
    pub author: ProfileView,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(rename = "signetURI")]
    pub signet_uri: String,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessageView {
    #[serde(rename = "$type")]
    pub lex_type: &'static str,
    pub uri: String,
    pub author: ProfileView,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    pub signet: SignetView,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub alt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    #[serde(rename = "$type")]
    pub lex_type: &'static str,
    pub uri: String,
    pub author: ProfileView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_view: Option<ImageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(rename = "signetURI")]
    pub signet_uri: String,
    pub posted_at: DateTime<Utc>,
}

/// One frame on the lexicon stream.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LexStreamEvent {
    Signet(SignetView),
    Message(MessageView),
    Media(MediaView),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signet_view_carries_discriminator() {
        let view = SignetView {
            lex_type: SIGNET_VIEW_TYPE,
            uri: "at://did:plc:bk/org.xcvr.lrc.signet/rk".into(),
            issuer_handle: "transmitter.test".into(),
            channel_uri: "at://did:plc:bk/org.xcvr.feed.channel/rk1".into(),
            lrc_id: 2,
            author_handle: "alice.test".into(),
            started_at: Utc::now(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["$type"], SIGNET_VIEW_TYPE);
        assert_eq!(json["lrcID"], 2);
        assert_eq!(json["channelURI"], "at://did:plc:bk/org.xcvr.feed.channel/rk1");
    }

    #[test]
    fn stream_event_serializes_inner_view_untagged() {
        let event = LexStreamEvent::Message(MessageView {
            lex_type: MESSAGE_VIEW_TYPE,
            uri: "at://did:plc:alice/org.xcvr.lrc.message/rk".into(),
            author: ProfileView::bare("did:plc:alice", "alice.test"),
            body: "hello".into(),
            nick: None,
            color: None,
            signet_uri: "at://did:plc:bk/org.xcvr.lrc.signet/rk".into(),
            posted_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["$type"], MESSAGE_VIEW_TYPE);
        assert_eq!(json["author"]["$type"], PROFILE_VIEW_TYPE);
        assert!(json.get("nick").is_none());
    }
}
