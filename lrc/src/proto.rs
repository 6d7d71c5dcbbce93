//! Wire frames
//!
//! One JSON object per websocket text frame, discriminated by `type`. The
//! protocol is internal to this crate; hosts treat the engine as a black box
//! and only consume [`InitEvent`]s.

use serde::{Deserialize, Serialize};

/// A frame exchanged between clients and the channel server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    /// Server greeting, sent once on connect.
    Welcome { text: String },
    /// Client opens a new line; the server fills in `id` when relaying.
    #[serde(rename_all = "camelCase")]
    Init {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        external_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        nick: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        color: Option<u32>,
        /// Declared author DID, resolved server-side from `external_id`.
        #[serde(skip_serializing_if = "Option::is_none")]
        did: Option<String>,
    },
    /// Sent only to the line's author: the allocated id and authorship nonce.
    #[serde(rename_all = "camelCase")]
    Ack { id: u32, nonce: String },
    /// Streamed edit of an open line.
    Body { id: u32, text: String },
    /// Seals a line; no further edits relay.
    Pub { id: u32 },
}

/// Emitted to the host for every line a client opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitEvent {
    /// Monotonic per-channel message id.
    pub id: u32,
    /// The author identity the client declared, if any.
    pub external_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip() {
        let frame = Frame::Init {
            id: Some(2),
            external_id: Some("alice.test".into()),
            nick: None,
            color: Some(0xFF00FF),
            did: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"init""#));
        assert!(json.contains(r#""externalId":"alice.test""#));
        assert!(!json.contains("nick"));
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(serde_json::from_str::<Frame>(r#"{"type":"warp","id":1}"#).is_err());
    }
}
