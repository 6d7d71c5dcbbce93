//! Firehose event decoding
//!
//! Only the fields the backend consumes are deserialized; everything else
//! in the upstream envelope is ignored. Row builders turn a commit's record
//! body into the stored shape, substituting arrival time for unparseable
//! timestamps rather than rejecting the event.

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::core::constants::COLLECTION_CHANNEL;
use crate::data::types::{Channel, Image, Message, Signet};
use crate::domain::AtUri;
use crate::domain::records::{ChannelRecord, MediaRecord, MessageRecord, SignetRecord};
use crate::utils::time::parse_datetime_lossy;

#[derive(Debug, Deserialize)]
pub struct JetstreamEvent {
    pub did: String,
    #[serde(default)]
    pub commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
pub struct Commit {
    pub collection: String,
    pub operation: Operation,
    pub rkey: String,
    #[serde(default)]
    pub cid: Option<String>,
    /// Raw record body, decoded per collection by the dispatcher.
    #[serde(default)]
    pub record: Option<Box<RawValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Commit {
    /// The at:// uri of the committed record.
    pub fn record_uri(&self, did: &str) -> String {
        AtUri::new(did, self.collection.clone(), self.rkey.clone()).to_string()
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.record {
            Some(raw) => serde_json::from_str(raw.get()),
            None => serde_json::from_str("null"),
        }
    }
}

pub fn channel_row(did: &str, commit: &Commit, record: ChannelRecord) -> Channel {
    Channel {
        uri: AtUri::new(did, COLLECTION_CHANNEL, commit.rkey.clone()).to_string(),
        cid: commit.cid.clone().unwrap_or_default(),
        did: did.to_string(),
        host: record.host,
        title: record.title,
        topic: record.topic,
        created_at: parse_datetime_lossy(&record.created_at),
    }
}

pub fn message_row(did: &str, commit: &Commit, record: MessageRecord) -> Message {
    Message {
        uri: commit.record_uri(did),
        did: did.to_string(),
        cid: commit.cid.clone().unwrap_or_default(),
        signet_uri: record.signet_uri,
        body: record.body,
        nick: record.nick,
        color: record.color.map(|c| c as u32),
        posted_at: parse_datetime_lossy(&record.posted_at),
    }
}

pub fn signet_row(did: &str, commit: &Commit, record: SignetRecord) -> Signet {
    Signet {
        uri: commit.record_uri(did),
        issuer_did: did.to_string(),
        author_handle: record.author_handle,
        channel_uri: record.channel_uri,
        message_id: record.lrc_id as u32,
        cid: commit.cid.clone().unwrap_or_default(),
        started_at: parse_datetime_lossy(&record.started_at),
    }
}

pub fn media_row(did: &str, commit: &Commit, record: MediaRecord) -> Image {
    let posted_at = parse_datetime_lossy(&record.posted_at);
    crate::records::image_from_record(
        commit.record_uri(did),
        did.to_string(),
        commit.cid.clone().unwrap_or_default(),
        &record,
        posted_at,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNET_EVENT: &str = r#"{
        "did": "did:plc:bk",
        "time_us": 1700000000000000,
        "kind": "commit",
        "commit": {
            "rev": "3kxyz",
            "operation": "create",
            "collection": "org.xcvr.lrc.signet",
            "rkey": "rk9",
            "cid": "bafysignet",
            "record": {
                "$type": "org.xcvr.lrc.signet",
                "authorHandle": "alice.test",
                "channelURI": "at://did:plc:bk/org.xcvr.feed.channel/rk1",
                "lrcId": 2,
                "startedAt": "2026-01-01T00:00:00.000Z"
            }
        }
    }"#;

    #[test]
    fn signet_event_decodes_into_a_row() {
        let event: JetstreamEvent = serde_json::from_str(SIGNET_EVENT).unwrap();
        let commit = event.commit.unwrap();
        assert_eq!(commit.operation, Operation::Create);
        let record: SignetRecord = commit.decode().unwrap();
        let row = signet_row(&event.did, &commit, record);
        assert_eq!(row.uri, "at://did:plc:bk/org.xcvr.lrc.signet/rk9");
        assert_eq!(row.issuer_did, "did:plc:bk");
        assert_eq!(row.message_id, 2);
        assert_eq!(row.author_handle, "alice.test");
    }

    #[test]
    fn delete_commit_has_no_record() {
        let event: JetstreamEvent = serde_json::from_str(
            r#"{"did":"did:plc:bk","commit":{"operation":"delete","collection":"org.xcvr.lrc.message","rkey":"rk"}}"#,
        )
        .unwrap();
        let commit = event.commit.unwrap();
        assert_eq!(commit.operation, Operation::Delete);
        assert!(commit.record.is_none());
        assert_eq!(commit.record_uri(&event.did), "at://did:plc:bk/org.xcvr.lrc.message/rk");
    }

    #[test]
    fn non_commit_events_parse_with_no_commit() {
        let event: JetstreamEvent =
            serde_json::from_str(r#"{"did":"did:plc:bk","kind":"identity"}"#).unwrap();
        assert!(event.commit.is_none());
    }

    #[test]
    fn bad_timestamp_falls_back_instead_of_poisoning() {
        let commit = Commit {
            collection: "org.xcvr.feed.channel".into(),
            operation: Operation::Create,
            rkey: "rk1".into(),
            cid: None,
            record: None,
        };
        let record = ChannelRecord::new("general".into(), "t.test".into(), None, "garbage".into());
        let row = channel_row("did:plc:bk", &commit, record);
        assert!(row.created_at.timestamp() > 0);
    }
}
