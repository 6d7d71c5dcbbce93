//! Channel write and ingest paths

use chrono::{DateTime, Utc};

use super::{RecordError, RecordManager};
use crate::atproto::OAuthClient;
use crate::core::constants::{
    COLLECTION_CHANNEL, TITLE_MAX_GRAPHEMES, TITLE_MAX_UTF16, TOPIC_MAX_GRAPHEMES, TOPIC_MAX_UTF16,
};
use crate::data::types::Channel;
use crate::domain::records::ChannelRecord;
use crate::records::requests::PostChannelRequest;
use crate::utils::text::exceeds_bounds;
use crate::utils::time::datetime_now;

fn validate_channel(
    req: &PostChannelRequest,
) -> Result<(ChannelRecord, DateTime<Utc>), RecordError> {
    if req.title.is_empty() || exceeds_bounds(&req.title, TITLE_MAX_GRAPHEMES, TITLE_MAX_UTF16) {
        return Err(RecordError::Invalid("title empty or too long".into()));
    }
    if req.host.is_empty() {
        return Err(RecordError::Invalid("host is required".into()));
    }
    if let Some(topic) = &req.topic
        && exceeds_bounds(topic, TOPIC_MAX_GRAPHEMES, TOPIC_MAX_UTF16)
    {
        return Err(RecordError::Invalid("topic too long".into()));
    }
    let (stamp, now) = datetime_now();
    Ok((
        ChannelRecord::new(req.title.clone(), req.host.clone(), req.topic.clone(), stamp),
        now,
    ))
}

impl RecordManager {
    /// Publish a channel record into the session's repo, persist it, and
    /// hand it to the runtime. Returns `(did, uri)`.
    pub async fn post_channel(
        &self,
        client: &OAuthClient,
        req: &PostChannelRequest,
    ) -> Result<(String, String), RecordError> {
        let (record, now) = validate_channel(req)?;
        let (uri, cid) = client.create_record(COLLECTION_CHANNEL, None, &record).await?;
        let channel = Channel {
            uri,
            cid,
            did: client.did(),
            host: record.host,
            title: record.title,
            topic: record.topic,
            created_at: now,
        };
        self.finish_post_channel(channel).await
    }

    /// Same flow, but the record lands in the backend's own repo.
    pub async fn post_my_channel(
        &self,
        req: &PostChannelRequest,
    ) -> Result<(String, String), RecordError> {
        let (record, now) = validate_channel(req)?;
        let (uri, cid) = self.my_client().create_channel(&record).await?;
        let channel = Channel {
            uri,
            cid,
            did: self.identity().did.clone(),
            host: record.host,
            title: record.title,
            topic: record.topic,
            created_at: now,
        };
        self.finish_post_channel(channel).await
    }

    async fn finish_post_channel(&self, channel: Channel) -> Result<(String, String), RecordError> {
        let was_new = self.store().store_channel(&channel).await?;
        if was_new && let Some(broadcaster) = self.broadcaster() {
            broadcaster.add_channel(&channel).await;
        }
        Ok((channel.did, channel.uri))
    }

    /// Firehose ingest of a channel create. Replays are skipped silently.
    pub async fn accept_channel(&self, channel: Channel) -> Result<(), RecordError> {
        let was_new = self.store().store_channel(&channel).await?;
        if !was_new {
            return Ok(());
        }
        if let Some(broadcaster) = self.broadcaster() {
            broadcaster.add_channel(&channel).await;
        }
        Ok(())
    }

    pub async fn accept_channel_update(&self, channel: Channel) -> Result<(), RecordError> {
        self.store().update_channel(&channel).await?;
        if let Some(broadcaster) = self.broadcaster() {
            broadcaster.update_channel(&channel).await;
        }
        Ok(())
    }

    /// Drop a channel everywhere; a running LRC server is cancelled by the
    /// runtime's delete path.
    pub async fn accept_channel_delete(&self, uri: &str) -> Result<(), RecordError> {
        self.store().delete_channel(uri).await?;
        if let Some(broadcaster) = self.broadcaster() {
            broadcaster.delete_channel(uri).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, host: &str, topic: Option<&str>) -> PostChannelRequest {
        PostChannelRequest {
            title: title.to_string(),
            host: host.to_string(),
            topic: topic.map(String::from),
        }
    }

    #[test]
    fn title_boundary_is_sixty_four_graphemes() {
        let ok = request(&"t".repeat(TITLE_MAX_GRAPHEMES), "transmitter.test", None);
        assert!(validate_channel(&ok).is_ok());
        let too_long = request(&"t".repeat(TITLE_MAX_GRAPHEMES + 1), "transmitter.test", None);
        assert!(validate_channel(&too_long).is_err());
    }

    #[test]
    fn empty_title_and_host_are_rejected() {
        assert!(validate_channel(&request("", "transmitter.test", None)).is_err());
        assert!(validate_channel(&request("general", "", None)).is_err());
    }

    #[test]
    fn topic_boundary_is_two_fifty_six_graphemes() {
        let ok = request(
            "general",
            "transmitter.test",
            Some(&"t".repeat(TOPIC_MAX_GRAPHEMES)),
        );
        assert!(validate_channel(&ok).is_ok());
        let too_long = request(
            "general",
            "transmitter.test",
            Some(&"t".repeat(TOPIC_MAX_GRAPHEMES + 1)),
        );
        assert!(validate_channel(&too_long).is_err());
    }

    #[test]
    fn record_carries_a_created_at_stamp() {
        let (record, now) = validate_channel(&request("general", "transmitter.test", None)).unwrap();
        assert_eq!(record.title, "general");
        assert_eq!(record.host, "transmitter.test");
        assert!(record.created_at.starts_with(&now.format("%Y-%m-%d").to_string()));
    }
}
