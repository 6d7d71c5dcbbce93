//! Message write and ingest paths
//!
//! A message references the signet attesting its sequence slot. The write
//! path resolves the signet (by uri or by channel position) before the
//! record leaves the building; the ingest path watches updates for
//! interference with signets this backend issued.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};

use super::{RecordError, RecordManager};
use crate::atproto::OAuthClient;
use crate::core::constants::{
    BODY_MAX_GRAPHEMES, BODY_MAX_UTF16, COLLECTION_MESSAGE, COLOR_MAX, NICK_MAX_UTF16,
};
use crate::data::types::Message;
use crate::domain::records::MessageRecord;
use crate::domain::uri::did_from_uri;
use crate::records::requests::PostMessageRequest;
use crate::utils::text::{exceeds_bounds, exceeds_utf16};
use crate::utils::time::datetime_now;

/// Field checks that need no store access.
fn validate_message_fields(req: &PostMessageRequest) -> Result<(), RecordError> {
    if exceeds_bounds(&req.body, BODY_MAX_GRAPHEMES, BODY_MAX_UTF16) {
        return Err(RecordError::Invalid("body too long".into()));
    }
    if let Some(nick) = &req.nick
        && exceeds_utf16(nick, NICK_MAX_UTF16)
    {
        return Err(RecordError::Invalid("nick too long".into()));
    }
    if let Some(color) = req.color
        && color > COLOR_MAX
    {
        return Err(RecordError::Invalid("color out of bounds".into()));
    }
    Ok(())
}

struct ValidatedMessage {
    record: MessageRecord,
    now: DateTime<Utc>,
    author_handle: String,
    nonce: Option<Vec<u8>>,
}

impl RecordManager {
    /// Resolve the signet reference and bound-check the fields.
    async fn validate_message(
        &self,
        req: &PostMessageRequest,
    ) -> Result<ValidatedMessage, RecordError> {
        validate_message_fields(req)?;

        let (signet_uri, author_handle) = match &req.signet_uri {
            Some(uri) => {
                let handle = self
                    .store()
                    .query_signet_handle(uri)
                    .await?
                    .ok_or(RecordError::NotFound("signet"))?;
                (uri.clone(), handle)
            }
            None => {
                let (channel_uri, message_id) = match (&req.channel_uri, req.message_id) {
                    (Some(curi), Some(mid)) => (curi, mid),
                    _ => {
                        return Err(RecordError::Invalid(
                            "must provide a way to determine the signet".into(),
                        ));
                    }
                };
                self.store()
                    .query_signet(channel_uri, message_id)
                    .await?
                    .ok_or(RecordError::NotFound("signet"))?
            }
        };

        let nonce = match &req.nonce {
            Some(nonce) => Some(
                B64.decode(nonce)
                    .map_err(|_| RecordError::Invalid("nonce is not base64".into()))?,
            ),
            None => None,
        };

        let (stamp, now) = datetime_now();
        Ok(ValidatedMessage {
            record: MessageRecord {
                record_type: COLLECTION_MESSAGE.to_string(),
                signet_uri,
                body: req.body.clone(),
                nick: req.nick.clone(),
                color: req.color,
                posted_at: stamp,
            },
            now,
            author_handle,
            nonce,
        })
    }

    /// Publish a message under the session identity. The record goes to the
    /// author's repo; the local row and the broadcast follow.
    pub async fn post_message(
        &self,
        client: &OAuthClient,
        req: &PostMessageRequest,
    ) -> Result<String, RecordError> {
        let validated = self.validate_message(req).await?;
        let (uri, cid) = client
            .create_record(COLLECTION_MESSAGE, None, &validated.record)
            .await?;
        let message = build_message(uri, client.did(), cid, &validated.record, validated.now);
        self.finish_post_message(message).await
    }

    /// Publish a message under the backend's own identity. Only callers who
    /// hold the LRC authorship nonce for the signet may do this.
    pub async fn post_my_message(&self, req: &PostMessageRequest) -> Result<String, RecordError> {
        let validated = self.validate_message(req).await?;
        self.verify_my_authorship(&validated).await?;
        let (uri, cid) = self.my_client().create_message(&validated.record).await?;
        let message = build_message(
            uri,
            self.identity().did.clone(),
            cid,
            &validated.record,
            validated.now,
        );
        self.finish_post_message(message).await
    }

    /// The signet must name the backend's handle, and the caller must
    /// present the exact HMAC nonce the LRC session handed its author.
    async fn verify_my_authorship(&self, validated: &ValidatedMessage) -> Result<(), RecordError> {
        if validated.author_handle != self.identity().handle {
            return Err(RecordError::Forbidden("signet names someone else"));
        }
        let nonce = validated
            .nonce
            .as_deref()
            .ok_or(RecordError::Forbidden("missing authorship nonce"))?;
        let (channel_uri, message_id) = self
            .store()
            .query_signet_channel_id(&validated.record.signet_uri)
            .await?
            .ok_or(RecordError::NotFound("signet"))?;
        let expected = lrc::generate_nonce(message_id, &channel_uri, self.lrcd_secret());
        if nonce != expected.as_slice() {
            return Err(RecordError::Forbidden("authorship nonce mismatch"));
        }
        Ok(())
    }

    async fn finish_post_message(&self, message: Message) -> Result<String, RecordError> {
        let was_new = self.store().store_message(&message).await?;
        if was_new {
            self.forward_message(&message).await?;
        }
        Ok(message.uri)
    }

    /// Firehose ingest of a message create. Replays are skipped silently.
    pub async fn accept_message(&self, message: Message) -> Result<(), RecordError> {
        let was_new = self.store().store_message(&message).await?;
        if !was_new {
            return Ok(());
        }
        self.forward_message(&message).await
    }

    /// Firehose ingest of a message update: upsert, then check whether the
    /// update interferes with a signet this backend issued.
    pub async fn accept_message_update(
        &self,
        message: Message,
        updater_did: &str,
    ) -> Result<(), RecordError> {
        self.store().update_message(&message).await?;
        self.check_interference(&message, updater_did).await
    }

    pub async fn accept_message_delete(&self, uri: &str) -> Result<(), RecordError> {
        self.store().delete_message(uri).await?;
        Ok(())
    }

    /// A message under one of our signets whose author no longer matches
    /// the attested handle voids the attestation: delete the signet from
    /// our repo and the local row.
    async fn check_interference(
        &self,
        message: &Message,
        updater_did: &str,
    ) -> Result<(), RecordError> {
        let Some(attested_handle) = self.store().query_signet_handle(&message.signet_uri).await?
        else {
            return Err(RecordError::NotFound("signet"));
        };
        let issuer = did_from_uri(&message.signet_uri)?;
        if issuer != self.identity().did {
            // Cross-host interference is not ours to remedy.
            return Ok(());
        }
        let Some(updater_handle) = self.store().resolve_did(updater_did).await? else {
            return Err(RecordError::NotFound("updater handle"));
        };
        if attested_handle == updater_handle {
            return Ok(());
        }
        tracing::warn!(
            signet = %message.signet_uri,
            attested = %attested_handle,
            updater = %updater_handle,
            "signet interference detected, revoking"
        );
        self.delete_signet(&message.signet_uri).await
    }

    async fn forward_message(&self, message: &Message) -> Result<(), RecordError> {
        let Some(channel_uri) = self.store().get_msg_channel_uri(&message.signet_uri).await?
        else {
            return Err(RecordError::NotFound("channel for signet"));
        };
        if let Some(broadcaster) = self.broadcaster() {
            broadcaster.broadcast_message(&channel_uri, message).await;
        }
        Ok(())
    }
}

fn build_message(
    uri: String,
    did: String,
    cid: String,
    record: &MessageRecord,
    now: DateTime<Utc>,
) -> Message {
    Message {
        uri,
        did,
        cid,
        signet_uri: record.signet_uri.clone(),
        body: record.body.clone(),
        nick: record.nick.clone(),
        color: record.color.map(|c| c as u32),
        posted_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &str, nick: Option<&str>, color: Option<u64>) -> PostMessageRequest {
        PostMessageRequest {
            signet_uri: Some("at://did:plc:bk/org.xcvr.lrc.signet/rk".into()),
            channel_uri: None,
            message_id: None,
            body: body.to_string(),
            nick: nick.map(String::from),
            color,
            nonce: None,
        }
    }

    #[test]
    fn nick_boundary_is_sixteen_utf16_units() {
        assert!(validate_message_fields(&request("hi", Some(&"n".repeat(16)), None)).is_ok());
        assert!(validate_message_fields(&request("hi", Some(&"n".repeat(17)), None)).is_err());
    }

    #[test]
    fn color_boundary_is_24_bit() {
        assert!(validate_message_fields(&request("hi", None, Some(0xFF_FF_FF))).is_ok());
        assert!(validate_message_fields(&request("hi", None, Some(0x1_00_00_00))).is_err());
    }

    #[test]
    fn body_boundary_is_two_thousand_graphemes() {
        assert!(validate_message_fields(&request(&"b".repeat(2000), None, None)).is_ok());
        assert!(validate_message_fields(&request(&"b".repeat(2001), None, None)).is_err());
    }
}
