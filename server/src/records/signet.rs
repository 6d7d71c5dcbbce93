//! Signet issuance and ingest
//!
//! Signets are issued only by this backend, only for channels it hosts.
//! The LRC session allocates the message id; the signet attests
//! `(channel, id, author, startedAt)` in the backend's own repo. The
//! `(channel_uri, message_id)` unique constraint plus `was_new` keeps
//! reissue and replay silent.

use super::{RecordError, RecordManager};
use crate::data::types::Signet;
use crate::domain::records::SignetRecord;
use crate::domain::uri::rkey_from_uri;
use crate::utils::time::datetime_now;

impl RecordManager {
    /// Issue a signet for a new LRC line. `resolved_author` wins over the
    /// externalID the client declared. Duplicate ids are skipped silently.
    pub async fn post_signet(
        &self,
        resolved_author: Option<&str>,
        init: &lrc::InitEvent,
        channel_uri: &str,
    ) -> Result<(), RecordError> {
        let author_handle = resolved_author
            .map(str::to_string)
            .or_else(|| init.external_id.clone())
            .unwrap_or_default();
        let (stamp, now) = datetime_now();
        let record = SignetRecord::new(
            author_handle.clone(),
            channel_uri.to_string(),
            init.id as u64,
            stamp,
        );

        let (uri, cid) = self.my_client().create_signet(&record).await?;
        let signet = Signet {
            uri,
            issuer_did: self.identity().did.clone(),
            author_handle,
            channel_uri: channel_uri.to_string(),
            message_id: init.id,
            cid,
            started_at: now,
        };
        let was_new = self.store().store_signet(&signet).await?;
        if !was_new {
            return Ok(());
        }
        if let Some(broadcaster) = self.broadcaster() {
            broadcaster.broadcast_signet(channel_uri, &signet).await;
        }
        Ok(())
    }

    /// Revoke a signet: delete the record from our repo, then the row. A
    /// record that is already gone still clears the row.
    pub async fn delete_signet(&self, uri: &str) -> Result<(), RecordError> {
        let rkey = rkey_from_uri(uri)?;
        let did_not_exist = self.my_client().delete_signet(&rkey).await?;
        if did_not_exist {
            tracing::debug!(%uri, "signet record was already gone");
        }
        self.store().delete_signet(uri).await?;
        Ok(())
    }

    /// Firehose ingest of a signet create. Replays are skipped silently.
    pub async fn accept_signet(&self, signet: Signet) -> Result<(), RecordError> {
        let was_new = self.store().store_signet(&signet).await?;
        if !was_new {
            return Ok(());
        }
        if let Some(broadcaster) = self.broadcaster() {
            broadcaster.broadcast_signet(&signet.channel_uri, &signet).await;
        }
        Ok(())
    }

    pub async fn accept_signet_update(&self, signet: Signet) -> Result<(), RecordError> {
        self.store().update_signet(&signet).await?;
        Ok(())
    }

    pub async fn accept_signet_delete(&self, uri: &str) -> Result<(), RecordError> {
        self.store().delete_signet(uri).await?;
        Ok(())
    }
}
