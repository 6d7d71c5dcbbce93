//! Record manager
//!
//! The single write path and ingestion sink. Every record kind gets a
//! validating `post_*` (local origin: publish to a repo, persist, broadcast)
//! and an idempotent `accept_*` (firehose origin: persist, broadcast only
//! when the row was new). Broadcasting goes through the narrow
//! [`Broadcaster`] capability so the channel runtime stays swappable; the
//! runtime is attached after construction to break the reference cycle.

mod channel;
mod media;
mod message;
mod profile;
pub mod requests;
mod signet;

pub(crate) use media::image_from_record;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::atproto::{OAuthService, PasswordClient, XrpcError};
use crate::core::config::BackendIdentity;
use crate::data::Store;
use crate::data::error::StoreError;
use crate::data::types::{Channel, Image, Message, Signet};
use crate::domain::uri::UriError;
use crate::identity::IdentityError;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid record: {0}")]
    Invalid(String),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("not allowed: {0}")]
    Forbidden(&'static str),
    #[error(transparent)]
    Xrpc(#[from] XrpcError),
    #[error(transparent)]
    Auth(#[from] crate::atproto::AuthFlowError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Uri(#[from] UriError),
}

/// The capability surface the channel runtime exposes to the manager.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast_signet(&self, channel_uri: &str, signet: &Signet);
    async fn broadcast_message(&self, channel_uri: &str, message: &Message);
    async fn broadcast_image(&self, channel_uri: &str, image: &Image);
    async fn add_channel(&self, channel: &Channel);
    async fn update_channel(&self, channel: &Channel);
    async fn delete_channel(&self, uri: &str);
}

pub struct RecordManager {
    store: Store,
    my_client: Arc<PasswordClient>,
    service: Arc<OAuthService>,
    identity: BackendIdentity,
    lrcd_secret: String,
    broadcaster: RwLock<Option<Arc<dyn Broadcaster>>>,
}

impl RecordManager {
    pub fn new(
        store: Store,
        my_client: Arc<PasswordClient>,
        service: Arc<OAuthService>,
        identity: BackendIdentity,
        lrcd_secret: String,
    ) -> Self {
        Self {
            store,
            my_client,
            service,
            identity,
            lrcd_secret,
            broadcaster: RwLock::new(None),
        }
    }

    /// Attach the runtime once it exists (two-phase construction).
    pub fn set_broadcaster(&self, broadcaster: Arc<dyn Broadcaster>) {
        *self.broadcaster.write() = Some(broadcaster);
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn my_client(&self) -> &PasswordClient {
        &self.my_client
    }

    pub(crate) fn service(&self) -> &OAuthService {
        &self.service
    }

    pub(crate) fn identity(&self) -> &BackendIdentity {
        &self.identity
    }

    pub(crate) fn lrcd_secret(&self) -> &str {
        &self.lrcd_secret
    }

    pub(crate) fn broadcaster(&self) -> Option<Arc<dyn Broadcaster>> {
        self.broadcaster.read().clone()
    }

    /// Publish the fixed beep post to the wider feed network.
    pub async fn beep(&self, client: &crate::atproto::OAuthClient) -> Result<(), RecordError> {
        client.make_post("beep_").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingBroadcaster;
    use super::*;
    use chrono::Utc;

    // The capability stays object-safe so the manager can hold any runtime
    // behind `Arc<dyn Broadcaster>`.
    #[tokio::test]
    async fn broadcaster_capability_records_calls_through_a_trait_object() {
        let recording = Arc::new(RecordingBroadcaster::default());
        let broadcaster: Arc<dyn Broadcaster> = recording.clone();

        let signet = Signet {
            uri: "at://did:plc:bk/org.xcvr.lrc.signet/rk".into(),
            issuer_did: "did:plc:bk".into(),
            author_handle: "alice.test".into(),
            channel_uri: "at://did:plc:bk/org.xcvr.feed.channel/rk1".into(),
            message_id: 2,
            cid: "bafysignet".into(),
            started_at: Utc::now(),
        };
        broadcaster
            .broadcast_signet(&signet.channel_uri, &signet)
            .await;
        broadcaster.delete_channel(&signet.channel_uri).await;

        assert_eq!(
            recording.signets.lock().unwrap().as_slice(),
            &[("at://did:plc:bk/org.xcvr.feed.channel/rk1".to_string(), 2)]
        );
        assert_eq!(recording.deleted.lock().unwrap().len(), 1);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Records every capability call for assertions.
    #[derive(Default)]
    pub struct RecordingBroadcaster {
        pub signets: Mutex<Vec<(String, u32)>>,
        pub messages: Mutex<Vec<(String, String)>>,
        pub images: Mutex<Vec<(String, String)>>,
        pub added: Mutex<Vec<String>>,
        pub updated: Mutex<Vec<String>>,
        pub deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn broadcast_signet(&self, channel_uri: &str, signet: &Signet) {
            self.signets
                .lock()
                .unwrap()
                .push((channel_uri.to_string(), signet.message_id));
        }

        async fn broadcast_message(&self, channel_uri: &str, message: &Message) {
            self.messages
                .lock()
                .unwrap()
                .push((channel_uri.to_string(), message.uri.clone()));
        }

        async fn broadcast_image(&self, channel_uri: &str, image: &Image) {
            self.images
                .lock()
                .unwrap()
                .push((channel_uri.to_string(), image.uri.clone()));
        }

        async fn add_channel(&self, channel: &Channel) {
            self.added.lock().unwrap().push(channel.uri.clone());
        }

        async fn update_channel(&self, channel: &Channel) {
            self.updated.lock().unwrap().push(channel.uri.clone());
        }

        async fn delete_channel(&self, uri: &str) {
            self.deleted.lock().unwrap().push(uri.to_string());
        }
    }
}
