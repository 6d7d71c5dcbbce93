//! Firehose consumer
//!
//! Subscribes to the jetstream websocket for the five XCVR collections and
//! feeds each commit to the record manager, sequentially and in arrival
//! order. A bad record is logged and skipped, never fatal. Transport
//! failures reconnect with a cursor one minute back; the small replay
//! window is safe because every ingest path is idempotent.

pub mod events;

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::core::constants::{FIREHOSE_REPLAY_WINDOW_SECS, WANTED_COLLECTIONS};
use crate::core::constants::{
    COLLECTION_CHANNEL, COLLECTION_MEDIA, COLLECTION_MESSAGE, COLLECTION_PROFILE,
    COLLECTION_SIGNET,
};
use crate::data::Store;
use crate::identity::IdentityResolver;
use crate::records::RecordManager;
use events::{JetstreamEvent, Operation};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct FirehoseConsumer {
    url: String,
    store: Store,
    resolver: IdentityResolver,
    manager: Arc<RecordManager>,
}

impl FirehoseConsumer {
    pub fn new(
        url: String,
        store: Store,
        resolver: IdentityResolver,
        manager: Arc<RecordManager>,
    ) -> Self {
        Self {
            url,
            store,
            resolver,
            manager,
        }
    }

    /// Consume until shutdown. Each disconnect reconnects with a fresh
    /// cursor after a short delay; the loop never gives up on its own.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let url = subscribe_url(&self.url);
            tracing::debug!(%url, "connecting to firehose");
            let mut socket = match connect_async(&url).await {
                Ok((socket, _)) => socket,
                Err(e) => {
                    tracing::warn!(error = %e, "firehose connect failed");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            let _ = socket.close(None).await;
                            return;
                        }
                    }
                    message = socket.next() => {
                        match message {
                            Some(Ok(WsMessage::Text(text))) => {
                                if let Err(e) = self.handle_event(&text).await {
                                    tracing::warn!(error = %e, "event dropped");
                                }
                            }
                            Some(Ok(WsMessage::Ping(payload))) => {
                                let _ = socket.send(WsMessage::Pong(payload)).await;
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "firehose read failed");
                                break;
                            }
                        }
                    }
                }
            }

            tracing::debug!("firehose disconnected, reconnecting");
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Decode and dispatch one event. Errors here mean this event only;
    /// the stream moves on.
    async fn handle_event(&self, text: &str) -> Result<(), anyhow::Error> {
        let event: JetstreamEvent = serde_json::from_str(text)?;
        let Some(commit) = &event.commit else {
            return Ok(());
        };
        let did = &event.did;

        // Make sure the author is in the handle map before their records.
        if self.store.resolve_did(did).await?.is_none()
            && let Err(e) = self.resolver.resolve_did(did).await
        {
            tracing::debug!(%did, error = %e, "author identity unresolved");
        }

        match (commit.collection.as_str(), commit.operation) {
            (COLLECTION_PROFILE, Operation::Create | Operation::Update) => {
                let record = commit.decode()?;
                self.manager
                    .accept_profile(record, did, commit.cid.clone())
                    .await?;
            }
            (COLLECTION_PROFILE, Operation::Delete) => {
                self.manager
                    .accept_profile_delete(did, commit.cid.as_deref().unwrap_or_default())
                    .await?;
            }

            (COLLECTION_CHANNEL, Operation::Create) => {
                let row = events::channel_row(did, commit, commit.decode()?);
                self.manager.accept_channel(row).await?;
            }
            (COLLECTION_CHANNEL, Operation::Update) => {
                let row = events::channel_row(did, commit, commit.decode()?);
                self.manager.accept_channel_update(row).await?;
            }
            (COLLECTION_CHANNEL, Operation::Delete) => {
                self.manager
                    .accept_channel_delete(&commit.record_uri(did))
                    .await?;
            }

            (COLLECTION_MESSAGE, Operation::Create) => {
                let row = events::message_row(did, commit, commit.decode()?);
                self.manager.accept_message(row).await?;
            }
            (COLLECTION_MESSAGE, Operation::Update) => {
                let row = events::message_row(did, commit, commit.decode()?);
                self.manager.accept_message_update(row, did).await?;
            }
            (COLLECTION_MESSAGE, Operation::Delete) => {
                self.manager
                    .accept_message_delete(&commit.record_uri(did))
                    .await?;
            }

            (COLLECTION_SIGNET, Operation::Create) => {
                let row = events::signet_row(did, commit, commit.decode()?);
                self.manager.accept_signet(row).await?;
            }
            (COLLECTION_SIGNET, Operation::Update) => {
                let row = events::signet_row(did, commit, commit.decode()?);
                self.manager.accept_signet_update(row).await?;
            }
            (COLLECTION_SIGNET, Operation::Delete) => {
                self.manager
                    .accept_signet_delete(&commit.record_uri(did))
                    .await?;
            }

            (COLLECTION_MEDIA, Operation::Create) => {
                let row = events::media_row(did, commit, commit.decode()?);
                self.manager.accept_image(row).await?;
            }
            (COLLECTION_MEDIA, Operation::Update) => {
                let row = events::media_row(did, commit, commit.decode()?);
                self.manager.accept_image_update(row).await?;
            }
            (COLLECTION_MEDIA, Operation::Delete) => {
                self.manager
                    .accept_image_delete(&commit.record_uri(did))
                    .await?;
            }

            (other, _) => {
                tracing::debug!(collection = other, "ignoring unwanted collection");
            }
        }
        Ok(())
    }
}

/// Subscription URL with the five wanted collections and a cursor one
/// replay window in the past.
fn subscribe_url(base: &str) -> String {
    let cursor =
        (chrono::Utc::now() - chrono::Duration::seconds(FIREHOSE_REPLAY_WINDOW_SECS))
            .timestamp_micros();
    let mut url = format!("{base}?cursor={cursor}");
    for collection in WANTED_COLLECTIONS {
        url.push_str("&wantedCollections=");
        url.push_str(collection);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_url_carries_all_collections_and_a_replay_cursor() {
        let url = subscribe_url("wss://jetstream.test/subscribe");
        for collection in WANTED_COLLECTIONS {
            assert!(url.contains(&format!("wantedCollections={collection}")));
        }
        let cursor: i64 = url
            .split_once("cursor=")
            .and_then(|(_, rest)| rest.split('&').next())
            .unwrap()
            .parse()
            .unwrap();
        let now = chrono::Utc::now().timestamp_micros();
        assert!(cursor < now);
        assert!(cursor > now - 2 * FIREHOSE_REPLAY_WINDOW_SECS * 1_000_000);
    }
}
