//! Channel runtime
//!
//! One [`ChannelState`] per known channel. Hosted channels lazily start an
//! embedded LRC server on the first websocket and stop it again when the
//! idle sweep finds nobody connected, carrying the last message id across
//! so ids never repeat. Every init event the engine emits becomes a signet
//! through the record manager. Lexicon subscribers hang off the channel on
//! bounded queues; the slow are evicted, never waited for.

mod subscriber;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::config::BackendIdentity;
use crate::core::constants::{IDLE_SWEEP_INTERVAL_SECS, SUBSCRIBER_QUEUE_CAPACITY};
use crate::data::Store;
use crate::data::types::{Channel, ChannelHead, Image, Message, Signet};
use crate::domain::views::{
    ImageView, LexStreamEvent, MEDIA_VIEW_TYPE, MESSAGE_VIEW_TYPE, MediaView, MessageView,
    SIGNET_VIEW_TYPE, SignetView,
};
use crate::identity::IdentityResolver;
use crate::records::{Broadcaster, RecordManager};

pub use subscriber::run_subscriber;

const DEFAULT_WELCOME: &str = "tune in, speak freely";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("unknown channel")]
    NotFound,
    #[error("channel is not hosted here")]
    NotHosted,
}

/// A live channel's engine plus its lifecycle context.
struct Engine {
    server: Arc<lrc::Server>,
    cancel: CancellationToken,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<LexStreamEvent>,
}

pub struct ChannelState {
    uri: String,
    welcome: RwLock<String>,
    hosted: RwLock<bool>,
    /// High-water message id, carried across engine stop/start.
    last_id: AtomicU32,
    engine: tokio::sync::Mutex<Option<Engine>>,
    subscribers: Mutex<Vec<Subscriber>>,
    /// Cancelled on idle stop and on channel delete; replaced on restart.
    lifecycle: RwLock<CancellationToken>,
}

impl ChannelState {
    fn new(uri: String, welcome: String, hosted: bool, last_id: u32) -> Arc<Self> {
        Arc::new(Self {
            uri,
            welcome: RwLock::new(welcome),
            hosted: RwLock::new(hosted),
            last_id: AtomicU32::new(last_id),
            engine: tokio::sync::Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            lifecycle: RwLock::new(CancellationToken::new()),
        })
    }

    fn lifecycle_token(&self) -> CancellationToken {
        self.lifecycle.read().clone()
    }

    /// Enqueue an event to every subscriber; a full queue evicts its owner.
    fn fan_out(&self, event: LexStreamEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(uri = %self.uri, subscriber = sub.id, "evicting slow subscriber");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn register_subscriber(&self, id: u64) -> mpsc::Receiver<LexStreamEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.lock().push(Subscriber { id, tx });
        rx
    }

    fn deregister_subscriber(&self, id: u64) {
        self.subscribers.lock().retain(|sub| sub.id != id);
    }
}

fn welcome_for(topic: Option<&str>) -> String {
    topic
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_WELCOME)
        .to_string()
}

/// Adapts the identity resolver to the engine's callback seam.
struct EngineResolver {
    resolver: IdentityResolver,
}

#[async_trait]
impl lrc::Resolver for EngineResolver {
    async fn resolve(&self, external_id: &str) -> Option<String> {
        match self.resolver.full_resolve_handle(external_id).await {
            Ok(did) => Some(did),
            Err(e) => {
                tracing::debug!(handle = %external_id, error = %e, "external id did not resolve");
                None
            }
        }
    }
}

pub struct ChannelRuntime {
    store: Store,
    identity: BackendIdentity,
    lrcd_secret: String,
    resolver: IdentityResolver,
    manager: Arc<RecordManager>,
    channels: Mutex<HashMap<String, Arc<ChannelState>>>,
    subscriber_seq: AtomicU64,
}

impl ChannelRuntime {
    pub fn new(
        store: Store,
        identity: BackendIdentity,
        lrcd_secret: String,
        resolver: IdentityResolver,
        manager: Arc<RecordManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            identity,
            lrcd_secret,
            resolver,
            manager,
            channels: Mutex::new(HashMap::new()),
            subscriber_seq: AtomicU64::new(0),
        })
    }

    /// Seed the map from the store at startup so hosted channels resume at
    /// their high-water message id.
    pub async fn warm_from_store(&self) -> Result<(), crate::data::error::StoreError> {
        let heads = self.store.get_channel_heads().await?;
        let mut channels = self.channels.lock();
        for head in heads {
            let ChannelHead {
                uri,
                host,
                topic,
                last_message_id,
            } = head;
            let hosted = host == self.identity.handle;
            channels.entry(uri.clone()).or_insert_with(|| {
                ChannelState::new(uri, welcome_for(topic.as_deref()), hosted, last_message_id)
            });
        }
        tracing::debug!(channels = channels.len(), "warmed channel map");
        Ok(())
    }

    fn state(&self, uri: &str) -> Option<Arc<ChannelState>> {
        self.channels.lock().get(uri).cloned()
    }

    /// Number of live chat connections, when the channel's engine runs.
    pub async fn connected(&self, uri: &str) -> Option<usize> {
        let state = self.state(uri)?;
        let engine = state.engine.lock().await;
        engine.as_ref().map(|e| e.server.connected())
    }

    /// The engine serving a hosted channel, started lazily. The engine
    /// mutex serializes stop/start per channel; channels are independent.
    pub async fn ws_server(&self, uri: &str) -> Result<Arc<lrc::Server>, RuntimeError> {
        let state = self.state(uri).ok_or(RuntimeError::NotFound)?;
        if !*state.hosted.read() {
            return Err(RuntimeError::NotHosted);
        }

        let mut engine = state.engine.lock().await;
        if let Some(engine) = engine.as_ref() {
            return Ok(engine.server.clone());
        }

        // The welcome line occupies id 1 on a fresh channel, so the engine
        // never starts below it.
        let server = lrc::Server::builder()
            .welcome(state.welcome.read().clone())
            .initial_id(state.last_id.load(Ordering::SeqCst).max(1))
            .channel_uri(uri)
            .secret(self.lrcd_secret.clone())
            .resolver(Arc::new(EngineResolver {
                resolver: self.resolver.clone(),
            }))
            .build();
        let inits = server.start().map_err(|e| {
            tracing::error!(%uri, error = %e, "engine failed to start");
            RuntimeError::NotFound
        })?;

        // Child of the channel lifecycle: cancelling the channel (delete or
        // idle stop) also stops the init handler.
        let cancel = state.lifecycle_token().child_token();
        tokio::spawn(init_handler(
            self.manager.clone(),
            self.resolver.clone(),
            uri.to_string(),
            inits,
            cancel.clone(),
        ));

        *engine = Some(Engine {
            server: server.clone(),
            cancel,
        });
        tracing::debug!(%uri, "channel engine started");
        Ok(server)
    }

    /// Stop every engine nobody is connected to. Runs on the sweep timer.
    pub async fn sweep_idle(&self) {
        let states: Vec<Arc<ChannelState>> = self.channels.lock().values().cloned().collect();
        for state in states {
            let mut engine = state.engine.lock().await;
            let Some(running) = engine.as_ref() else {
                continue;
            };
            if running.server.connected() > 0 {
                continue;
            }
            let last_id = running.server.stop();
            state.last_id.store(last_id, Ordering::SeqCst);
            // Cancel the whole channel lifecycle (init handler and
            // subscriber writers), then arm a fresh token for the next
            // start.
            let token = std::mem::replace(&mut *state.lifecycle.write(), CancellationToken::new());
            token.cancel();
            *engine = None;
            tracing::debug!(uri = %state.uri, last_id, "idle channel stopped");
        }
    }

    /// Long-running sweep loop; exits on shutdown.
    pub async fn run_idle_sweeper(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(Duration::from_secs(IDLE_SWEEP_INTERVAL_SECS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it.
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => self.sweep_idle().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Open a lexicon stream subscription. Returns the queue, the channel's
    /// lifecycle token, and the subscriber id for deregistration.
    pub fn open_lex_stream(
        &self,
        uri: &str,
    ) -> Result<(u64, mpsc::Receiver<LexStreamEvent>, CancellationToken), RuntimeError> {
        let state = self.state(uri).ok_or(RuntimeError::NotFound)?;
        let id = self.subscriber_seq.fetch_add(1, Ordering::Relaxed);
        let rx = state.register_subscriber(id);
        Ok((id, rx, state.lifecycle_token()))
    }

    pub fn close_lex_stream(&self, uri: &str, id: u64) {
        if let Some(state) = self.state(uri) {
            state.deregister_subscriber(id);
        }
    }
}

/// Consume the engine's init events, issuing a signet per line. Errors are
/// logged and never fatal; a closed stream is a soft stop.
async fn init_handler(
    manager: Arc<RecordManager>,
    resolver: IdentityResolver,
    uri: String,
    mut inits: mpsc::Receiver<lrc::InitEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            init = inits.recv() => {
                let Some(init) = init else { break };
                let resolved = match &init.external_id {
                    Some(external_id) => resolver
                        .full_resolve_handle(external_id)
                        .await
                        .ok()
                        .map(|_| external_id.clone()),
                    None => None,
                };
                if let Err(e) = manager.post_signet(resolved.as_deref(), &init, &uri).await {
                    tracing::warn!(%uri, id = init.id, error = %e, "signet issuance failed");
                }
            }
        }
    }
    tracing::debug!(%uri, "init handler exited");
}

#[async_trait]
impl Broadcaster for ChannelRuntime {
    async fn broadcast_signet(&self, channel_uri: &str, signet: &Signet) {
        let Some(state) = self.state(channel_uri) else {
            return;
        };
        let issuer_handle = match self.store.resolve_did(&signet.issuer_did).await {
            Ok(Some(handle)) => handle,
            _ => {
                tracing::debug!(issuer = %signet.issuer_did, "issuer handle unknown, dropping signet view");
                return;
            }
        };
        state.fan_out(LexStreamEvent::Signet(SignetView {
            lex_type: SIGNET_VIEW_TYPE,
            uri: signet.uri.clone(),
            issuer_handle,
            channel_uri: signet.channel_uri.clone(),
            lrc_id: signet.message_id,
            author_handle: signet.author_handle.clone(),
            started_at: signet.started_at,
        }));
    }

    async fn broadcast_message(&self, channel_uri: &str, message: &Message) {
        let Some(state) = self.state(channel_uri) else {
            return;
        };
        let author = match self.store.get_profile_view(&message.did).await {
            Ok(Some(view)) => view,
            _ => {
                tracing::debug!(did = %message.did, "author unknown, dropping message view");
                return;
            }
        };
        state.fan_out(LexStreamEvent::Message(MessageView {
            lex_type: MESSAGE_VIEW_TYPE,
            uri: message.uri.clone(),
            author,
            body: message.body.clone(),
            nick: message.nick.clone(),
            color: message.color,
            signet_uri: message.signet_uri.clone(),
            posted_at: message.posted_at,
        }));
    }

    async fn broadcast_image(&self, channel_uri: &str, image: &Image) {
        let Some(state) = self.state(channel_uri) else {
            return;
        };
        let author = match self.store.get_profile_view(&image.did).await {
            Ok(Some(view)) => view,
            _ => {
                tracing::debug!(did = %image.did, "author unknown, dropping media view");
                return;
            }
        };
        let image_view = image.blob_cid.is_some().then(|| ImageView {
            alt: image.alt.clone(),
            src: None,
            aspect_ratio: match (image.width, image.height) {
                (Some(width), Some(height)) => {
                    Some(crate::domain::records::AspectRatio { width, height })
                }
                _ => None,
            },
        });
        state.fan_out(LexStreamEvent::Media(MediaView {
            lex_type: MEDIA_VIEW_TYPE,
            uri: image.uri.clone(),
            author,
            image_view,
            nick: image.nick.clone(),
            color: image.color,
            signet_uri: image.signet_uri.clone(),
            posted_at: image.posted_at,
        }));
    }

    async fn add_channel(&self, channel: &Channel) {
        let hosted = channel.host == self.identity.handle;
        let welcome = welcome_for(channel.topic.as_deref());
        self.channels
            .lock()
            .entry(channel.uri.clone())
            .or_insert_with(|| ChannelState::new(channel.uri.clone(), welcome, hosted, 0));
        tracing::debug!(uri = %channel.uri, hosted, "channel added");
    }

    async fn update_channel(&self, channel: &Channel) {
        let Some(state) = self.state(&channel.uri) else {
            self.add_channel(channel).await;
            return;
        };
        *state.welcome.write() = welcome_for(channel.topic.as_deref());
        *state.hosted.write() = channel.host == self.identity.handle;
    }

    /// Remove the channel and cancel everything attached to it.
    async fn delete_channel(&self, uri: &str) {
        let Some(state) = self.channels.lock().remove(uri) else {
            return;
        };
        state.lifecycle_token().cancel();
        let mut engine = state.engine.lock().await;
        if let Some(running) = engine.take() {
            running.cancel.cancel();
            running.server.stop();
        }
        tracing::debug!(%uri, "channel deleted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn signet_event(id: u32) -> LexStreamEvent {
        LexStreamEvent::Signet(SignetView {
            lex_type: SIGNET_VIEW_TYPE,
            uri: format!("at://did:plc:bk/org.xcvr.lrc.signet/rk{id}"),
            issuer_handle: "transmitter.test".into(),
            channel_uri: "at://did:plc:bk/org.xcvr.feed.channel/rk1".into(),
            lrc_id: id,
            author_handle: "alice.test".into(),
            started_at: Utc::now(),
        })
    }

    #[test]
    fn welcome_prefers_topic_over_default() {
        assert_eq!(welcome_for(Some("the topic")), "the topic");
        assert_eq!(welcome_for(Some("")), DEFAULT_WELCOME);
        assert_eq!(welcome_for(None), DEFAULT_WELCOME);
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_broadcast_order() {
        let state = ChannelState::new("uri".into(), "welcome".into(), true, 0);
        let mut rx = state.register_subscriber(1);
        state.fan_out(signet_event(1));
        state.fan_out(signet_event(2));
        for expected in [1u32, 2] {
            match rx.recv().await.unwrap() {
                LexStreamEvent::Signet(view) => assert_eq!(view.lrc_id, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn full_queue_evicts_the_slow_subscriber_only() {
        let state = ChannelState::new("uri".into(), "welcome".into(), true, 0);
        let slow_rx = state.register_subscriber(1);
        let mut fast_rx = state.register_subscriber(2);

        // One past capacity: the slow queue fills and its owner is evicted.
        for id in 0..=SUBSCRIBER_QUEUE_CAPACITY as u32 {
            state.fan_out(signet_event(id));
            // Keep the fast subscriber's queue drained.
            let _ = fast_rx.try_recv();
        }
        assert_eq!(state.subscribers.lock().len(), 1);
        assert_eq!(state.subscribers.lock()[0].id, 2);
        drop(slow_rx);
    }

    #[tokio::test]
    async fn deregistered_subscribers_stop_receiving() {
        let state = ChannelState::new("uri".into(), "welcome".into(), true, 0);
        let mut rx = state.register_subscriber(7);
        state.deregister_subscriber(7);
        state.fan_out(signet_event(1));
        assert!(rx.recv().await.is_none());
    }
}
