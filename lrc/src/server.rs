//! Channel session server
//!
//! One [`Server`] instance per live channel. The host starts it lazily,
//! hands every accepted websocket to [`Server::accept`], and consumes the
//! [`InitEvent`] stream returned by [`Server::start`]. Stopping returns the
//! last allocated message id so the host can carry it across restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::nonce::generate_nonce;
use crate::proto::{Frame, InitEvent};

/// Per-client relay queue capacity. A client that falls this far behind the
/// channel is disconnected rather than blocking the relay.
const CLIENT_QUEUE_CAPACITY: usize = 64;

/// Capacity of the init event stream handed to the host.
const INIT_QUEUE_CAPACITY: usize = 32;

/// Turns a declared external id (a handle) into a DID, if known.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, external_id: &str) -> Option<String>;
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,
    #[error("server is not running")]
    NotRunning,
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    welcome: String,
    initial_id: u32,
    channel_uri: String,
    secret: String,
    resolver: Option<Arc<dyn Resolver>>,
}

impl ServerBuilder {
    /// Greeting relayed to every client on connect.
    pub fn welcome(mut self, welcome: impl Into<String>) -> Self {
        self.welcome = welcome.into();
        self
    }

    /// The last message id already used on this channel. The first line
    /// opened on the new server gets `initial_id + 1`.
    pub fn initial_id(mut self, id: u32) -> Self {
        self.initial_id = id;
        self
    }

    /// Channel uri bound into authorship nonces.
    pub fn channel_uri(mut self, uri: impl Into<String>) -> Self {
        self.channel_uri = uri.into();
        self
    }

    /// Secret for authorship nonces.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Arc<Server> {
        Arc::new(Server {
            welcome: self.welcome,
            channel_uri: self.channel_uri,
            secret: self.secret,
            resolver: self.resolver,
            last_id: AtomicU32::new(self.initial_id),
            client_seq: AtomicU64::new(0),
            clients: Mutex::new(HashMap::new()),
            init_tx: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }
}

/// A live channel session.
pub struct Server {
    welcome: String,
    channel_uri: String,
    secret: String,
    resolver: Option<Arc<dyn Resolver>>,
    last_id: AtomicU32,
    client_seq: AtomicU64,
    clients: Mutex<HashMap<u64, mpsc::Sender<Frame>>>,
    init_tx: Mutex<Option<mpsc::Sender<InitEvent>>>,
    running: AtomicBool,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            welcome: String::new(),
            initial_id: 1,
            channel_uri: String::new(),
            secret: String::new(),
            resolver: None,
        }
    }

    /// Start relaying. Returns the stream of line-open events; dropping the
    /// server (or calling [`Server::stop`]) closes it.
    pub fn start(&self) -> Result<mpsc::Receiver<InitEvent>, ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }
        let (tx, rx) = mpsc::channel(INIT_QUEUE_CAPACITY);
        *self.init_tx.lock() = Some(tx);
        Ok(rx)
    }

    /// Stop relaying and disconnect all clients. Returns the last allocated
    /// message id, to seed the next server on this channel.
    pub fn stop(&self) -> u32 {
        self.running.store(false, Ordering::SeqCst);
        self.init_tx.lock().take();
        self.clients.lock().clear();
        self.last_id.load(Ordering::SeqCst)
    }

    /// Number of currently connected clients.
    pub fn connected(&self) -> usize {
        self.clients.lock().len()
    }

    /// Drive one websocket client until it disconnects or the server stops.
    pub async fn accept(self: Arc<Self>, socket: WebSocket) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let (mut sink, mut stream) = socket.split();
        let (client_id, mut rx) = self.register();

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let Ok(text) = serde_json::to_string(&frame) else {
                    continue;
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        self.send_to(client_id, Frame::Welcome {
            text: self.welcome.clone(),
        });

        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<Frame>(&text) {
                    Ok(frame) => self.process_frame(client_id, frame).await,
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping unparseable frame");
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }

        self.deregister(client_id);
        writer.abort();
    }

    fn register(&self) -> (u64, mpsc::Receiver<Frame>) {
        let id = self.client_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        self.clients.lock().insert(id, tx);
        (id, rx)
    }

    fn deregister(&self, client_id: u64) {
        self.clients.lock().remove(&client_id);
    }

    async fn process_frame(&self, client_id: u64, frame: Frame) {
        match frame {
            Frame::Init {
                id: None,
                external_id,
                nick,
                color,
                ..
            } => {
                let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
                let did = match (&self.resolver, &external_id) {
                    (Some(r), Some(ext)) => r.resolve(ext).await,
                    _ => None,
                };
                let init_tx = self.init_tx.lock().clone();
                if let Some(tx) = init_tx {
                    let event = InitEvent {
                        id,
                        external_id: external_id.clone(),
                    };
                    if tx.send(event).await.is_err() {
                        tracing::debug!(id, "init stream closed; event dropped");
                    }
                }
                self.broadcast(Frame::Init {
                    id: Some(id),
                    external_id,
                    nick,
                    color,
                    did,
                });
                let nonce = generate_nonce(id, &self.channel_uri, &self.secret);
                self.send_to(client_id, Frame::Ack {
                    id,
                    nonce: B64.encode(nonce),
                });
            }
            frame @ (Frame::Body { .. } | Frame::Pub { .. }) => self.broadcast(frame),
            // Clients may not speak with the server's voice.
            Frame::Welcome { .. } | Frame::Ack { .. } | Frame::Init { id: Some(_), .. } => {}
        }
    }

    fn broadcast(&self, frame: Frame) {
        let mut clients = self.clients.lock();
        clients.retain(|_, tx| tx.try_send(frame.clone()).is_ok());
    }

    fn send_to(&self, client_id: u64, frame: Frame) {
        let mut clients = self.clients.lock();
        if let Some(tx) = clients.get(&client_id)
            && tx.try_send(frame).is_err()
        {
            clients.remove(&client_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResolver;

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn resolve(&self, external_id: &str) -> Option<String> {
            (external_id == "alice.test").then(|| "did:plc:alice".to_string())
        }
    }

    fn test_server() -> Arc<Server> {
        Server::builder()
            .welcome("general")
            .channel_uri("at://did:plc:bk/org.xcvr.feed.channel/rk1")
            .secret("s3cret")
            .resolver(Arc::new(StaticResolver))
            .build()
    }

    #[tokio::test]
    async fn ids_are_monotonic_from_initial() {
        let server = test_server();
        let mut inits = server.start().unwrap();
        let (client, _rx) = server.register();

        for _ in 0..3 {
            server
                .process_frame(client, Frame::Init {
                    id: None,
                    external_id: Some("alice.test".into()),
                    nick: None,
                    color: None,
                    did: None,
                })
                .await;
        }

        assert_eq!(inits.recv().await.unwrap().id, 2);
        assert_eq!(inits.recv().await.unwrap().id, 3);
        assert_eq!(inits.recv().await.unwrap().id, 4);
        assert_eq!(server.stop(), 4);
    }

    #[tokio::test]
    async fn stop_start_carries_last_id() {
        let server = test_server();
        let _inits = server.start().unwrap();
        let (client, _rx) = server.register();
        server
            .process_frame(client, Frame::Init {
                id: None,
                external_id: None,
                nick: None,
                color: None,
                did: None,
            })
            .await;
        let last = server.stop();
        assert_eq!(last, 2);

        let next = Server::builder().initial_id(last).build();
        let mut inits = next.start().unwrap();
        let (client, _rx) = next.register();
        next.process_frame(client, Frame::Init {
            id: None,
            external_id: None,
            nick: None,
            color: None,
            did: None,
        })
        .await;
        assert_eq!(inits.recv().await.unwrap().id, 3);
    }

    #[tokio::test]
    async fn author_gets_ack_with_nonce_and_peers_see_init() {
        let server = test_server();
        let _inits = server.start().unwrap();
        let (author, mut author_rx) = server.register();
        let (_peer, mut peer_rx) = server.register();
        assert_eq!(server.connected(), 2);

        server
            .process_frame(author, Frame::Init {
                id: None,
                external_id: Some("alice.test".into()),
                nick: Some("al".into()),
                color: None,
                did: None,
            })
            .await;

        let relayed = peer_rx.recv().await.unwrap();
        match relayed {
            Frame::Init {
                id: Some(2),
                did: Some(did),
                ..
            } => assert_eq!(did, "did:plc:alice"),
            other => panic!("unexpected frame {other:?}"),
        }

        // Author sees the relayed init first, then its private ack.
        let _ = author_rx.recv().await.unwrap();
        match author_rx.recv().await.unwrap() {
            Frame::Ack { id: 2, nonce } => {
                let expect = generate_nonce(2, "at://did:plc:bk/org.xcvr.feed.channel/rk1", "s3cret");
                assert_eq!(B64.decode(nonce).unwrap(), expect);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn double_start_is_an_error() {
        let server = test_server();
        let _inits = server.start().unwrap();
        assert!(matches!(server.start(), Err(ServerError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn slow_client_is_evicted_from_relay() {
        let server = test_server();
        let _inits = server.start().unwrap();
        let (_slow, slow_rx) = server.register();
        // Fill the slow client's queue without draining it.
        for i in 0..=CLIENT_QUEUE_CAPACITY as u32 {
            server.broadcast(Frame::Pub { id: i });
        }
        assert_eq!(server.connected(), 0);
        drop(slow_rx);
    }
}
