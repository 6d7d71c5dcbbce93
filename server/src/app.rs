//! Core application
//!
//! Wires the whole backend together: config, store, the backend's own repo
//! client, the OAuth service, the record manager and channel runtime (two
//! phases, see below), the firehose consumer, and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::api::session::CookieCodec;
use crate::api::{ApiServer, ApiState};
use crate::atproto::{OAuthService, PasswordClient, SessionMap};
use crate::core::config::{AppConfig, BackendIdentity};
use crate::core::constants::{
    APP_NAME_LOWER, ENV_LOG, HTTP_TIMEOUT_SECS, SESSION_CLEANUP_INTERVAL_SECS,
};
use crate::core::shutdown::ShutdownService;
use crate::data::Store;
use crate::identity::IdentityResolver;
use crate::ingest::FirehoseConsumer;
use crate::records::RecordManager;
use crate::runtime::ChannelRuntime;

pub struct App {
    pub shutdown: ShutdownService,
    state: ApiState,
    consumer: Option<FirehoseConsumer>,
}

impl App {
    /// Load the environment, build everything, and run until interrupted.
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        let config = AppConfig::load()?;
        let app = Self::init(config).await?;
        app.start().await
    }

    fn init_logging() {
        let filter = EnvFilter::try_from_env(ENV_LOG)
            .unwrap_or_else(|_| EnvFilter::new(format!("{APP_NAME_LOWER}=info,warn")));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    async fn init(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")?;

        let store = Store::init(&config.postgres)
            .await
            .context("failed to initialize postgres")?;
        let resolver = IdentityResolver::new(store.clone());

        // The backend's identity is fixed at startup; failing to resolve it
        // is fatal.
        let did = resolver
            .full_resolve_handle(&config.identity)
            .await
            .context("could not resolve my own identity")?;
        let pds_url = resolver
            .pds_for_did(&did)
            .await
            .context("could not find my own repo host")?;
        let identity = BackendIdentity {
            did: did.clone(),
            handle: config.identity.clone(),
            pds_url: pds_url.clone(),
        };
        tracing::info!(%did, %pds_url, "resolved backend identity");

        let my_client = Arc::new(PasswordClient::new(
            http.clone(),
            pds_url,
            did,
            config.identity.clone(),
            config.app_password.clone(),
        ));
        my_client
            .create_session()
            .await
            .context("could not create my repo session")?;

        let oauth = Arc::new(
            OAuthService::new(http.clone(), store.clone(), resolver.clone(), &config)
                .context("failed to build oauth service")?,
        );
        let sessions = Arc::new(SessionMap::new(
            http.clone(),
            store.clone(),
            oauth.credentials(),
        ));

        // Two-phase construction: the manager starts without a broadcaster,
        // the runtime closes the cycle.
        let manager = Arc::new(RecordManager::new(
            store.clone(),
            my_client.clone(),
            oauth.clone(),
            identity.clone(),
            config.lrcd_secret.clone(),
        ));
        let runtime = ChannelRuntime::new(
            store.clone(),
            identity.clone(),
            config.lrcd_secret.clone(),
            resolver.clone(),
            manager.clone(),
        );
        manager.set_broadcaster(runtime.clone());
        runtime
            .warm_from_store()
            .await
            .context("failed to warm channel runtime")?;

        let consumer = FirehoseConsumer::new(
            config.jetstream_url.clone(),
            store.clone(),
            resolver.clone(),
            manager.clone(),
        );

        let state = ApiState {
            cookies: CookieCodec::new(&config.session_key),
            config: config.clone(),
            identity,
            store,
            resolver,
            manager,
            runtime,
            oauth,
            sessions,
            my_client,
            http,
        };

        Ok(Self {
            shutdown: ShutdownService::new(),
            state,
            consumer: Some(consumer),
        })
    }

    async fn start(mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();

        // Firehose consumer.
        let consumer = self.consumer.take().expect("consumer built in init");
        let consumer_rx = shutdown.subscribe();
        shutdown
            .register(tokio::spawn(consumer.run(consumer_rx)))
            .await;

        // Idle channel sweeper.
        let sweeper_rx = shutdown.subscribe();
        shutdown
            .register(tokio::spawn(
                self.state.runtime.clone().run_idle_sweeper(sweeper_rx),
            ))
            .await;

        // Session map cleanup.
        let sessions = self.state.sessions.clone();
        let mut cleanup_rx = shutdown.subscribe();
        shutdown
            .register(tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(
                    SESSION_CLEANUP_INTERVAL_SECS,
                ));
                tick.tick().await;
                loop {
                    tokio::select! {
                        _ = tick.tick() => sessions.cleanup().await,
                        _ = cleanup_rx.changed() => {
                            if *cleanup_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }))
            .await;

        let server = ApiServer::new(self.state, shutdown.clone());
        let serve = tokio::spawn(server.start());

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        tracing::info!("shutting down");
        shutdown.shutdown().await;
        serve.await.context("server task panicked")?
    }
}
