//! API server initialization

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::middleware::{self, AllowedOrigins};
use super::routes::{actor, feed, lrc, metadata, oauth, xcvr};
use super::ApiState;
use crate::core::ShutdownService;

pub struct ApiServer {
    state: ApiState,
    shutdown: ShutdownService,
}

impl ApiServer {
    pub fn new(state: ApiState, shutdown: ShutdownService) -> Self {
        Self { state, shutdown }
    }

    fn router(state: ApiState) -> Router {
        let paths = state.config.metadata.clone();
        let allowed_origins = AllowedOrigins::new(&state.config.public_origin());

        Router::new()
            // lexicon queries
            .route("/xrpc/org.xcvr.feed.getChannels", get(feed::get_channels))
            .route("/xrpc/org.xcvr.feed.getChannel", get(feed::get_channel))
            .route("/xrpc/org.xcvr.lrc.getMessages", get(lrc::get_messages))
            .route(
                "/xrpc/org.xcvr.lrc.subscribeLexStream",
                get(lrc::subscribe_lex_stream),
            )
            .route("/xrpc/org.xcvr.lrc.getImage", get(lrc::get_image))
            .route(
                "/xrpc/org.xcvr.actor.resolveChannel",
                get(actor::resolve_channel),
            )
            .route(
                "/xrpc/org.xcvr.actor.getProfileView",
                get(actor::get_profile_view),
            )
            .route("/xrpc/org.xcvr.actor.getLastSeen", get(actor::get_last_seen))
            // live chat
            .route(
                "/lrc/{did}/{rkey}/ws",
                get(lrc::chat_ws).delete(lrc::delete_channel),
            )
            .route("/lrc/channel", post(xcvr::post_channel))
            .route("/lrc/message", post(xcvr::post_message))
            .route("/lrc/image", post(xcvr::post_image))
            .route("/lrc/media", post(xcvr::post_media))
            // actor writes
            .route("/xcvr/profile", post(xcvr::post_profile))
            .route("/xcvr/beep", post(xcvr::beep))
            // oauth
            .route("/oauth/login", post(oauth::login))
            .route(&paths.oauth_callback, get(oauth::callback))
            .route("/oauth/logout", post(oauth::logout))
            .route("/oauth/whoami", get(oauth::whoami))
            .route("/oauth/ban", post(oauth::post_ban).get(oauth::get_ban))
            // public metadata
            .route(&paths.client_metadata, get(metadata::client_metadata))
            .route(&paths.jwks, get(metadata::jwks))
            .route(&paths.tos, get(metadata::tos))
            .route(&paths.policy, get(metadata::policy))
            .layer(middleware::cors(&allowed_origins))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve until shutdown.
    pub async fn start(self) -> Result<()> {
        let host = self.state.config.server.host.clone();
        let port = self.state.config.server.port;
        let addr = SocketAddr::new(host.parse().context("invalid bind host")?, port);

        let router = Self::router(self.state);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        tracing::info!(%addr, "listening");

        let mut shutdown_rx = self.shutdown.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
            .context("server error")?;
        Ok(())
    }
}
