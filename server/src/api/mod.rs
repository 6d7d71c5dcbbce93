//! HTTP boundary
//!
//! Axum router, CORS glue, the signed session cookie, and the route
//! handlers. Handlers resolve the caller's session explicitly through the
//! [`session`] extractors and receive it as an argument; anonymous routes
//! take the nullable form.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod session;

use std::sync::Arc;

use crate::atproto::{OAuthService, PasswordClient, SessionMap};
use crate::core::config::{AppConfig, BackendIdentity};
use crate::data::Store;
use crate::identity::IdentityResolver;
use crate::records::RecordManager;
use crate::runtime::ChannelRuntime;
use session::CookieCodec;

pub use error::ApiError;
pub use server::ApiServer;

/// Everything the handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub identity: BackendIdentity,
    pub store: Store,
    pub resolver: IdentityResolver,
    pub manager: Arc<RecordManager>,
    pub runtime: Arc<ChannelRuntime>,
    pub oauth: Arc<OAuthService>,
    pub sessions: Arc<SessionMap>,
    pub my_client: Arc<PasswordClient>,
    pub cookies: CookieCodec,
    pub http: reqwest::Client,
}
