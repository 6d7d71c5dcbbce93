//! Atproto repo clients and OAuth plumbing
//!
//! Two client flavors write to repositories: [`PasswordClient`] for the
//! backend's own identity (app-password session with refresh-and-retry) and
//! [`OAuthClient`] per end-user session (DPoP-bound tokens with nonce
//! rotation and proactive refresh). [`OAuthService`] runs the PKCE/PAR
//! flow; [`SessionMap`] keeps resumed clients warm.

pub mod dpop;
pub mod error;
pub mod metadata;
pub mod oauth_client;
pub mod password;
pub mod service;
pub mod session_map;
pub mod xrpc;

pub use error::XrpcError;
pub use oauth_client::{ClientCredentials, OAuthClient};
pub use password::PasswordClient;
pub use service::{AuthFlowError, FlowStart, OAuthService, SessionData};
pub use session_map::SessionMap;
