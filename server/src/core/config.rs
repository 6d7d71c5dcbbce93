//! Application configuration
//!
//! All configuration arrives through the environment (a `.env` file is
//! loaded in `main`). Missing required values fail startup; the backend
//! cannot limp along without its identity or its database.

use anyhow::{Context, Result, bail};

use super::constants::{
    DEFAULT_HOST, DEFAULT_JETSTREAM, DEFAULT_PORT, ENV_ADMIN_DID, ENV_APP_PASSWORD,
    ENV_BAN_ENDPOINT, ENV_CLIENT_NAME, ENV_CLIENT_SECRET_KEY, ENV_CLIENT_SECRET_KEY_ID, ENV_HOST,
    ENV_IDENTITY, ENV_JETSTREAM, ENV_JWKS_PATH, ENV_LOGO_PATH, ENV_LRCD_SECRET, ENV_METADATA_PATH,
    ENV_OAUTH_CALLBACK_PATH, ENV_POLICY_PATH, ENV_PORT, ENV_POSTGRES_DB, ENV_POSTGRES_HOST,
    ENV_POSTGRES_PASSWORD, ENV_POSTGRES_PORT, ENV_POSTGRES_USER, ENV_SESSION_KEY, ENV_TOS_PATH,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
}

/// Paths the OAuth client metadata is served under; all must begin with `/`.
#[derive(Debug, Clone)]
pub struct MetadataPaths {
    pub client_metadata: String,
    pub jwks: String,
    pub oauth_callback: String,
    pub tos: String,
    pub policy: String,
    pub logo: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    /// Firehose websocket endpoint.
    pub jetstream_url: String,
    /// The backend's own handle; its DID is resolved at startup.
    pub identity: String,
    /// App password for the backend's own repo.
    pub app_password: String,
    /// Multibase-encoded OAuth client private key.
    pub client_secret_key: String,
    pub client_secret_key_id: String,
    /// Display name in the OAuth client metadata.
    pub client_name: String,
    /// HMAC key for session cookies.
    pub session_key: String,
    /// HMAC secret for LRC authorship nonces.
    pub lrcd_secret: String,
    pub admin_did: Option<String>,
    /// External moderation endpoint notified on ban.
    pub ban_endpoint: Option<String>,
    pub metadata: MetadataPaths,
}

fn required(name: &'static str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn path_var(name: &'static str, default: &str) -> Result<String> {
    let value = optional(name).unwrap_or_else(|| default.to_string());
    if !value.starts_with('/') {
        bail!("{name} must be an absolute path, got {value:?}");
    }
    Ok(value)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let host = optional(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match optional(ENV_PORT) {
            Some(p) => p
                .parse::<u16>()
                .with_context(|| format!("invalid {ENV_PORT}: {p:?}"))?,
            None => DEFAULT_PORT,
        };

        let pg_user = required(ENV_POSTGRES_USER)?;
        let pg_password = required(ENV_POSTGRES_PASSWORD)?;
        let pg_db = required(ENV_POSTGRES_DB)?;
        let pg_port = optional(ENV_POSTGRES_PORT).unwrap_or_else(|| "5432".to_string());
        let pg_host = optional(ENV_POSTGRES_HOST).unwrap_or_else(|| "localhost".to_string());
        let postgres = PostgresConfig {
            url: format!("postgres://{pg_user}:{pg_password}@{pg_host}:{pg_port}/{pg_db}"),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            postgres,
            jetstream_url: optional(ENV_JETSTREAM).unwrap_or_else(|| DEFAULT_JETSTREAM.to_string()),
            identity: required(ENV_IDENTITY)?,
            app_password: required(ENV_APP_PASSWORD)?,
            client_secret_key: required(ENV_CLIENT_SECRET_KEY)?,
            client_secret_key_id: optional(ENV_CLIENT_SECRET_KEY_ID)
                .unwrap_or_else(|| "transmitter-client-key".to_string()),
            client_name: optional(ENV_CLIENT_NAME).unwrap_or_else(|| "transmitter".to_string()),
            session_key: required(ENV_SESSION_KEY)?,
            lrcd_secret: required(ENV_LRCD_SECRET)?,
            admin_did: optional(ENV_ADMIN_DID),
            ban_endpoint: optional(ENV_BAN_ENDPOINT),
            metadata: MetadataPaths {
                client_metadata: path_var(ENV_METADATA_PATH, "/client-metadata.json")?,
                jwks: path_var(ENV_JWKS_PATH, "/.well-known/jwks.json")?,
                oauth_callback: path_var(ENV_OAUTH_CALLBACK_PATH, "/oauth/callback")?,
                tos: path_var(ENV_TOS_PATH, "/tos")?,
                policy: path_var(ENV_POLICY_PATH, "/policy")?,
                logo: path_var(ENV_LOGO_PATH, "/logo.png")?,
            },
        })
    }

    /// Origin of the backend as seen by the network, e.g. `https://handle`.
    pub fn public_origin(&self) -> String {
        format!("https://{}", self.identity)
    }

    /// The OAuth client id: the public metadata URL.
    pub fn client_id(&self) -> String {
        format!("{}{}", self.public_origin(), self.metadata.client_metadata)
    }

    /// The OAuth redirect URL.
    pub fn oauth_callback_url(&self) -> String {
        format!("{}{}", self.public_origin(), self.metadata.oauth_callback)
    }
}

/// The backend's resolved network identity, fixed at startup.
#[derive(Debug, Clone)]
pub struct BackendIdentity {
    pub did: String,
    pub handle: String,
    /// The backend's own repo host.
    pub pds_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_var_rejects_relative_paths() {
        // SAFETY: tests in this module are the only writers of this variable.
        unsafe { std::env::set_var("MY_TOS_PATH", "tos.html") };
        assert!(path_var(ENV_TOS_PATH, "/tos").is_err());
        unsafe { std::env::remove_var("MY_TOS_PATH") };
        assert_eq!(path_var(ENV_TOS_PATH, "/tos").unwrap(), "/tos");
    }
}
