//! OAuth client metadata and JWKS documents

use serde::Serialize;

use crate::atproto::dpop::SigningKey;
use crate::core::config::AppConfig;
use crate::core::constants::OAUTH_SCOPES;

#[derive(Debug, Clone, Serialize)]
pub struct ClientMetadata {
    pub client_id: String,
    pub client_name: String,
    pub client_uri: String,
    pub logo_uri: String,
    pub tos_uri: String,
    pub policy_uri: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub application_type: String,
    pub dpop_bound_access_tokens: bool,
    pub jwks_uri: String,
    pub scope: String,
    pub token_endpoint_auth_method: String,
    pub token_endpoint_auth_signing_alg: String,
}

/// The public client metadata document advertised at the configured path.
pub fn client_metadata(config: &AppConfig) -> ClientMetadata {
    let origin = config.public_origin();
    ClientMetadata {
        client_id: config.client_id(),
        client_name: config.client_name.clone(),
        client_uri: origin.clone(),
        logo_uri: format!("{origin}{}", config.metadata.logo),
        tos_uri: format!("{origin}{}", config.metadata.tos),
        policy_uri: format!("{origin}{}", config.metadata.policy),
        redirect_uris: vec![config.oauth_callback_url()],
        grant_types: vec!["authorization_code".into(), "refresh_token".into()],
        response_types: vec!["code".into()],
        application_type: "web".into(),
        dpop_bound_access_tokens: true,
        jwks_uri: format!("{origin}{}", config.metadata.jwks),
        scope: OAUTH_SCOPES.join(" "),
        token_endpoint_auth_method: "private_key_jwt".into(),
        token_endpoint_auth_signing_alg: "ES256".into(),
    }
}

/// The public JWKS for the client key.
pub fn jwks(key: &SigningKey, key_id: &str) -> serde_json::Value {
    serde_json::json!({ "keys": [key.public_jwk(Some(key_id))] })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            server: crate::core::config::ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            postgres: crate::core::config::PostgresConfig { url: String::new() },
            jetstream_url: String::new(),
            identity: "transmitter.test".into(),
            app_password: String::new(),
            client_secret_key: String::new(),
            client_secret_key_id: "key-1".into(),
            client_name: "transmitter".into(),
            session_key: String::new(),
            lrcd_secret: String::new(),
            admin_did: None,
            ban_endpoint: None,
            metadata: crate::core::config::MetadataPaths {
                client_metadata: "/client-metadata.json".into(),
                jwks: "/.well-known/jwks.json".into(),
                oauth_callback: "/oauth/callback".into(),
                tos: "/tos".into(),
                policy: "/policy".into(),
                logo: "/logo.png".into(),
            },
        }
    }

    #[test]
    fn metadata_derives_urls_from_identity() {
        let meta = client_metadata(&test_config());
        assert_eq!(
            meta.client_id,
            "https://transmitter.test/client-metadata.json"
        );
        assert_eq!(meta.redirect_uris, vec![
            "https://transmitter.test/oauth/callback".to_string()
        ]);
        assert_eq!(meta.jwks_uri, "https://transmitter.test/.well-known/jwks.json");
        assert!(meta.dpop_bound_access_tokens);
        assert_eq!(meta.scope, "atproto transition:generic");
    }

    #[test]
    fn jwks_exposes_one_public_key_with_kid() {
        let key = SigningKey::generate();
        let doc = jwks(&key, "key-1");
        assert_eq!(doc["keys"].as_array().unwrap().len(), 1);
        assert_eq!(doc["keys"][0]["kid"], "key-1");
        assert_eq!(doc["keys"][0]["kty"], "EC");
        assert!(doc["keys"][0].get("d").is_none());
    }
}
