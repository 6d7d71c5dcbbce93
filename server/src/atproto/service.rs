//! OAuth session service
//!
//! Owns the client application key and the PKCE/PAR dance: `start_auth_flow`
//! pushes an authorization request and parks its state in the store,
//! `process_callback` exchanges the code for tokens and persists a session,
//! `resume_session` rebuilds a live client from a stored row. Also serves
//! the public client metadata and JWKS documents derived from the same key.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::atproto::dpop::{self, SigningKey};
use crate::atproto::error::XrpcError;
use crate::atproto::oauth_client::{ClientCredentials, OAuthClient, TokenResponse};
use crate::atproto::xrpc;
use crate::core::config::AppConfig;
use crate::core::constants::OAUTH_SCOPES;
use crate::data::Store;
use crate::data::error::StoreError;
use crate::data::types::{OAuthRequestRow, OAuthSessionRow};
use crate::identity::{IdentityError, IdentityResolver};

#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error("unknown or replayed state")]
    UnknownState,
    #[error("authorization server mismatch")]
    IssuerMismatch,
    #[error("granted scopes do not match the configured set")]
    ScopeMismatch,
    #[error("token subject does not match the requesting identity")]
    SubjectMismatch,
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Xrpc(#[from] XrpcError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the callback yields: enough to mint a cookie and resume later.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub did: String,
    pub session_id: String,
    pub scopes: String,
}

/// What `start_auth_flow` yields: where to send the user, plus the state
/// and identity to bind into the flow cookie.
#[derive(Debug, Clone)]
pub struct FlowStart {
    pub redirect_url: String,
    pub state: String,
    pub did: String,
}

#[derive(Debug, Deserialize)]
struct ProtectedResourceMetadata {
    authorization_servers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AuthServerMetadata {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    pushed_authorization_request_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ParResponse {
    request_uri: String,
}

pub struct OAuthService {
    http: reqwest::Client,
    store: Store,
    resolver: IdentityResolver,
    credentials: ClientCredentials,
    callback_url: String,
}

impl OAuthService {
    pub fn new(
        http: reqwest::Client,
        store: Store,
        resolver: IdentityResolver,
        config: &AppConfig,
    ) -> Result<Self, XrpcError> {
        let key = SigningKey::from_multibase(&config.client_secret_key)?;
        Ok(Self {
            http,
            store,
            resolver,
            credentials: ClientCredentials {
                client_id: config.client_id(),
                key: Arc::new(key),
                key_id: config.client_secret_key_id.clone(),
            },
            callback_url: config.oauth_callback_url(),
        })
    }

    pub fn credentials(&self) -> ClientCredentials {
        self.credentials.clone()
    }

    fn scope_string() -> String {
        OAUTH_SCOPES.join(" ")
    }

    /// Begin the flow for a handle or DID. Returns the redirect target and
    /// the state to bind into the flow cookie; the request itself is parked
    /// in the store until the callback.
    pub async fn start_auth_flow(&self, identifier: &str) -> Result<FlowStart, AuthFlowError> {
        let did = if identifier.starts_with("did:") {
            identifier.to_string()
        } else {
            self.resolver.full_resolve_handle(identifier).await?
        };
        let pds_url = self.resolver.pds_for_did(&did).await?;
        let authserver = self.discover_authserver(&pds_url).await?;

        let state = dpop::random_token(24);
        let (verifier, challenge) = dpop::pkce_pair();
        let dpop_key = SigningKey::generate();

        let assertion = dpop::client_assertion(
            &self.credentials.key,
            &self.credentials.key_id,
            &self.credentials.client_id,
            &authserver.issuer,
        )?;
        let scope = Self::scope_string();
        let form = [
            ("response_type", "code".to_string()),
            ("client_id", self.credentials.client_id.clone()),
            ("redirect_uri", self.callback_url.clone()),
            ("state", state.clone()),
            ("scope", scope),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256".to_string()),
            ("login_hint", identifier.to_string()),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
            ),
            ("client_assertion", assertion),
        ];

        let (par, authserver_nonce) = self
            .par_request(
                &authserver.pushed_authorization_request_endpoint,
                &form,
                &dpop_key,
            )
            .await?;

        self.store
            .save_auth_request(&OAuthRequestRow {
                state: state.clone(),
                did: did.clone(),
                pds_url,
                authserver_iss: authserver.issuer,
                token_endpoint: authserver.token_endpoint,
                pkce_verifier: verifier,
                dpop_authserver_nonce: authserver_nonce.unwrap_or_default(),
                dpop_private_multibase: dpop_key.multibase().to_string(),
            })
            .await?;

        Ok(FlowStart {
            redirect_url: format!(
                "{}?client_id={}&request_uri={}",
                authserver.authorization_endpoint,
                urlencode(&self.credentials.client_id),
                urlencode(&par.request_uri),
            ),
            state,
            did,
        })
    }

    /// Complete the flow. Consumes the parked request, exchanges the code,
    /// enforces the scope contract, and persists the session.
    pub async fn process_callback(
        &self,
        state: &str,
        code: &str,
        iss: Option<&str>,
    ) -> Result<SessionData, AuthFlowError> {
        let request = self
            .store
            .get_auth_request(state)
            .await?
            .ok_or(AuthFlowError::UnknownState)?;
        if let Some(iss) = iss
            && iss != request.authserver_iss
        {
            return Err(AuthFlowError::IssuerMismatch);
        }

        let dpop_key = SigningKey::from_multibase(&request.dpop_private_multibase)
            .map_err(AuthFlowError::Xrpc)?;
        let assertion = dpop::client_assertion(
            &self.credentials.key,
            &self.credentials.key_id,
            &self.credentials.client_id,
            &request.authserver_iss,
        )?;
        let form = [
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.callback_url.clone()),
            ("client_id", self.credentials.client_id.clone()),
            ("code_verifier", request.pkce_verifier.clone()),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
            ),
            ("client_assertion", assertion),
        ];

        let nonce = (!request.dpop_authserver_nonce.is_empty())
            .then_some(request.dpop_authserver_nonce.clone());
        let (tokens, authserver_nonce) = self
            .dpop_form_request(&request.token_endpoint, &form, &dpop_key, nonce.as_deref())
            .await?;

        if let Some(sub) = &tokens.sub
            && sub != &request.did
        {
            return Err(AuthFlowError::SubjectMismatch);
        }
        let granted = tokens.scope.clone().unwrap_or_default();
        if !scopes_match(&granted, &OAUTH_SCOPES) {
            return Err(AuthFlowError::ScopeMismatch);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let row = OAuthSessionRow {
            did: request.did.clone(),
            session_id: session_id.clone(),
            pds_url: request.pds_url.clone(),
            authserver_iss: request.authserver_iss.clone(),
            token_endpoint: request.token_endpoint.clone(),
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            dpop_private_multibase: request.dpop_private_multibase.clone(),
            dpop_authserver_nonce: authserver_nonce.unwrap_or(request.dpop_authserver_nonce),
            dpop_pds_nonce: String::new(),
            scopes: granted.clone(),
            expires_at: tokens.expires_at(),
        };
        self.store.save_session(&row).await?;
        self.store.delete_auth_request(state).await?;

        Ok(SessionData {
            did: request.did,
            session_id,
            scopes: granted,
        })
    }

    /// Rebuild a live client from a stored session.
    pub async fn resume_session(
        &self,
        did: &str,
        session_id: &str,
    ) -> Result<Option<OAuthClient>, AuthFlowError> {
        let Some(row) = self.store.get_session(did, session_id).await? else {
            return Ok(None);
        };
        Ok(Some(OAuthClient::new(
            self.http.clone(),
            self.store.clone(),
            self.credentials.clone(),
            row,
        )?))
    }

    async fn discover_authserver(&self, pds_url: &str) -> Result<AuthServerMetadata, AuthFlowError> {
        let url = format!(
            "{}/.well-known/oauth-protected-resource",
            pds_url.trim_end_matches('/')
        );
        let response = self.http.get(url).send().await.map_err(XrpcError::from)?;
        if !response.status().is_success() {
            return Err(AuthFlowError::Xrpc(xrpc::error_from_response(response).await));
        }
        let resource: ProtectedResourceMetadata =
            response.json().await.map_err(XrpcError::from)?;
        let issuer = resource
            .authorization_servers
            .first()
            .ok_or(AuthFlowError::IssuerMismatch)?;

        let url = format!(
            "{}/.well-known/oauth-authorization-server",
            issuer.trim_end_matches('/')
        );
        let response = self.http.get(url).send().await.map_err(XrpcError::from)?;
        if !response.status().is_success() {
            return Err(AuthFlowError::Xrpc(xrpc::error_from_response(response).await));
        }
        Ok(response.json().await.map_err(XrpcError::from)?)
    }

    async fn par_request(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
        dpop_key: &SigningKey,
    ) -> Result<(ParResponse, Option<String>), AuthFlowError> {
        let (value, nonce) = self.dpop_form_request_raw(endpoint, form, dpop_key, None).await?;
        let par = serde_json::from_value(value)
            .map_err(|e| XrpcError::Key(format!("malformed PAR response: {e}")))?;
        Ok((par, nonce))
    }

    async fn dpop_form_request(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
        dpop_key: &SigningKey,
        nonce: Option<&str>,
    ) -> Result<(TokenResponse, Option<String>), AuthFlowError> {
        let (value, nonce) = self.dpop_form_request_raw(endpoint, form, dpop_key, nonce).await?;
        let tokens = serde_json::from_value(value)
            .map_err(|e| XrpcError::Key(format!("malformed token response: {e}")))?;
        Ok((tokens, nonce))
    }

    /// POST a form with a DPoP proof, retrying once on nonce rotation.
    /// Returns the JSON body and the final authserver nonce.
    async fn dpop_form_request_raw(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
        dpop_key: &SigningKey,
        nonce: Option<&str>,
    ) -> Result<(serde_json::Value, Option<String>), AuthFlowError> {
        match self.form_once(endpoint, form, dpop_key, nonce).await {
            Err(XrpcError::UseDpopNonce { nonce: Some(rotated) }) => {
                let value = self
                    .form_once(endpoint, form, dpop_key, Some(&rotated))
                    .await?;
                Ok((value, Some(rotated)))
            }
            Err(e) => Err(e.into()),
            Ok(value) => Ok((value, nonce.map(str::to_string))),
        }
    }

    async fn form_once(
        &self,
        endpoint: &str,
        form: &[(&str, String)],
        dpop_key: &SigningKey,
        nonce: Option<&str>,
    ) -> Result<serde_json::Value, XrpcError> {
        let proof = dpop::dpop_proof(dpop_key, "POST", endpoint, nonce, None, None)?;
        let response = self
            .http
            .post(endpoint)
            .header("DPoP", proof)
            .form(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(xrpc::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }
}

/// Granted scopes must equal the configured set, order-insensitively.
fn scopes_match(granted: &str, wanted: &[&str]) -> bool {
    let mut granted: Vec<&str> = granted.split_whitespace().collect();
    let mut wanted: Vec<&str> = wanted.to_vec();
    granted.sort_unstable();
    wanted.sort_unstable();
    granted == wanted
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_sets_compare_order_insensitively() {
        assert!(scopes_match("transition:generic atproto", &OAUTH_SCOPES));
        assert!(scopes_match("atproto transition:generic", &OAUTH_SCOPES));
        assert!(!scopes_match("atproto", &OAUTH_SCOPES));
        assert!(!scopes_match("atproto transition:generic extra", &OAUTH_SCOPES));
        assert!(!scopes_match("", &OAUTH_SCOPES));
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(
            urlencode("https://a.test/m.json?x=1"),
            "https%3A%2F%2Fa.test%2Fm.json%3Fx%3D1"
        );
    }
}
