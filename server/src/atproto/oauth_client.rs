//! OAuth/DPoP repo client
//!
//! One instance per live OAuth session. Every request carries a DPoP proof
//! bound to the session key and the current server nonce; when the repo
//! host rotates its nonce the new value is written through to the store so
//! any replica resuming this session keeps working. Tokens are refreshed
//! proactively inside the 5-minute window, serialized per session.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::atproto::dpop::{self, SigningKey};
use crate::atproto::error::XrpcError;
use crate::atproto::xrpc::{
    self, CREATE_RECORD, CreateRecordInput, CreateRecordOutput, DELETE_RECORD, DeleteRecordInput,
    GET_RECORD, GetRecordOutput, PUT_RECORD, PutRecordInput, UPLOAD_BLOB, UploadBlobOutput,
};
use crate::core::constants::SESSION_REFRESH_WINDOW_SECS;
use crate::data::Store;
use crate::data::types::OAuthSessionRow;
use crate::domain::records::BlobRef;

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
}

impl TokenResponse {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.expires_in.unwrap_or(3600))
    }
}

/// Identity of the OAuth client application, shared by all sessions.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub key: Arc<SigningKey>,
    pub key_id: String,
}

pub struct OAuthClient {
    http: reqwest::Client,
    store: Store,
    credentials: ClientCredentials,
    dpop_key: SigningKey,
    session: RwLock<OAuthSessionRow>,
    refresh_lock: Mutex<()>,
}

impl OAuthClient {
    pub fn new(
        http: reqwest::Client,
        store: Store,
        credentials: ClientCredentials,
        row: OAuthSessionRow,
    ) -> Result<Self, XrpcError> {
        let dpop_key = SigningKey::from_multibase(&row.dpop_private_multibase)?;
        Ok(Self {
            http,
            store,
            credentials,
            dpop_key,
            session: RwLock::new(row),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn did(&self) -> String {
        self.session.read().did.clone()
    }

    pub fn session_id(&self) -> String {
        self.session.read().session_id.clone()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.session.read().expires_at
    }

    pub fn scopes(&self) -> String {
        self.session.read().scopes.clone()
    }

    /// Refresh if the access token expires within the refresh window.
    /// Returns `true` when a refresh actually happened.
    pub async fn ensure_fresh(&self) -> Result<bool, XrpcError> {
        let expires_at = self.expires_at();
        if expires_at - Utc::now() > Duration::seconds(SESSION_REFRESH_WINDOW_SECS) {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// Exchange the refresh token. Serialized per session; a second caller
    /// arriving during a refresh sees the fresh expiry and returns early.
    async fn refresh(&self) -> Result<(), XrpcError> {
        let _guard = self.refresh_lock.lock().await;
        {
            let session = self.session.read();
            if session.expires_at - Utc::now() > Duration::seconds(SESSION_REFRESH_WINDOW_SECS) {
                return Ok(());
            }
        }

        let (token_endpoint, refresh_token, authserver_iss, session_id) = {
            let session = self.session.read();
            (
                session.token_endpoint.clone(),
                session.refresh_token.clone(),
                session.authserver_iss.clone(),
                session.session_id.clone(),
            )
        };

        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
            ("client_id", self.credentials.client_id.clone()),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer".to_string(),
            ),
            (
                "client_assertion",
                dpop::client_assertion(
                    &self.credentials.key,
                    &self.credentials.key_id,
                    &self.credentials.client_id,
                    &authserver_iss,
                )?,
            ),
        ];

        let tokens = self
            .token_request(&token_endpoint, &form, &session_id)
            .await?;
        let expires_at = tokens.expires_at();
        self.store
            .update_session_tokens(
                &session_id,
                &tokens.access_token,
                &tokens.refresh_token,
                expires_at,
            )
            .await?;
        {
            let mut session = self.session.write();
            session.access_token = tokens.access_token;
            session.refresh_token = tokens.refresh_token;
            session.expires_at = expires_at;
        }
        tracing::debug!(session = %session_id, "refreshed oauth session");
        Ok(())
    }

    /// POST the token endpoint with a DPoP proof, retrying once when the
    /// authorization server rotates its nonce.
    async fn token_request(
        &self,
        token_endpoint: &str,
        form: &[(&str, String)],
        session_id: &str,
    ) -> Result<TokenResponse, XrpcError> {
        let nonce = { self.session.read().dpop_authserver_nonce.clone() };
        let nonce = (!nonce.is_empty()).then_some(nonce);
        match self
            .token_request_once(token_endpoint, form, nonce.as_deref())
            .await
        {
            Err(XrpcError::UseDpopNonce { nonce: Some(nonce) }) => {
                self.store
                    .set_dpop_authserver_nonce(session_id, &nonce)
                    .await?;
                self.session.write().dpop_authserver_nonce = nonce.clone();
                self.token_request_once(token_endpoint, form, Some(&nonce))
                    .await
            }
            other => other,
        }
    }

    async fn token_request_once(
        &self,
        token_endpoint: &str,
        form: &[(&str, String)],
        nonce: Option<&str>,
    ) -> Result<TokenResponse, XrpcError> {
        let proof = dpop::dpop_proof(&self.dpop_key, "POST", token_endpoint, nonce, None, None)?;
        let response = self
            .http
            .post(token_endpoint)
            .header("DPoP", proof)
            .form(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(xrpc::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    /// One authed XRPC roundtrip against the session's repo host, with a
    /// single retry for nonce rotation and a single refresh for expiry.
    async fn authed(
        &self,
        method: Method,
        nsid: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        raw_body: Option<(Vec<u8>, String)>,
    ) -> Result<Value, XrpcError> {
        self.ensure_fresh().await?;
        match self.authed_once(method.clone(), nsid, query, body, raw_body.clone()).await {
            Err(XrpcError::UseDpopNonce { nonce: Some(nonce) }) => {
                let session_id = self.session_id();
                self.store.set_dpop_pds_nonce(&session_id, &nonce).await?;
                self.session.write().dpop_pds_nonce = nonce;
                self.authed_once(method, nsid, query, body, raw_body).await
            }
            Err(e) if e.is_auth_expired() => {
                self.refresh().await?;
                self.authed_once(method, nsid, query, body, raw_body).await
            }
            other => other,
        }
    }

    async fn authed_once(
        &self,
        method: Method,
        nsid: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        raw_body: Option<(Vec<u8>, String)>,
    ) -> Result<Value, XrpcError> {
        let (pds_url, access_token, pds_nonce) = {
            let session = self.session.read();
            (
                session.pds_url.clone(),
                session.access_token.clone(),
                session.dpop_pds_nonce.clone(),
            )
        };
        let url = xrpc::xrpc_url(&pds_url, nsid);
        let nonce = (!pds_nonce.is_empty()).then_some(pds_nonce);
        let proof = dpop::dpop_proof(
            &self.dpop_key,
            method.as_str(),
            &url,
            nonce.as_deref(),
            Some(&access_token),
            None,
        )?;

        let mut request = self
            .http
            .request(method, url)
            .header("Authorization", format!("DPoP {access_token}"))
            .header("DPoP", proof)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some((bytes, mime)) = raw_body {
            request = request.header("Content-Type", mime).body(bytes);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(xrpc::error_from_response(response).await);
        }
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    /// Create a record in the session's repo. Returns `(uri, cid)`.
    pub async fn create_record<R: serde::Serialize>(
        &self,
        collection: &str,
        rkey: Option<&str>,
        record: &R,
    ) -> Result<(String, String), XrpcError> {
        let input = serde_json::to_value(CreateRecordInput {
            repo: self.did(),
            collection: collection.to_string(),
            rkey: rkey.map(str::to_string),
            record: serde_json::to_value(record)
                .map_err(|e| XrpcError::Key(format!("record serialization failed: {e}")))?,
        })
        .expect("input is serializable");
        let out: CreateRecordOutput = serde_json::from_value(
            self.authed(Method::POST, CREATE_RECORD, &[], Some(&input), None)
                .await?,
        )
        .map_err(|e| XrpcError::Key(format!("malformed createRecord output: {e}")))?;
        Ok((out.uri, out.cid))
    }

    /// Put (create-or-replace) a record at a fixed rkey.
    pub async fn put_record<R: serde::Serialize>(
        &self,
        collection: &str,
        rkey: &str,
        record: &R,
        swap_cid: Option<String>,
    ) -> Result<(String, String), XrpcError> {
        let input = serde_json::to_value(PutRecordInput {
            repo: self.did(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
            record: serde_json::to_value(record)
                .map_err(|e| XrpcError::Key(format!("record serialization failed: {e}")))?,
            swap_record: swap_cid,
        })
        .expect("input is serializable");
        let out: CreateRecordOutput = serde_json::from_value(
            self.authed(Method::POST, PUT_RECORD, &[], Some(&input), None)
                .await?,
        )
        .map_err(|e| XrpcError::Key(format!("malformed putRecord output: {e}")))?;
        Ok((out.uri, out.cid))
    }

    /// Fetch a record from the session's repo, `None` when absent.
    pub async fn get_record(
        &self,
        collection: &str,
        rkey: &str,
    ) -> Result<Option<GetRecordOutput>, XrpcError> {
        let did = self.did();
        let result = self
            .authed(
                Method::GET,
                GET_RECORD,
                &[("repo", did.as_str()), ("collection", collection), ("rkey", rkey)],
                None,
                None,
            )
            .await;
        match result {
            Ok(value) => Ok(Some(serde_json::from_value(value).map_err(|e| {
                XrpcError::Key(format!("malformed getRecord output: {e}"))
            })?)),
            Err(XrpcError::Status { error, .. }) if error == "RecordNotFound" => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_record(&self, collection: &str, rkey: &str) -> Result<(), XrpcError> {
        let input = serde_json::to_value(DeleteRecordInput {
            repo: self.did(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        })
        .expect("input is serializable");
        self.authed(Method::POST, DELETE_RECORD, &[], Some(&input), None)
            .await?;
        Ok(())
    }

    /// Upload a blob to the session's repo host.
    pub async fn upload_blob(&self, bytes: Vec<u8>, mime: &str) -> Result<BlobRef, XrpcError> {
        let out: UploadBlobOutput = serde_json::from_value(
            self.authed(
                Method::POST,
                UPLOAD_BLOB,
                &[],
                None,
                Some((bytes, mime.to_string())),
            )
            .await?,
        )
        .map_err(|e| XrpcError::Key(format!("malformed uploadBlob output: {e}")))?;
        Ok(out.blob)
    }

    /// Publish a plain post to the wider feed network.
    pub async fn make_post(&self, text: &str) -> Result<(), XrpcError> {
        let record = serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": crate::utils::time::datetime_now().0,
        });
        self.create_record("app.bsky.feed.post", None, &record)
            .await?;
        Ok(())
    }
}
