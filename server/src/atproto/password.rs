//! App-password repo client
//!
//! Used only for the backend's own identity. Holds the access/refresh JWT
//! pair from `createSession`; any call that fails with an expired token
//! performs exactly one refresh-and-retry. The refresh path is serialized,
//! normal calls are not.

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::atproto::error::XrpcError;
use crate::atproto::xrpc::{
    self, CREATE_RECORD, CREATE_SESSION, CreateRecordInput, CreateRecordOutput, DELETE_RECORD,
    DeleteRecordInput, REFRESH_SESSION, SessionTokens,
};
use crate::core::constants::{COLLECTION_CHANNEL, COLLECTION_MESSAGE, COLLECTION_SIGNET};
use crate::domain::records::{ChannelRecord, MessageRecord, SignetRecord};

#[derive(Clone)]
struct Tokens {
    access: String,
    refresh: String,
}

pub struct PasswordClient {
    http: reqwest::Client,
    pds_url: String,
    did: String,
    identifier: String,
    password: String,
    tokens: RwLock<Option<Tokens>>,
    refresh_lock: Mutex<()>,
}

impl PasswordClient {
    pub fn new(
        http: reqwest::Client,
        pds_url: String,
        did: String,
        identifier: String,
        password: String,
    ) -> Self {
        Self {
            http,
            pds_url,
            did,
            identifier,
            password,
            tokens: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    /// Establish the initial session. Must succeed before the first write.
    pub async fn create_session(&self) -> Result<(), XrpcError> {
        let response = self
            .http
            .post(xrpc::xrpc_url(&self.pds_url, CREATE_SESSION))
            .json(&xrpc::CreateSessionInput {
                identifier: self.identifier.clone(),
                password: self.password.clone(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(xrpc::error_from_response(response).await);
        }
        let out: SessionTokens = response.json().await?;
        *self.tokens.write().await = Some(Tokens {
            access: out.access_jwt,
            refresh: out.refresh_jwt,
        });
        tracing::debug!("created repo session");
        Ok(())
    }

    /// Exchange the refresh token for a fresh pair. Serialized so two
    /// failing calls cannot race a double refresh.
    async fn refresh_session(&self) -> Result<(), XrpcError> {
        let _guard = self.refresh_lock.lock().await;
        let refresh = match &*self.tokens.read().await {
            Some(tokens) => tokens.refresh.clone(),
            None => return self.create_session().await,
        };
        let response = self
            .http
            .post(xrpc::xrpc_url(&self.pds_url, REFRESH_SESSION))
            .bearer_auth(refresh)
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::warn!("repo session refresh failed");
            return Err(xrpc::error_from_response(response).await);
        }
        let out: SessionTokens = response.json().await?;
        *self.tokens.write().await = Some(Tokens {
            access: out.access_jwt,
            refresh: out.refresh_jwt,
        });
        tracing::debug!("refreshed repo session");
        Ok(())
    }

    async fn access_token(&self) -> Result<String, XrpcError> {
        match &*self.tokens.read().await {
            Some(tokens) => Ok(tokens.access.clone()),
            None => Err(XrpcError::AuthExpired),
        }
    }

    async fn do_procedure(&self, nsid: &str, input: &Value) -> Result<Value, XrpcError> {
        match self.do_procedure_once(nsid, input).await {
            Err(e) if e.is_auth_expired() => {
                self.refresh_session().await?;
                self.do_procedure_once(nsid, input).await
            }
            other => other,
        }
    }

    async fn do_procedure_once(&self, nsid: &str, input: &Value) -> Result<Value, XrpcError> {
        let access = self.access_token().await?;
        let response = self
            .http
            .post(xrpc::xrpc_url(&self.pds_url, nsid))
            .bearer_auth(access)
            .json(input)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(xrpc::error_from_response(response).await);
        }
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    async fn create_my_record<R: serde::Serialize>(
        &self,
        collection: &str,
        record: &R,
    ) -> Result<CreateRecordOutput, XrpcError> {
        let input = serde_json::to_value(CreateRecordInput {
            repo: self.did.clone(),
            collection: collection.to_string(),
            rkey: None,
            record: serde_json::to_value(record)
                .map_err(|e| XrpcError::Key(format!("record serialization failed: {e}")))?,
        })
        .expect("input is serializable");
        let out = self.do_procedure(CREATE_RECORD, &input).await?;
        serde_json::from_value(out)
            .map_err(|e| XrpcError::Key(format!("malformed createRecord output: {e}")))
    }

    /// Publish a signet into the backend's repo. Returns `(uri, cid)`.
    pub async fn create_signet(&self, record: &SignetRecord) -> Result<(String, String), XrpcError> {
        let out = self.create_my_record(COLLECTION_SIGNET, record).await?;
        Ok((out.uri, out.cid))
    }

    /// Publish a channel into the backend's repo. Returns `(uri, cid)`.
    pub async fn create_channel(
        &self,
        record: &ChannelRecord,
    ) -> Result<(String, String), XrpcError> {
        let out = self.create_my_record(COLLECTION_CHANNEL, record).await?;
        Ok((out.uri, out.cid))
    }

    /// Publish a message into the backend's repo. Returns `(uri, cid)`.
    pub async fn create_message(
        &self,
        record: &MessageRecord,
    ) -> Result<(String, String), XrpcError> {
        let out = self.create_my_record(COLLECTION_MESSAGE, record).await?;
        Ok((out.uri, out.cid))
    }

    /// Delete a signet record by rkey. Returns `true` when the record was
    /// already gone, which callers treat as success.
    pub async fn delete_signet(&self, rkey: &str) -> Result<bool, XrpcError> {
        let input = serde_json::to_value(DeleteRecordInput {
            repo: self.did.clone(),
            collection: COLLECTION_SIGNET.to_string(),
            rkey: rkey.to_string(),
        })
        .expect("input is serializable");
        match self.do_procedure(DELETE_RECORD, &input).await {
            Ok(_) => Ok(false),
            Err(XrpcError::Status { error, .. }) if error == "RecordNotFound" => Ok(true),
            Err(e) => Err(e),
        }
    }
}
