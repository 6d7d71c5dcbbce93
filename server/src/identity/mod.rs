//! Identity resolution
//!
//! Handle → DID through the public directory, DID → handle and DID → repo
//! host by fetching and parsing the DID document (`did:plc` via the plc
//! directory, `did:web` via the domain's well-known path). Every successful
//! resolution writes through to the store's handle map.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::core::constants::{HTTP_TIMEOUT_SECS, PLC_DIRECTORY_URL, PUBLIC_API_URL};
use crate::data::Store;
use crate::data::error::StoreError;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity not found: {0}")]
    NotFound(String),
    #[error("malformed identity document: {0}")]
    Malformed(String),
    #[error("directory transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct ResolveHandleOutput {
    did: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(default)]
    pub also_known_as: Vec<String>,
    #[serde(default)]
    pub service: Vec<DidService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidService {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: String,
}

impl DidDocument {
    /// The handle declared by the document, from the first `at://` alias.
    pub fn handle(&self) -> Option<&str> {
        self.also_known_as
            .iter()
            .find_map(|aka| aka.strip_prefix("at://"))
    }

    /// The repo host service endpoint.
    pub fn pds_endpoint(&self) -> Option<&str> {
        self.service
            .iter()
            .find(|s| {
                s.id.ends_with("#atproto_pds")
                    || s.service_type == "AtprotoPersonalDataServer"
            })
            .map(|s| s.service_endpoint.as_str())
    }
}

/// The URL a DID document is fetched from; `did:plc` and `did:web` only.
fn did_doc_url(plc_url: &str, did: &str) -> Result<String, IdentityError> {
    if did.starts_with("did:plc:") {
        return Ok(format!("{plc_url}/{did}"));
    }
    if let Some(host) = did.strip_prefix("did:web:") {
        if host.is_empty() || host.contains(':') || host.contains('/') {
            return Err(IdentityError::Malformed(did.to_string()));
        }
        return Ok(format!("https://{host}/.well-known/did.json"));
    }
    Err(IdentityError::Malformed(did.to_string()))
}

#[derive(Clone)]
pub struct IdentityResolver {
    http: reqwest::Client,
    store: Store,
    directory_url: String,
    plc_url: String,
}

impl IdentityResolver {
    pub fn new(store: Store) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            store,
            directory_url: PUBLIC_API_URL.to_string(),
            plc_url: PLC_DIRECTORY_URL.to_string(),
        }
    }

    /// Resolve a handle to its DID via the directory, caching the pair.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String, IdentityError> {
        let url = format!(
            "{}/xrpc/com.atproto.identity.resolveHandle",
            self.directory_url
        );
        let response = self
            .http
            .get(url)
            .query(&[("handle", handle)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(IdentityError::NotFound(handle.to_string()));
        }
        let out: ResolveHandleOutput = response.json().await?;
        self.store.store_did_handle(&out.did, handle).await?;
        Ok(out.did)
    }

    /// Resolve a DID to its declared handle, caching the pair.
    pub async fn resolve_did(&self, did: &str) -> Result<String, IdentityError> {
        let doc = self.fetch_did_doc(did).await?;
        let handle = doc
            .handle()
            .ok_or_else(|| IdentityError::Malformed(did.to_string()))?
            .to_string();
        self.store.store_did_handle(did, &handle).await?;
        Ok(handle)
    }

    /// Resolve a DID from the local map first, falling through to the
    /// directory on a miss. Detected handle changes replace the stored pair.
    pub async fn full_resolve_did(&self, did: &str) -> Result<String, IdentityError> {
        if let Some(handle) = self.store.resolve_did(did).await? {
            return Ok(handle);
        }
        let handle = self.resolve_did(did).await?;
        if self.store.resolve_did(did).await?.as_deref() != Some(handle.as_str()) {
            self.store.refresh_did_handle(did, &handle).await?;
        }
        Ok(handle)
    }

    /// Resolve a handle from the local map first, falling through to the
    /// directory on a miss.
    pub async fn full_resolve_handle(&self, handle: &str) -> Result<String, IdentityError> {
        if let Some(did) = self.store.resolve_handle(handle).await? {
            return Ok(did);
        }
        self.resolve_handle(handle).await
    }

    /// The repo host serving a DID's repository.
    pub async fn pds_for_did(&self, did: &str) -> Result<String, IdentityError> {
        let doc = self.fetch_did_doc(did).await?;
        doc.pds_endpoint()
            .map(str::to_string)
            .ok_or_else(|| IdentityError::NotFound(did.to_string()))
    }

    async fn fetch_did_doc(&self, did: &str) -> Result<DidDocument, IdentityError> {
        let url = did_doc_url(&self.plc_url, did)?;
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(IdentityError::NotFound(did.to_string()));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_doc_urls_for_both_methods() {
        assert_eq!(
            did_doc_url("https://plc.directory", "did:plc:abc123").unwrap(),
            "https://plc.directory/did:plc:abc123"
        );
        assert_eq!(
            did_doc_url("https://plc.directory", "did:web:example.com").unwrap(),
            "https://example.com/.well-known/did.json"
        );
        assert!(did_doc_url("https://plc.directory", "did:key:z6Mk").is_err());
        assert!(did_doc_url("https://plc.directory", "did:web:evil.com/path").is_err());
    }

    #[test]
    fn did_document_extracts_handle_and_pds() {
        let doc: DidDocument = serde_json::from_str(
            r##"{
                "alsoKnownAs": ["at://alice.test"],
                "service": [
                    {"id": "#atproto_labeler", "type": "AtprotoLabeler", "serviceEndpoint": "https://mod.test"},
                    {"id": "#atproto_pds", "type": "AtprotoPersonalDataServer", "serviceEndpoint": "https://pds.test"}
                ]
            }"##,
        )
        .unwrap();
        assert_eq!(doc.handle(), Some("alice.test"));
        assert_eq!(doc.pds_endpoint(), Some("https://pds.test"));
    }

    #[test]
    fn empty_document_yields_nothing() {
        let doc: DidDocument = serde_json::from_str("{}").unwrap();
        assert_eq!(doc.handle(), None);
        assert_eq!(doc.pds_endpoint(), None);
    }
}
