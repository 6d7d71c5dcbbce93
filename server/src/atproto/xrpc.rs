//! Shared XRPC request/response shapes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::atproto::error::{XrpcError, XrpcErrorBody};
use crate::domain::records::BlobRef;

pub const CREATE_RECORD: &str = "com.atproto.repo.createRecord";
pub const PUT_RECORD: &str = "com.atproto.repo.putRecord";
pub const DELETE_RECORD: &str = "com.atproto.repo.deleteRecord";
pub const GET_RECORD: &str = "com.atproto.repo.getRecord";
pub const UPLOAD_BLOB: &str = "com.atproto.repo.uploadBlob";
pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
pub const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
pub const GET_BLOB: &str = "com.atproto.sync.getBlob";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordInput {
    pub repo: String,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rkey: Option<String>,
    pub record: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordOutput {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutRecordInput {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
    pub record: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_record: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordInput {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRecordOutput {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct UploadBlobOutput {
    pub blob: BlobRef,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionInput {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub did: String,
    #[serde(default)]
    pub handle: String,
}

/// The XRPC endpoint URL for a method on a host.
pub fn xrpc_url(host: &str, nsid: &str) -> String {
    format!("{}/xrpc/{}", host.trim_end_matches('/'), nsid)
}

/// Turn a non-success response into the matching [`XrpcError`], consuming
/// the body and capturing a rotated DPoP nonce when the server sent one.
pub async fn error_from_response(response: reqwest::Response) -> XrpcError {
    let status = response.status().as_u16();
    let dpop_nonce = response
        .headers()
        .get("DPoP-Nonce")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body: XrpcErrorBody = response.json().await.unwrap_or_default();
    XrpcError::from_response(status, body, dpop_nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xrpc_url_joins_host_and_method() {
        assert_eq!(
            xrpc_url("https://pds.test/", CREATE_RECORD),
            "https://pds.test/xrpc/com.atproto.repo.createRecord"
        );
    }

    #[test]
    fn create_record_input_omits_missing_rkey() {
        let input = CreateRecordInput {
            repo: "did:plc:bk".into(),
            collection: "org.xcvr.lrc.signet".into(),
            rkey: None,
            record: serde_json::json!({"a": 1}),
        };
        let json = serde_json::to_value(&input).unwrap();
        assert!(json.get("rkey").is_none());
    }
}
