//! XRPC client errors

use thiserror::Error;

use crate::data::error::StoreError;

#[derive(Debug, Error)]
pub enum XrpcError {
    #[error("xrpc transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx with a decoded atproto error body.
    #[error("xrpc {status}: {error}: {message}")]
    Status {
        status: u16,
        error: String,
        message: String,
    },

    /// Access token rejected; the caller may refresh and retry once.
    #[error("access token expired")]
    AuthExpired,

    /// The server rotated its DPoP nonce; retry with the provided value.
    #[error("dpop nonce rotated")]
    UseDpopNonce { nonce: Option<String> },

    #[error("signing key error: {0}")]
    Key(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error body shape of every atproto XRPC failure.
#[derive(Debug, serde::Deserialize, Default)]
pub struct XrpcErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl XrpcError {
    /// Classify a non-2xx response body. Token-lifetime failures and nonce
    /// rotations get their own variants so callers can recover.
    pub fn from_response(status: u16, body: XrpcErrorBody, dpop_nonce: Option<String>) -> Self {
        match body.error.as_str() {
            "ExpiredToken" | "InvalidToken" => Self::AuthExpired,
            "use_dpop_nonce" => Self::UseDpopNonce { nonce: dpop_nonce },
            _ => Self::Status {
                status,
                error: body.error,
                message: body.message,
            },
        }
    }

    /// True for errors worth a single refresh-and-retry.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_token_classifies_as_auth_expired() {
        let body: XrpcErrorBody =
            serde_json::from_str(r#"{"error":"ExpiredToken","message":"Token has expired"}"#)
                .unwrap();
        assert!(XrpcError::from_response(400, body, None).is_auth_expired());
    }

    #[test]
    fn nonce_rotation_carries_the_new_nonce() {
        let body: XrpcErrorBody =
            serde_json::from_str(r#"{"error":"use_dpop_nonce","message":"retry"}"#).unwrap();
        match XrpcError::from_response(401, body, Some("n0nce".into())) {
            XrpcError::UseDpopNonce { nonce } => assert_eq!(nonce.as_deref(), Some("n0nce")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_errors_keep_status_and_code() {
        let body: XrpcErrorBody =
            serde_json::from_str(r#"{"error":"RecordNotFound","message":"nope"}"#).unwrap();
        match XrpcError::from_response(400, body, None) {
            XrpcError::Status { status, error, .. } => {
                assert_eq!(status, 400);
                assert_eq!(error, "RecordNotFound");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
