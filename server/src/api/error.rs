//! Shared API error type

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::atproto::{AuthFlowError, XrpcError};
use crate::data::error::StoreError;
use crate::identity::IdentityError;
use crate::records::RecordError;
use crate::runtime::RuntimeError;

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Upstream(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            Self::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m),
            Self::Upstream(m) => (StatusCode::BAD_GATEWAY, "upstream", m),
            Self::Internal(m) => {
                tracing::error!(error = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "something went wrong".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": error, "message": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<RuntimeError> for ApiError {
    fn from(e: RuntimeError) -> Self {
        Self::NotFound(e.to_string())
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::NotFound(what) => Self::NotFound(what),
            IdentityError::Malformed(what) => Self::BadRequest(what),
            IdentityError::Transport(e) => Self::Upstream(e.to_string()),
            IdentityError::Store(e) => e.into(),
        }
    }
}

impl From<XrpcError> for ApiError {
    fn from(e: XrpcError) -> Self {
        match e {
            XrpcError::Transport(e) => Self::Upstream(e.to_string()),
            XrpcError::AuthExpired => Self::Unauthorized("session expired".into()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Invalid(m) => Self::BadRequest(m),
            RecordError::NotFound(what) => Self::NotFound(what.to_string()),
            RecordError::Forbidden(what) => Self::Forbidden(what.to_string()),
            RecordError::Uri(e) => Self::BadRequest(e.to_string()),
            RecordError::Xrpc(e) => e.into(),
            RecordError::Store(e) => e.into(),
            RecordError::Identity(e) => e.into(),
            RecordError::Auth(e) => e.into(),
        }
    }
}

impl From<AuthFlowError> for ApiError {
    fn from(e: AuthFlowError) -> Self {
        match e {
            AuthFlowError::UnknownState => Self::BadRequest("unknown or replayed state".into()),
            AuthFlowError::IssuerMismatch | AuthFlowError::ScopeMismatch
            | AuthFlowError::SubjectMismatch => Self::Unauthorized(e.to_string()),
            AuthFlowError::Identity(e) => e.into(),
            AuthFlowError::Xrpc(e) => e.into(),
            AuthFlowError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_errors_map_to_client_statuses() {
        let response = ApiError::from(RecordError::Invalid("nick too long".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = ApiError::from(RecordError::NotFound("signet")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response =
            ApiError::from(RecordError::Forbidden("authorship nonce mismatch")).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let response = ApiError::internal("connection string with secrets").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
