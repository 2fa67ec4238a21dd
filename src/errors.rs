//! Stable error taxonomy shared by the REST API, the real-time transport,
//! and the domain services (§7).
//!
//! Each variant maps to exactly one HTTP status code and, where the error
//! can surface on a WebSocket connection, one close code (§6.3). Domain
//! code should return `HubError` (or a type that converts into it) rather
//! than bare strings, so the mapping lives in one place instead of being
//! re-derived at every call site.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("capacity reached")]
    CapacityReached,

    #[error("domain not allowed")]
    DomainNotAllowed,

    #[error("owner must transfer ownership before leaving")]
    OwnerMustTransferFirst,

    #[error("role assignment forbidden: {0}")]
    RoleAssignmentForbidden(String),

    #[error("payload too large")]
    TooLarge,

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("rate limited")]
    RateLimited,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl HubError {
    /// Stable string identifier used in JSON error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::Unauthenticated => "Unauthenticated",
            HubError::Forbidden(_) => "Forbidden",
            HubError::NotFound(_) => "NotFound",
            HubError::ValidationError(_) => "ValidationError",
            HubError::Conflict(_) => "Conflict",
            HubError::CapacityReached => "CapacityReached",
            HubError::DomainNotAllowed => "DomainNotAllowed",
            HubError::OwnerMustTransferFirst => "OwnerMustTransferFirst",
            HubError::RoleAssignmentForbidden(_) => "RoleAssignmentForbidden",
            HubError::TooLarge => "TooLarge",
            HubError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            HubError::RateLimited => "RateLimited",
            HubError::Internal(_) => "Internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HubError::Unauthenticated => StatusCode::UNAUTHORIZED,
            HubError::Forbidden(_) => StatusCode::FORBIDDEN,
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::ValidationError(_) => StatusCode::BAD_REQUEST,
            HubError::Conflict(_) => StatusCode::CONFLICT,
            HubError::CapacityReached => StatusCode::CONFLICT,
            HubError::DomainNotAllowed => StatusCode::FORBIDDEN,
            HubError::OwnerMustTransferFirst => StatusCode::CONFLICT,
            HubError::RoleAssignmentForbidden(_) => StatusCode::FORBIDDEN,
            HubError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            HubError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            HubError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// WebSocket close code (§6.3) for errors that can surface mid-connection.
    /// Returns `None` for kinds that only ever occur over REST.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            HubError::Unauthenticated => Some(4401),
            HubError::Forbidden(_) => Some(4403),
            HubError::NotFound(_) => Some(4404),
            HubError::TooLarge => Some(4413),
            _ => None,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        if matches!(self, HubError::Internal(_)) {
            tracing::error!(err = %self, "internal error");
        }
        let body = json!({
            "success": false,
            "error": { "kind": self.kind(), "message": self.to_string() }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

pub type HubResult<T> = Result<T, HubError>;
