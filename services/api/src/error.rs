//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each error
//! is rendered as an HTTP response.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use poc_portal_core::{PortError, ServiceError, ValidationError};
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::config::ConfigError;

/// The body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// A short machine-readable tag, e.g. `invalid_rating`.
    pub error: String,
    pub details: String,
}

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing or invalid API key")]
    Unauthorized,

    /// The request body was absent or not the JSON we expect.
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("{details}")]
    BadRequest { tag: &'static str, details: String },

    #[error("{details}")]
    NotFound { tag: &'static str, details: String },

    /// The record store answered with an error, or refused our credentials.
    #[error("Service Port Error: {0}")]
    Port(PortError),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn missing_fields(fields: &[&str]) -> Self {
        ApiError::BadRequest {
            tag: "missing_required_fields",
            details: format!("{} required", fields.join(", ")),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            ApiError::InvalidJson(details) => (StatusCode::BAD_REQUEST, "invalid_json", details.clone()),
            ApiError::BadRequest { tag, details } => (StatusCode::BAD_REQUEST, *tag, details.clone()),
            ApiError::NotFound { tag, details } => (StatusCode::NOT_FOUND, *tag, details.clone()),
            // The backend's own error text is passed through untouched.
            ApiError::Port(PortError::Backend { message, .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "backend_http_error", message.clone())
            }
            ApiError::Port(PortError::Unexpected(details)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", details.clone())
            }
            ApiError::Port(err) => (StatusCode::INTERNAL_SERVER_ERROR, "backend_http_error", err.to_string()),
            ApiError::Unavailable(details) => {
                (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable", details.clone())
            }
            ApiError::Config(_) | ApiError::Io(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", self.to_string())
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation { tag, details } => ApiError::BadRequest { tag, details },
            ServiceError::MissingFields(details) => ApiError::BadRequest {
                tag: "missing_required_fields",
                details,
            },
            ServiceError::NotFound { tag, details } => ApiError::NotFound { tag, details },
            ServiceError::Port(err) => err.into(),
        }
    }
}

/// Only answers from the backend are backend errors. Transport and decode
/// failures are internal.
impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Unexpected(details) => ApiError::Internal(details),
            other => ApiError::Port(other),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest {
            tag: err.tag(),
            details: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidJson(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, tag, details) = self.parts();
        if status.is_server_error() {
            error!(error = tag, "Request failed: {}", details);
        } else {
            warn!(error = tag, "Request rejected: {}", details);
        }
        let body = ErrorBody {
            error: tag.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_pass_their_body_through() {
        let err = ApiError::from(ServiceError::Port(PortError::Backend {
            status: 400,
            message: r#"{"message":"Failed to create record."}"#.into(),
        }));

        let (status, tag, details) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(tag, "backend_http_error");
        assert!(details.contains("Failed to create record."));
    }

    #[test]
    fn unexpected_port_errors_are_internal() {
        let err = ApiError::from(ServiceError::Port(PortError::Unexpected(
            "Malformed pocs record: invalid type: string \"yes\", expected a boolean".into(),
        )));

        assert!(matches!(err, ApiError::Internal(_)));
        let (status, tag, details) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(tag, "internal_error");
        assert!(details.contains("Malformed pocs record"));
    }

    #[test]
    fn rejected_service_credentials_are_backend_errors() {
        let err = ApiError::from(PortError::Unauthorized);
        assert_eq!(err.parts().1, "backend_http_error");
    }

    #[test]
    fn service_errors_keep_their_tags() {
        let not_found = ApiError::from(ServiceError::NotFound {
            tag: "poc_not_found",
            details: "POC X not found".into(),
        });
        assert_eq!(not_found.parts().0, StatusCode::NOT_FOUND);
        assert_eq!(not_found.parts().1, "poc_not_found");

        let invalid = ApiError::from(ValidationError::InvalidRating(9));
        assert_eq!(invalid.parts().0, StatusCode::BAD_REQUEST);
        assert_eq!(invalid.parts().1, "invalid_rating");
    }

    #[test]
    fn missing_fields_lists_every_field() {
        let err = ApiError::missing_fields(&["poc_uid", "use_case_code"]);
        assert_eq!(err.parts().1, "missing_required_fields");
        assert_eq!(err.parts().2, "poc_uid, use_case_code required");
    }
}
