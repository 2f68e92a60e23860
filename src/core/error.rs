//! # Error Handling Module
//!
//! Error types for the request-facing side of the gateway, built with `thiserror`.
//!
//! ## Where errors surface
//!
//! The gateway distinguishes two kinds of failure:
//! - **Request-level failures** (malformed JSON, invalid fields, bad configuration) are
//!   represented by [`GatewayError`] and become non-200 HTTP responses.
//! - **Execution failures** (the document store refused a connection, a query failed,
//!   something panicked mid-operation) never escape as `Err`. The orchestrator folds
//!   them into an [`ApiResponse`] with `status = "error"`, so callers always get an
//!   envelope back.
//!
//! Both paths render the same JSON envelope shape, which keeps client handling uniform.

use std::any::Any;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::core::types::ApiResponse;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request-level and startup errors for the gateway
///
/// The `#[error("...")]` attribute from `thiserror` implements `Display`
/// with the given message, which is also what ends up in the envelope.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A request field failed validation
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// The request body could not be read or decoded; `status` comes from
    /// the extractor (400 malformed, 413 too large, 415 wrong content type)
    #[error("Invalid request body: {message}")]
    InvalidBody { message: String, status: StatusCode },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (config files, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a validation error for a specific request field
    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestValidation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidBody { status, .. } => *status,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::RequestValidation { .. } => "request_validation_error",
            Self::InvalidBody { .. } => "invalid_body",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Well-formed JSON of the wrong shape is a validation failure (422);
/// anything else keeps the status the extractor chose
impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => Self::RequestValidation {
                field: "body".to_string(),
                reason: e.body_text(),
            },
            other => Self::InvalidBody {
                status: other.status(),
                message: other.body_text(),
            },
        }
    }
}

/// Render errors as the same envelope the orchestrator produces
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::debug!(
            error_type = self.error_type(),
            status = status.as_u16(),
            "Rejecting request"
        );
        (status, Json(ApiResponse::error(self.to_string()))).into_response()
    }
}

/// Extract a readable message from a panic payload
///
/// `panic!` with a literal carries a `&'static str`, formatted panics carry a `String`.
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid port: {}", port)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::GatewayError::config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ResponseStatus;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::validation("limit", "must be positive").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            GatewayError::InvalidBody {
                message: "bad".to_string(),
                status: StatusCode::BAD_REQUEST,
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::config("missing").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_display() {
        let error = GatewayError::validation("database_name", "must not be empty");
        assert_eq!(
            error.to_string(),
            "Request validation failed: database_name - must not be empty"
        );
        assert_eq!(error.error_type(), "request_validation_error");
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let gateway_error: GatewayError = io_error.into();
        assert!(matches!(gateway_error, GatewayError::Io { .. }));

        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let gateway_error: GatewayError = yaml_error.into();
        assert!(matches!(gateway_error, GatewayError::Yaml { .. }));
    }

    #[tokio::test]
    async fn test_error_renders_envelope() {
        let response = GatewayError::validation("limit", "too large").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let envelope: ApiResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.status, ResponseStatus::Error);
        assert!(envelope.message.contains("limit"));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_describe_panic_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(describe_panic(literal.as_ref()), "boom");

        let formatted: Box<dyn Any + Send> = Box::new(format!("boom {}", 42));
        assert_eq!(describe_panic(formatted.as_ref()), "boom 42");

        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(describe_panic(other.as_ref()), "unknown panic payload");
    }
}
