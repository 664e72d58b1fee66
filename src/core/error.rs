//! Typed error handling for the exposure layer
//!
//! [`ExposureError`] is the single error type that leaves the request handler.
//! Every variant maps to one HTTP status and one stable error code, and is
//! rendered as a structured JSON body, never as a raw backtrace.
//!
//! # Error Categories
//!
//! - [`ConfigurationError`]: startup-fatal declaration problems
//! - [`NotFoundError`]: unknown resource, item, search relation or association
//! - [`DeserializationError`]: payloads that cannot become a record
//! - request-level kinds: malformed request, method not allowed, forbidden,
//!   bad request, conflict, timeout
//!
//! # Example
//!
//! ```rust,ignore
//! match handler.handle(request).await {
//!     Ok(response) => response,
//!     Err(ExposureError::MethodNotAllowed { .. }) => { /* 405 */ }
//!     Err(e) => e.into_response(),
//! }
//! ```

use crate::core::query::QueryError;
use crate::core::service::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The main error type of the exposure layer
#[derive(Debug)]
pub enum ExposureError {
    /// Malformed declarations detected while building the registries
    Configuration(ConfigurationError),

    /// Unparseable path, query string or body
    MalformedRequest { message: String },

    /// Unknown resource, id, search relation or association
    NotFound(NotFoundError),

    /// The verb maps to an operation that is not exposed
    MethodNotAllowed { resource: String, method: String },

    /// The policy collaborator denied the operation
    Forbidden { resource: String, operation: String },

    /// Well-formed request asking for something unsupported
    BadRequest { message: String },

    /// Payload could not be turned into an entity
    Deserialization(DeserializationError),

    /// Concurrent write conflict reported by the persistence collaborator
    Conflict { message: String },

    /// The request did not complete within the configured timeout
    Timeout,

    /// Persistence backend failure or other unexpected condition
    Internal(String),
}

impl fmt::Display for ExposureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExposureError::Configuration(e) => write!(f, "Configuration error: {}", e),
            ExposureError::MalformedRequest { message } => {
                write!(f, "Malformed request: {}", message)
            }
            ExposureError::NotFound(e) => write!(f, "{}", e),
            ExposureError::MethodNotAllowed { resource, method } => {
                write!(f, "Method {} is not allowed on '{}'", method, resource)
            }
            ExposureError::Forbidden {
                resource,
                operation,
            } => {
                write!(f, "Access denied: {} on '{}'", operation, resource)
            }
            ExposureError::BadRequest { message } => write!(f, "Bad request: {}", message),
            ExposureError::Deserialization(e) => write!(f, "Could not read payload: {}", e),
            ExposureError::Conflict { message } => write!(f, "Conflict: {}", message),
            ExposureError::Timeout => write!(f, "Request timed out"),
            ExposureError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ExposureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExposureError::Configuration(e) => Some(e),
            ExposureError::NotFound(e) => Some(e),
            ExposureError::Deserialization(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ExposureError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ExposureError::MalformedRequest {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ExposureError::BadRequest {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExposureError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ExposureError::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
            ExposureError::NotFound(_) => StatusCode::NOT_FOUND,
            ExposureError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ExposureError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ExposureError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ExposureError::Deserialization(_) => StatusCode::BAD_REQUEST,
            ExposureError::Conflict { .. } => StatusCode::CONFLICT,
            ExposureError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            ExposureError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ExposureError::Configuration(_) => "CONFIGURATION_ERROR",
            ExposureError::MalformedRequest { .. } => "MALFORMED_REQUEST",
            ExposureError::NotFound(_) => "NOT_FOUND",
            ExposureError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ExposureError::Forbidden { .. } => "FORBIDDEN",
            ExposureError::BadRequest { .. } => "BAD_REQUEST",
            ExposureError::Deserialization(_) => "DESERIALIZATION_ERROR",
            ExposureError::Conflict { .. } => "CONFLICT",
            ExposureError::Timeout => "TIMEOUT",
            ExposureError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ExposureError::NotFound(NotFoundError::Item { resource, id }) => {
                Some(serde_json::json!({ "resource": resource, "id": id }))
            }
            ExposureError::NotFound(NotFoundError::SearchMethod { resource, rel }) => {
                Some(serde_json::json!({ "resource": resource, "rel": rel }))
            }
            ExposureError::Deserialization(DeserializationError::UnresolvedAbstractType {
                field,
                capability,
            }) => Some(serde_json::json!({ "field": field, "type": capability })),
            ExposureError::Deserialization(DeserializationError::TypeMismatch {
                field,
                expected,
            }) => Some(serde_json::json!({ "field": field, "expected": expected })),
            _ => None,
        }
    }
}

impl IntoResponse for ExposureError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

impl From<ConfigurationError> for ExposureError {
    fn from(err: ConfigurationError) -> Self {
        ExposureError::Configuration(err)
    }
}

impl From<NotFoundError> for ExposureError {
    fn from(err: NotFoundError) -> Self {
        ExposureError::NotFound(err)
    }
}

impl From<DeserializationError> for ExposureError {
    fn from(err: DeserializationError) -> Self {
        ExposureError::Deserialization(err)
    }
}

impl From<QueryError> for ExposureError {
    fn from(err: QueryError) -> Self {
        ExposureError::malformed(err.to_string())
    }
}

impl From<StoreError> for ExposureError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { resource, id } => {
                ExposureError::NotFound(NotFoundError::Item { resource, id })
            }
            StoreError::Conflict { message } => ExposureError::Conflict { message },
            StoreError::Backend(e) => ExposureError::Internal(e.to_string()),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Startup-fatal errors in entity, repository or projection declarations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("entity type '{entity_type}' has no identifier field")]
    MissingIdentifier { entity_type: String },

    #[error("identifier '{field}' of '{entity_type}' has unsupported type {field_type}")]
    InvalidIdentifierType {
        entity_type: String,
        field: String,
        field_type: String,
    },

    #[error("repositories '{first}' and '{second}' both claim path '/{path}'")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },

    #[error("entity type '{entity_type}' is declared twice")]
    DuplicateEntityType { entity_type: String },

    #[error("invalid {kind} '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("repository '{repository}' claims '/{path}', which is reserved for health checks")]
    ReservedPath { path: String, repository: String },

    #[error("'{referenced_by}' references unknown entity type '{entity_type}'")]
    UnknownEntityType {
        referenced_by: String,
        entity_type: String,
    },

    #[error("repository '{repository}' declares search relation '{rel}' twice")]
    DuplicateSearchRel { repository: String, rel: String },

    #[error("projection '{name}' is registered twice for '{entity_type}'")]
    DuplicateProjection { entity_type: String, name: String },

    #[error("projection '{projection}' exposes '{field}' which '{entity_type}' does not declare")]
    UnknownProjectionField {
        projection: String,
        entity_type: String,
        field: String,
    },

    #[error("projection '{projection}' has an invalid template for '{field}': {message}")]
    InvalidTemplate {
        projection: String,
        field: String,
        message: String,
    },

    #[error("repository '{repository}' uses unknown excerpt projection '{projection}'")]
    UnknownExcerpt {
        repository: String,
        projection: String,
    },

    #[error("{0}")]
    Invalid(String),
}

// =============================================================================
// Not Found Errors
// =============================================================================

/// The addressed thing does not exist
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("No resource exposed at '{0}'")]
    Resource(String),

    #[error("{resource} with id '{id}' not found")]
    Item { resource: String, id: String },

    #[error("No search method '{rel}' on '{resource}'")]
    SearchMethod { resource: String, rel: String },

    #[error("No association '{name}' on '{resource}'")]
    Association { resource: String, name: String },

    #[error("Search '{rel}' on '{resource}' returned no result")]
    NoResult { resource: String, rel: String },
}

// =============================================================================
// Deserialization Errors
// =============================================================================

/// Errors turning an inbound payload into a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeserializationError {
    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("unresolved abstract type '{capability}' for field '{field}'")]
    UnresolvedAbstractType { field: String, capability: String },

    #[error("field '{field}' expects a value of type {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("field '{field}' is required")]
    MissingField { field: String },

    #[error("field '{field}' holds an invalid reference '{value}'")]
    InvalidReference { field: String, value: String },
}
