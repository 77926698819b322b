use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type shared by every service in the crate.
///
/// Each variant maps to a stable machine-readable code (`code()`) so the
/// surrounding transport layer can translate failures without string
/// matching on messages.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Hierarchy cycle: {0}")]
    CycleError(String),

    #[error("Hierarchy depth exceeded: {0}")]
    DepthExceeded(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Internal error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::DatabaseError(_) => "DATABASE_ERROR",
            ServiceError::NotFound(_) => "RESOURCE_NOT_FOUND",
            ServiceError::ValidationError(_) => "VALIDATION_ERROR",
            ServiceError::TypeMismatch(_) => "TYPE_MISMATCH",
            ServiceError::SchemaViolation(_) => "SCHEMA_VIOLATION",
            ServiceError::CycleError(_) => "HIERARCHY_CYCLE",
            ServiceError::DepthExceeded(_) => "HIERARCHY_DEPTH_EXCEEDED",
            ServiceError::InvalidFilter(_) => "INVALID_FILTER",
            ServiceError::Conflict(_) => "RESOURCE_CONFLICT",
            ServiceError::EventError(_) => "EVENT_ERROR",
            ServiceError::InternalError(_) | ServiceError::Other(_) => "INTERNAL_ERROR",
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} with id {} not found", entity, id))
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

/// Serializable error envelope handed to the surrounding transport layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Additional structured detail, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(error: &ServiceError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}
