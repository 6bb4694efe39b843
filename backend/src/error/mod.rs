use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    InvalidOperation {
        requested: String,
        valid: Vec<&'static str>,
    },
    PersistenceFailure(String),
    Validation(Vec<String>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                msg,
                "UNAUTHORIZED".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN".to_string(), None),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg,
                "BAD_REQUEST".to_string(),
                None,
            ),
            AppError::InvalidOperation { requested, valid } => (
                StatusCode::BAD_REQUEST,
                format!("Invalid operation type: {}", requested),
                "INVALID_OPERATION".to_string(),
                Some(serde_json::json!({ "valid_operations": valid })),
            ),
            AppError::PersistenceFailure(reason) => {
                tracing::error!(reason = %reason, "Audit store read failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read audit records".to_string(),
                    "PERSISTENCE_ERROR".to_string(),
                    Some(serde_json::json!({ "reason": reason })),
                )
            }
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR".to_string(),
                Some(serde_json::json!({ "errors": errors })),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code,
            details,
        });

        (status, body).into_response()
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let code = e.code.as_ref();
                    format!("{}: {}", field, code)
                })
            })
            .collect();
        AppError::Validation(messages)
    }
}

/// Failures raised by an audit store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored audit record {id} is invalid: {reason}")]
    Corrupt { id: i64, reason: String },
    #[error("audit store unavailable: {0}")]
    Unavailable(String),
}

/// Failures inside the capture pipeline. These are logged and discarded,
/// never surfaced to the caller of the observed operation.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to store audit record: {0}")]
    Store(#[from] StoreError),
    #[error("audit capture task aborted: {0}")]
    Aborted(String),
}

/// Failures on the read path (query composition and aggregation).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    InvalidFilter(String),
    #[error("invalid operation type: {0}")]
    UnknownOperation(String),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::PersistenceFailure(err.to_string())
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidFilter(msg) => AppError::BadRequest(msg),
            QueryError::UnknownOperation(requested) => AppError::InvalidOperation {
                requested,
                valid: crate::models::audit_log::AuditOperation::valid_names(),
            },
            QueryError::Persistence(err) => err.into(),
        }
    }
}
