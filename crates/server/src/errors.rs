use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use core_access::CoreAccessError;
use ingestflow::IngestionError;
use serde_json::json;
use tracing::{error, warn};

/// A custom error type for the server application.
///
/// This enum encapsulates different kinds of errors that can occur within the server,
/// allowing them to be converted into appropriate HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors originating from the lifecycle manager or its store.
    Ingestion(IngestionError),
    /// Errors from the users table.
    Access(CoreAccessError),
    /// The caller's role does not allow the operation.
    Forbidden(String),
    /// A malformed path, query string or body.
    BadRequest(String),
    /// Generic internal server errors.
    Internal(anyhow::Error),
}

impl From<IngestionError> for AppError {
    fn from(err: IngestionError) -> Self {
        AppError::Ingestion(err)
    }
}

impl From<CoreAccessError> for AppError {
    fn from(err: CoreAccessError) -> Self {
        AppError::Access(err)
    }
}

/// Conversion from `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, error_message) = match self {
            AppError::Ingestion(err) => match err {
                IngestionError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                IngestionError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
                IngestionError::InvalidState(msg) => (StatusCode::BAD_REQUEST, msg),
                IngestionError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                IngestionError::Storage(_) => {
                    error!("IngestionError: {:?}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            },
            AppError::Access(err) => match err {
                CoreAccessError::UserNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                CoreAccessError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
                CoreAccessError::UnknownRole(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                _ => {
                    error!("CoreAccessError: {:?}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Could not retrieve users: {err}"),
                    )
                }
            },
            AppError::Forbidden(msg) => {
                warn!("Forbidden: {msg}");
                (StatusCode::FORBIDDEN, msg)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(err) => {
                error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status_code, body).into_response()
    }
}
