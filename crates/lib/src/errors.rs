use thiserror::Error;

/// Errors surfaced by the lifecycle manager and its stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestionError {
    /// The id is unknown, or the record is not visible to the caller.
    #[error("Ingestion process not found")]
    NotFound,
    /// Ownership or role violation.
    #[error("{0}")]
    Forbidden(String),
    /// A transition was attempted from the wrong status.
    #[error("{0}")]
    InvalidState(String),
    /// Malformed input.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The persistence collaborator failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),
}

impl From<turso::Error> for IngestionError {
    fn from(err: turso::Error) -> Self {
        IngestionError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for IngestionError {
    fn from(err: serde_json::Error) -> Self {
        IngestionError::Storage(format!("JSON column error: {err}"))
    }
}
