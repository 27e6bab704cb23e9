//! Service-layer error taxonomy.

use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::sheets::SheetsError;

/// One invalid field, or one failed item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by the order, sync and assignment services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller supplied bad data. `details` lists the offending fields.
    #[error("{message}")]
    InvalidInput {
        message: String,
        details: Vec<FieldError>,
    },

    #[error("{0}")]
    NotFound(String),

    /// The caller may not act on this resource.
    #[error("{0}")]
    Forbidden(String),

    /// The resource is in a state that does not allow the operation.
    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>, field: &str, detail: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            details: vec![FieldError::new(field, detail)],
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}
