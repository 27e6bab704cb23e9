//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as JSON:
//!
//! ```json
//! { "success": false, "error": "…", "details": [...], "cause": "…", "suggestions": [...] }
//! ```
//!
//! `details`, `cause` and `suggestions` are only present when they apply.

use std::sync::OnceLock;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{AuthError, FieldError, ServiceError};
use crate::sheets::SheetsError;

static EXPOSE_INTERNAL_ERRORS: OnceLock<bool> = OnceLock::new();

/// Include internal error detail in responses. Called once at startup in
/// development.
pub fn expose_internal_errors(enabled: bool) {
    let _ = EXPOSE_INTERNAL_ERRORS.set(enabled);
}

fn internal_errors_exposed() -> bool {
    EXPOSE_INTERNAL_ERRORS.get().copied().unwrap_or(false)
}

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request from client, with per-field detail.
    #[error("{message}")]
    InvalidInput {
        message: String,
        details: Vec<FieldError>,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The resource is not in a state that allows the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request did not finish in time.
    #[error("Request timed out")]
    Timeout,

    /// Uniqueness clash, e.g. a taken name.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Spreadsheet gateway failure.
    #[error("Google Sheets error: {0}")]
    Sheets(#[from] SheetsError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Bad request without field detail.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            details: Vec::new(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) | Self::InvalidState(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Sheets(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("resource not found".to_string()),
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other => Self::Database(other),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput { message, details } => {
                Self::InvalidInput { message, details }
            }
            ServiceError::NotFound(message) => Self::NotFound(message),
            ServiceError::Forbidden(message) => Self::Forbidden(message),
            ServiceError::InvalidState(message) => Self::InvalidState(message),
            ServiceError::Sheets(err) => Self::Sheets(err),
            ServiceError::Repository(err) => err.into(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken => {
                Self::Unauthorized(err.to_string())
            }
            AuthError::InvalidEmail(_) | AuthError::WeakPassword(_) => {
                Self::bad_request(err.to_string())
            }
            AuthError::Repository(err) => err.into(),
            AuthError::PasswordHash | AuthError::TokenSigning(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query string: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cause: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() && !matches!(self, Self::Timeout) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let mut body = ErrorBody {
            success: false,
            error: self.to_string(),
            details: Vec::new(),
            cause: None,
            suggestions: Vec::new(),
        };

        match self {
            Self::InvalidInput { details, .. } => body.details = details,
            Self::Sheets(err) => {
                body.error = match &err {
                    SheetsError::AccessDenied { .. } => "Access to the spreadsheet was denied",
                    SheetsError::RangeParse { .. } => "The sheet name could not be used",
                    SheetsError::ExternalWriteFailed { .. } => {
                        "The spreadsheet could not be updated; nothing was saved"
                    }
                    _ => "Google Sheets request failed",
                }
                .to_string();
                body.suggestions = err.suggestions();
                body.cause = Some(err.to_string());
            }
            Self::Database(_) | Self::Internal(_) if !internal_errors_exposed() => {
                // Don't expose internal error details to clients
                body.error = "Internal server error".to_string();
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
