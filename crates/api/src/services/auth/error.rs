//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] livraison_core::EmailError),

    /// Unknown email, wrong password or deactivated account.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Password shorter than the minimum length.
    #[error("password must be at least {0} characters")]
    WeakPassword(usize),

    /// Argon2 could not hash the password.
    #[error("password hashing failed")]
    PasswordHash,

    /// Bearer token missing its signature, expired or malformed.
    #[error("invalid or expired token")]
    InvalidToken,

    /// Token could not be signed.
    #[error("token signing failed: {0}")]
    TokenSigning(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
