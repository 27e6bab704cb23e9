//! Authentication service.
//!
//! Password login with argon2 hashes. A successful login yields the user and
//! an HS256 bearer token whose claims carry the [`CurrentUser`], so token
//! requests never hit the database.

mod error;

pub use error::AuthError;

use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;

use livraison_core::Email;

use crate::db::UserRepository;
use crate::models::{CurrentUser, User};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Claims of a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id, as required by the JWT registered claims.
    pub sub: String,
    #[serde(flatten)]
    pub user: CurrentUser,
    pub iat: i64,
    pub exp: i64,
}

/// Sign a token for `user`, valid for `ttl` from `now`.
///
/// # Errors
///
/// Returns `AuthError::TokenSigning` if encoding fails.
pub fn issue_token(
    user: &CurrentUser,
    secret: &SecretString,
    ttl: Duration,
    now: i64,
) -> Result<String, AuthError> {
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let claims = TokenClaims {
        sub: user.id.to_string(),
        user: user.clone(),
        iat: now,
        exp: now.saturating_add(ttl),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AuthError::TokenSigning(e.to_string()))
}

/// Check a token's signature and expiry and return the user it names.
///
/// # Errors
///
/// Returns `AuthError::InvalidToken` for any invalid token.
pub fn validate_token(token: &str, secret: &SecretString) -> Result<CurrentUser, AuthError> {
    let data = jsonwebtoken::decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        AuthError::InvalidToken
    })?;

    Ok(data.claims.user)
}

/// Hash a password with a fresh salt.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` for short passwords.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(MIN_PASSWORD_LENGTH));
    }
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Password login.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    jwt_secret: &'a SecretString,
    token_ttl: Duration,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, jwt_secret: &'a SecretString, token_ttl: Duration) -> Self {
        Self {
            users: UserRepository::new(pool),
            jwt_secret,
            token_ttl,
        }
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong
    /// or the account is inactive.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), AuthError> {
        let email = Email::parse(email)?;

        let (user, password_hash) = self
            .users
            .get_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        let token = issue_token(
            &CurrentUser::from(&user),
            self.jwt_secret,
            self.token_ttl,
            chrono::Utc::now().timestamp(),
        )?;

        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
        Ok((user, token))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use livraison_core::{UserId, UserRole};

    use super::*;

    fn secret() -> SecretString {
        SecretString::from("k8Jq2mZr7Tn4Wv9Xb3Lc6Hf1Pd5Gs0Ya")
    }

    fn closeur() -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            email: Email::parse("closeur@shop1.test").unwrap(),
            name: "Awa".to_string(),
            role: UserRole::Closeur,
            shop: Some("Shop1".to_string()),
        }
    }

    #[test]
    fn test_token_carries_current_user() {
        let now = chrono::Utc::now().timestamp();
        let token = issue_token(&closeur(), &secret(), Duration::from_secs(3600), now).unwrap();
        assert_eq!(validate_token(&token, &secret()).unwrap(), closeur());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issued = chrono::Utc::now().timestamp() - 7200;
        let token = issue_token(&closeur(), &secret(), Duration::from_secs(3600), issued).unwrap();
        assert!(matches!(
            validate_token(&token, &secret()),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_token_signed_with_other_secret_rejected() {
        let now = chrono::Utc::now().timestamp();
        let token = issue_token(&closeur(), &secret(), Duration::from_secs(3600), now).unwrap();
        let other = SecretString::from("another-secret-of-sufficient-len!");
        assert!(validate_token(&token, &other).is_err());
        assert!(validate_token("not.a.token", &secret()).is_err());
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            hash_password("short"),
            Err(AuthError::WeakPassword(MIN_PASSWORD_LENGTH))
        ));
    }
}
