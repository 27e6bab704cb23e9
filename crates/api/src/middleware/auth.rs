//! Authentication middleware, role guard and extractors.
//!
//! Identity is resolved by a chain of [`AuthProvider`]s: the bearer token
//! first, then the session cookie. The first provider that recognises the
//! request wins. A bearer token that is present but invalid is rejected
//! outright rather than falling through to the session.
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/config", get(list_configs))
//!     .route_layer(from_fn_with_state(AllowedRoles::ADMIN, require_roles))
//!     .route_layer(from_fn_with_state(state.clone(), require_auth))
//! ```

use std::future::Future;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use secrecy::SecretString;
use tower_sessions::Session;

use livraison_core::UserRole;

use crate::error::{AppError, set_sentry_user};
use crate::models::{CurrentUser, keys};
use crate::services::auth::validate_token;
use crate::state::AppState;

/// How the current request was authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Token(CurrentUser),
    Session(CurrentUser),
    Unauthenticated,
}

impl AuthOutcome {
    #[must_use]
    pub const fn user(&self) -> Option<&CurrentUser> {
        match self {
            Self::Token(user) | Self::Session(user) => Some(user),
            Self::Unauthenticated => None,
        }
    }

    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Session(_) => "session",
            Self::Unauthenticated => "none",
        }
    }
}

/// One way of recognising a caller.
pub trait AuthProvider {
    /// `Ok(None)` when the request carries nothing this provider understands.
    fn authenticate(
        &self,
        parts: &Parts,
    ) -> impl Future<Output = Result<Option<AuthOutcome>, AppError>> + Send;
}

/// `Authorization: Bearer <jwt>`.
pub struct BearerTokenProvider {
    secret: SecretString,
}

impl BearerTokenProvider {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }
}

/// The bearer token of `headers`, if any.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then_some(token.trim())
        .filter(|t| !t.is_empty())
}

impl AuthProvider for BearerTokenProvider {
    async fn authenticate(&self, parts: &Parts) -> Result<Option<AuthOutcome>, AppError> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(None);
        };
        let user = validate_token(token, &self.secret)?;
        Ok(Some(AuthOutcome::Token(user)))
    }
}

/// User stored in the tower-sessions session at login.
pub struct SessionProvider;

impl AuthProvider for SessionProvider {
    async fn authenticate(&self, parts: &Parts) -> Result<Option<AuthOutcome>, AppError> {
        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(None);
        };
        let user: Option<CurrentUser> = session
            .get(keys::CURRENT_USER)
            .await
            .map_err(|e| AppError::Internal(format!("session store error: {e}")))?;
        Ok(user.map(AuthOutcome::Session))
    }
}

/// Bearer token first, then session.
pub struct Authenticator {
    bearer: BearerTokenProvider,
    session: SessionProvider,
}

impl Authenticator {
    #[must_use]
    pub const fn new(jwt_secret: SecretString) -> Self {
        Self {
            bearer: BearerTokenProvider::new(jwt_secret),
            session: SessionProvider,
        }
    }

    /// Resolve the caller of a request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` for an invalid bearer token.
    pub async fn authenticate(&self, parts: &Parts) -> Result<AuthOutcome, AppError> {
        if let Some(outcome) = self.bearer.authenticate(parts).await? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.session.authenticate(parts).await? {
            return Ok(outcome);
        }
        Ok(AuthOutcome::Unauthenticated)
    }
}

/// Reject unauthenticated requests and attach the [`CurrentUser`].
///
/// # Errors
///
/// Returns `AppError::Unauthorized` when no provider recognises the caller.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let outcome = Authenticator::new(state.config().jwt_secret.clone())
        .authenticate(&parts)
        .await?;

    let Some(user) = outcome.user().cloned() else {
        return Err(AppError::Unauthorized("authentication required".to_string()));
    };

    tracing::Span::current().record("user_id", user.id.as_i32());
    tracing::debug!(user_id = %user.id, method = outcome.method(), "Authenticated request");
    set_sentry_user(&user.id, Some(user.email.as_str()));

    parts.extensions.insert(outcome);
    parts.extensions.insert(user);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Allow-list of roles for [`require_roles`].
#[derive(Debug, Clone, Copy)]
pub struct AllowedRoles(pub &'static [UserRole]);

impl AllowedRoles {
    pub const ADMIN: Self = Self(&[UserRole::Admin]);
    pub const STAFF: Self = Self(&[UserRole::Admin, UserRole::Closeur]);

    #[must_use]
    pub fn permits(self, role: UserRole) -> bool {
        self.0.contains(&role)
    }
}

/// Reject callers whose role is not in the allow-list. Must run inside
/// [`require_auth`].
///
/// # Errors
///
/// Returns `AppError::Unauthorized` without a resolved user and
/// `AppError::Forbidden` for a role outside the list.
pub async fn require_roles(
    State(allowed): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let role = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| user.role)
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;

    if !allowed.permits(role) {
        return Err(AppError::Forbidden(format!(
            "role {role} may not access this resource"
        )));
    }
    Ok(next.run(request).await)
}

/// Extractor for the user attached by [`require_auth`].
pub struct AuthUser(pub CurrentUser);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
    }
}

/// Store the logged-in user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(keys::CURRENT_USER, user).await
}

/// Drop the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use axum::http::{HeaderValue, Request as HttpRequest};
    use livraison_core::{Email, UserId};

    use super::*;
    use crate::services::auth::issue_token;

    fn secret() -> SecretString {
        SecretString::from("k8Jq2mZr7Tn4Wv9Xb3Lc6Hf1Pd5Gs0Ya")
    }

    fn courier() -> CurrentUser {
        CurrentUser {
            id: UserId::new(4),
            email: Email::parse("moussa@livraison.test").unwrap(),
            name: "Moussa".to_string(),
            role: UserRole::Livreur,
            shop: None,
        }
    }

    fn parts(authorization: Option<&str>) -> Parts {
        let mut request = HttpRequest::builder().uri("/orders").body(()).unwrap();
        if let Some(value) = authorization {
            request
                .headers_mut()
                .insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        request.into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_token_provider_wins() {
        let now = chrono::Utc::now().timestamp();
        let token = issue_token(&courier(), &secret(), Duration::from_secs(60), now).unwrap();
        let outcome = Authenticator::new(secret())
            .authenticate(&parts(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(outcome, AuthOutcome::Token(courier()));
        assert_eq!(outcome.method(), "token");
    }

    #[tokio::test]
    async fn test_invalid_token_does_not_fall_through() {
        let result = Authenticator::new(secret())
            .authenticate(&parts(Some("Bearer forged")))
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_no_credentials_is_unauthenticated() {
        let outcome = Authenticator::new(secret())
            .authenticate(&parts(None))
            .await
            .unwrap();
        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert!(outcome.user().is_none());
    }

    #[test]
    fn test_allowed_roles() {
        assert!(AllowedRoles::STAFF.permits(UserRole::Closeur));
        assert!(!AllowedRoles::STAFF.permits(UserRole::Livreur));
        assert!(!AllowedRoles::ADMIN.permits(UserRole::Closeur));
    }
}
