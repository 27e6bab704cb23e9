//! Password login, logout and identity endpoints.
//!
//! Login answers with a bearer token for API clients and also stores the
//! user in the session, so browser clients can rely on the cookie alone.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::db::UserRepository;
use crate::error::{AppError, clear_sentry_user};
use crate::middleware::{AuthUser, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::AuthService;
use crate::state::AppState;

use super::extract::JsonBody;

/// Routes reachable without credentials.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

/// Routes for authenticated callers.
pub fn router() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    success: bool,
    token: String,
    user: User,
}

#[derive(Debug, Serialize)]
struct MeResponse {
    success: bool,
    user: User,
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    success: bool,
}

fn session_error(err: tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session error: {err}"))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let config = state.config();
    let service = AuthService::new(state.pool(), &config.jwt_secret, config.token_ttl);
    let (user, token) = service.login(&body.email, &body.password).await?;

    set_current_user(&session, &CurrentUser::from(&user))
        .await
        .map_err(session_error)?;

    Ok(Json(LoginResponse {
        success: true,
        token,
        user,
    }))
}

async fn logout(session: Session) -> Result<Json<LogoutResponse>, AppError> {
    clear_current_user(&session).await.map_err(session_error)?;
    clear_sentry_user();
    Ok(Json(LogoutResponse { success: true }))
}

/// The caller's account as stored now, not as captured in the token.
async fn me(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let user = UserRepository::new(state.pool())
        .get_by_id(current.id)
        .await?
        .filter(|user| user.active)
        .ok_or_else(|| AppError::Unauthorized("account no longer active".to_string()))?;

    Ok(Json(MeResponse {
        success: true,
        user,
    }))
}
