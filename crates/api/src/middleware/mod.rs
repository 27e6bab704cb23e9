//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors and transactions)
//! 2. `TraceLayer` (`http_request` span with status and latency)
//! 3. Request ID (reuse or generate `x-request-id`)
//! 4. Request timeout (`504` JSON after the configured deadline)
//! 5. Session layer (tower-sessions with `PostgreSQL` store)
//! 6. [`auth::require_auth`] on everything but `/auth/login` and `/health`
//! 7. [`auth::require_roles`] per route group

pub mod auth;
pub mod request_id;
pub mod session;
pub mod timeout;

pub use auth::{
    AllowedRoles, AuthOutcome, AuthProvider, AuthUser, Authenticator, BearerTokenProvider,
    SessionProvider, clear_current_user, require_auth, require_roles, set_current_user,
};
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
pub use timeout::request_timeout;
