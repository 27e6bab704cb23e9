//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions. Browser clients
//! log in once and ride the cookie; API clients use bearer tokens instead.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::ApiConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "livraison_session";

/// Create the session layer with `PostgreSQL` store.
///
/// Sessions expire after the same inactivity period as bearer tokens.
///
/// # Panics
///
/// Panics if the schema name or table name is invalid (should never happen
/// with hardcoded "livraison" and "session" values).
#[must_use]
pub fn create_session_layer(pool: &PgPool, config: &ApiConfig) -> SessionManagerLayer<PostgresStore> {
    // The session table is created by migration in the livraison schema
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("livraison")
        .expect("valid schema name")
        .with_table_name("session")
        .expect("valid table name");

    let expiry_seconds = i64::try_from(config.token_ttl.as_secs()).unwrap_or(i64::MAX);

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(expiry_seconds),
        ))
        .with_secure(config.is_https())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
