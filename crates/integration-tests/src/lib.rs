//! Integration tests for Livraison.
//!
//! # Running Tests
//!
//! ```bash
//! # Gateway, mapping and routing tests (no database)
//! cargo test -p livraison-integration-tests
//!
//! # Everything, against a scratch PostgreSQL server
//! DATABASE_URL=postgres://localhost/postgres \
//!     cargo test -p livraison-integration-tests --features db-tests
//! ```
//!
//! `#[sqlx::test]` creates a fresh database per test and applies
//! `crates/api/migrations` to it.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use secrecy::SecretString;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use livraison_api::config::{ApiConfig, AppEnv, DEFAULT_SHOP_LABEL};
use livraison_api::db::{NewUser, UserRepository};
use livraison_api::models::{CurrentUser, User};
use livraison_api::services::auth::{hash_password, issue_token};
use livraison_api::sheets::SheetsClient;
use livraison_api::state::AppState;
use livraison_core::{Email, UserRole};

pub const JWT_SECRET: &str = "Zq4Lm8Xv2Rt6Yp0Wn3Kc7Hb1Gd5Fs9Ja";
pub const PASSWORD: &str = "correct-horse-battery";

/// Header of the reference spreadsheet tab.
pub const HEADER: [&str; 10] = [
    "N° Commande",
    "Date",
    "Client",
    "Téléphone",
    "Adresse",
    "Produit",
    "Qte",
    "Prix",
    "Boutique",
    "Statut",
];

/// Data row `CMD-1` of the reference tab.
pub const CMD_1: [&str; 10] = [
    "CMD-1",
    "2024-01-01",
    "Jean Dupont",
    "0600000000",
    "1 Rue A",
    "Widget",
    "2",
    "9.99",
    "Shop1",
    "En attente",
];

#[must_use]
pub fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| (*c).to_string()).collect()
}

#[must_use]
pub fn test_config() -> ApiConfig {
    ApiConfig {
        database_url: SecretString::from("postgres://localhost/livraison_test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: "http://localhost".to_string(),
        app_env: AppEnv::Production,
        jwt_secret: SecretString::from(JWT_SECRET),
        token_ttl: Duration::from_secs(3600),
        request_timeout: Duration::from_secs(10),
        log_json: false,
        google: None,
        default_shop: DEFAULT_SHOP_LABEL.to_string(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
        tls: None,
    }
}

/// Full application router over `pool`.
#[must_use]
pub fn test_app(pool: PgPool, sheets: Option<SheetsClient>) -> Router {
    livraison_api::app(AppState::new(test_config(), pool, sheets))
}

/// Router whose pool never connects, for requests that stop before the
/// database.
#[must_use]
pub fn offline_app() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/livraison_unused")
        .unwrap();
    test_app(pool, None)
}

/// Send one request and decode the JSON body (`Null` for non-JSON bodies).
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// `Authorization` header value for `user`.
#[must_use]
pub fn bearer(user: &CurrentUser) -> String {
    let token = issue_token(
        user,
        &SecretString::from(JWT_SECRET),
        Duration::from_secs(600),
        chrono::Utc::now().timestamp(),
    )
    .unwrap();
    format!("Bearer {token}")
}

/// Insert a user with [`PASSWORD`].
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    role: UserRole,
    shop: Option<&str>,
) -> User {
    UserRepository::new(pool)
        .create(&NewUser {
            email: Email::parse(email).unwrap(),
            name: name.to_string(),
            role,
            shop: shop.map(str::to_string),
            password_hash: hash_password(PASSWORD).unwrap(),
        })
        .await
        .unwrap()
}
