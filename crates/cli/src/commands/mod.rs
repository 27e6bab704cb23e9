//! CLI command implementations.

pub mod migrate;
pub mod sync;
pub mod user;

use secrecy::SecretString;
use sqlx::PgPool;

/// Environment variable holding the database URL, shared with the API.
pub const DATABASE_URL_VAR: &str = "LIVRAISON_DATABASE_URL";

/// Errors shared by every command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Load `.env` and connect to the Livraison database.
///
/// # Errors
///
/// Returns `CommandError` if the URL is missing or the connection fails.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var(DATABASE_URL_VAR)
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar(DATABASE_URL_VAR))?;

    tracing::info!("Connecting to Livraison database...");
    Ok(livraison_api::db::create_pool(&database_url).await?)
}
