//! User management commands.
//!
//! ```bash
//! lv-cli user create -e admin@livraison.sn -n "Awa Ndiaye" -r admin -p 'long-password'
//! lv-cli user create -e closeur@livraison.sn -n "Fatou Sarr" -r closeur --shop "Dakar Centre"
//! lv-cli user list -r livreur
//! ```
//!
//! The password may also come from `LIVRAISON_USER_PASSWORD`.

use livraison_api::db::{NewUser, RepositoryError, UserRepository};
use livraison_api::services::AuthError;
use livraison_api::services::auth::hash_password;
use livraison_core::{Email, UserId, UserRole};

use super::{CommandError, connect};

const PASSWORD_VAR: &str = "LIVRAISON_USER_PASSWORD";

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Invalid role: {0}. Valid roles: admin, closeur, livreur")]
    InvalidRole(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("A closeur needs a shop (--shop)")]
    MissingShop,

    #[error("No password given: pass --password or set {PASSWORD_VAR}")]
    MissingPassword,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Create a user with a password.
///
/// # Errors
///
/// Returns `UserError` for invalid input, a taken email or database failures.
pub async fn create(
    email: &str,
    name: &str,
    role: &str,
    shop: Option<String>,
    password: Option<String>,
) -> Result<UserId, UserError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|_| UserError::InvalidEmail(email.to_owned()))?;
    let shop = shop.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    if role == UserRole::Closeur && shop.is_none() {
        return Err(UserError::MissingShop);
    }

    let pool = connect().await?;
    let password = password
        .or_else(|| std::env::var(PASSWORD_VAR).ok())
        .ok_or(UserError::MissingPassword)?;

    let user = UserRepository::new(&pool)
        .create(&NewUser {
            email,
            name: name.trim().to_string(),
            role,
            shop,
            password_hash: hash_password(&password)?,
        })
        .await?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(user.id)
}

/// Print users, optionally only one role.
///
/// # Errors
///
/// Returns `UserError` for an unknown role or database failures.
pub async fn list(role: Option<&str>) -> Result<(), UserError> {
    let role = role
        .map(|r| r.parse::<UserRole>().map_err(|_| UserError::InvalidRole(r.to_owned())))
        .transpose()?;

    let pool = connect().await?;
    let users = UserRepository::new(&pool).list(role).await?;

    #[allow(clippy::print_stdout)]
    for user in &users {
        println!(
            "{:>5}  {:<8}  {:<32}  {}{}{}",
            user.id.as_i32(),
            user.role.to_string(),
            user.email.as_str(),
            user.name,
            user.shop
                .as_deref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default(),
            if user.active { "" } else { " (inactive)" },
        );
    }
    tracing::info!("{} user(s)", users.len());
    Ok(())
}
