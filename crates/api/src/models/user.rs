//! User domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use livraison_core::{Email, UserId, UserRole};

/// A user account (admin, closeur or livreur).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub role: UserRole,
    /// Shop a closeur works for.
    pub shop: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this user can receive assignments.
    #[must_use]
    pub fn is_assignable_courier(&self) -> bool {
        self.active && self.role == UserRole::Livreur
    }
}

/// Identity resolved for the current request.
///
/// Stored in the session and carried in bearer token claims, so it must stay
/// small and serialisable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub role: UserRole,
    pub shop: Option<String>,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            shop: user.shop.clone(),
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
