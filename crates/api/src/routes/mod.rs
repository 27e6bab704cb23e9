//! HTTP routes.
//!
//! Route groups and the guards in front of them:
//!
//! | Group | Guard |
//! |---|---|
//! | `/health`, `/auth/login`, `/auth/logout` | none |
//! | `/orders`, `/orders/{id}/status`, `/auth/me` | any authenticated role |
//! | `/orders/assign-from-sheets`, `/google-sheets/data`, `/google-sheets/sync-orders` | admin, closeur |
//! | `/google-sheets/config/*` | admin |

pub mod auth;
mod extract;
pub mod health;
pub mod orders;
pub mod sheets;

use axum::{Router, middleware::from_fn_with_state};

use crate::middleware::{AllowedRoles, require_auth, require_roles};
use crate::state::AppState;

pub use extract::{JsonBody, PathParam, QueryParams};

/// Build every route with its guards. Needs the state for the auth layer.
pub fn routes(state: &AppState) -> Router<AppState> {
    let staff = Router::new()
        .merge(orders::staff_router())
        .merge(sheets::staff_router())
        .route_layer(from_fn_with_state(AllowedRoles::STAFF, require_roles));

    let admin = sheets::admin_router()
        .route_layer(from_fn_with_state(AllowedRoles::ADMIN, require_roles));

    let authenticated = Router::new()
        .merge(orders::router())
        .merge(auth::router())
        .merge(staff)
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(health::router())
        .merge(auth::public_router())
        .merge(authenticated)
}
