//! Order status transitions.
//!
//! The permission check and the write share one transaction, with the order
//! row locked by `SELECT … FOR UPDATE`, so two concurrent transitions on the
//! same order serialise and the second one sees the first one's result.

use std::str::FromStr;

use chrono::Utc;
use sqlx::PgPool;
use tracing::instrument;

use livraison_core::{OrderId, OrderStatus, UserRole};

use super::error::ServiceError;
use crate::db::orders;
use crate::models::{CurrentUser, Order};

/// Whether `actor` may touch `order` at all, regardless of the target state.
///
/// # Errors
///
/// Returns `ServiceError::Forbidden` for a courier acting on someone else's
/// order, or a closeur acting outside their shop.
pub fn check_actor(actor: &CurrentUser, order: &Order) -> Result<(), ServiceError> {
    match actor.role {
        UserRole::Admin => Ok(()),
        UserRole::Closeur => match actor.shop.as_deref() {
            Some(shop) if shop == order.boutique => Ok(()),
            _ => Err(ServiceError::Forbidden(format!(
                "order {} belongs to another shop",
                order.numero_commande
            ))),
        },
        UserRole::Livreur if order.is_assigned_to(actor.id) => Ok(()),
        UserRole::Livreur => Err(ServiceError::Forbidden(format!(
            "order {} is not assigned to you",
            order.numero_commande
        ))),
    }
}

/// Move order `id` to the state named `requested`.
///
/// # Errors
///
/// - `ServiceError::InvalidInput` for an unknown state name
/// - `ServiceError::NotFound` for an unknown order
/// - `ServiceError::Forbidden` when the caller may not act on the order
/// - `ServiceError::InvalidState` for a move the lifecycle does not allow
///
/// The order is unchanged in every error case.
#[instrument(skip(pool, actor), fields(user_id = %actor.id, role = %actor.role))]
pub async fn transition(
    pool: &PgPool,
    actor: &CurrentUser,
    id: OrderId,
    requested: &str,
) -> Result<Order, ServiceError> {
    let next = OrderStatus::from_str(requested.trim()).map_err(|e| {
        ServiceError::invalid(
            format!("Unknown status '{requested}'"),
            "status",
            e.to_string(),
        )
    })?;

    let mut tx = pool.begin().await?;
    let order = orders::get_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {id} not found")))?;

    check_actor(actor, &order)?;

    if !order.status.can_transition_to(next) {
        return Err(ServiceError::InvalidState(format!(
            "order {} cannot go from {} to {next}",
            order.numero_commande, order.status
        )));
    }

    let delivered_at = (next == OrderStatus::Delivered).then(Utc::now);
    let updated = orders::set_status(&mut *tx, id, next, delivered_at).await?;
    tx.commit().await?;

    tracing::info!(
        order = %updated.numero_commande,
        from = %order.status,
        to = %next,
        "Order status changed"
    );
    Ok(updated)
}
