//! Lifecycle and role enums.

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown status or role string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseEnumError {
    #[error("invalid order status: {0}")]
    OrderStatus(String),
    #[error("invalid user role: {0}")]
    UserRole(String),
}

/// Order lifecycle state.
///
/// ```text
/// pending ──assign──▶ assigned ──▶ delivered
///                         │
///                         └──────▶ cancelled
/// ```
///
/// `pending → assigned` belongs to the assignment service; the status
/// handler only moves assigned orders into a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "livraison.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Assigned,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Assigned,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Whether an order in this state must carry a courier and an assignment time.
    #[must_use]
    pub const fn requires_courier(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the status handler may move an order from `self` to `next`.
    ///
    /// Assignment is excluded: it only happens through the assignment service.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Assigned, Self::Delivered | Self::Cancelled)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseEnumError::OrderStatus(s.to_owned())),
        }
    }
}

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "livraison.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Full access, including spreadsheet configuration.
    Admin,
    /// Order intake and assignment staff, scoped to one shop.
    Closeur,
    /// Delivery courier; only handles orders assigned to them.
    Livreur,
}

impl UserRole {
    /// Staff roles may transition any order.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Closeur)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Closeur => write!(f, "closeur"),
            Self::Livreur => write!(f, "livreur"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "closeur" => Ok(Self::Closeur),
            "livreur" => Ok(Self::Livreur),
            _ => Err(ParseEnumError::UserRole(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert!("Pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_only_assigned_orders_move_to_terminal_states() {
        use OrderStatus::*;

        assert!(Assigned.can_transition_to(Delivered));
        assert!(Assigned.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Assigned));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Cancelled));
        assert!(!Assigned.can_transition_to(Pending));
        assert!(!Assigned.can_transition_to(Assigned));
        for terminal in [Delivered, Cancelled] {
            for next in OrderStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_courier_required_outside_pending() {
        assert!(!OrderStatus::Pending.requires_courier());
        assert!(OrderStatus::Assigned.requires_courier());
        assert!(OrderStatus::Delivered.requires_courier());
        assert!(OrderStatus::Cancelled.requires_courier());
    }

    #[test]
    fn test_status_serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Delivered).unwrap(),
            "\"delivered\""
        );
    }

    #[test]
    fn test_role_parse_and_staff() {
        assert_eq!("closeur".parse::<UserRole>().unwrap(), UserRole::Closeur);
        assert!(UserRole::Admin.is_staff());
        assert!(UserRole::Closeur.is_staff());
        assert!(!UserRole::Livreur.is_staff());
        assert!(matches!(
            "courier".parse::<UserRole>(),
            Err(ParseEnumError::UserRole(_))
        ));
    }
}
