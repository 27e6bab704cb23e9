//! Order domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use livraison_core::{LineItem, OrderId, OrderNumber, OrderStatus, UserId, order_total};
use rust_decimal::Decimal;

/// Violations of the courier/state coupling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderInvariantError {
    #[error("order {0} is {1} but has no courier or assignment time")]
    MissingCourier(String, OrderStatus),
    #[error("order {0} is pending but carries a courier")]
    UnexpectedCourier(String),
    #[error("order {0} has no line items")]
    NoLineItems(String),
}

/// An order as stored and served.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub numero_commande: OrderNumber,
    pub google_sheets_id: Option<String>,
    pub date_commande: DateTime<Utc>,
    pub client_nom: String,
    pub client_telephone: String,
    pub adresse: String,
    pub articles: Vec<LineItem>,
    pub boutique: String,
    pub status: OrderStatus,
    pub livreur_id: Option<UserId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Raw text of the spreadsheet status column, informational only.
    pub sheet_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Courier and assignment time are present exactly when the order has
    /// left `pending`, and an order always has at least one line item.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn check_invariants(&self) -> Result<(), OrderInvariantError> {
        let number = self.numero_commande.to_string();
        if self.articles.is_empty() {
            return Err(OrderInvariantError::NoLineItems(number));
        }
        let has_courier = self.livreur_id.is_some() && self.assigned_at.is_some();
        if self.status.requires_courier() && !has_courier {
            return Err(OrderInvariantError::MissingCourier(number, self.status));
        }
        if !self.status.requires_courier()
            && (self.livreur_id.is_some() || self.assigned_at.is_some())
        {
            return Err(OrderInvariantError::UnexpectedCourier(number));
        }
        Ok(())
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        order_total(&self.articles)
    }

    /// Whether `user_id` is the courier this order is assigned to.
    #[must_use]
    pub fn is_assigned_to(&self, user_id: UserId) -> bool {
        self.livreur_id == Some(user_id)
    }
}

/// Descriptive fields of an order: everything a spreadsheet row or an
/// assignment item can provide. Lifecycle fields are never part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    pub numero_commande: OrderNumber,
    pub google_sheets_id: Option<String>,
    pub date_commande: DateTime<Utc>,
    pub client_nom: String,
    pub client_telephone: String,
    pub adresse: String,
    pub articles: Vec<LineItem>,
    pub boutique: String,
    pub sheet_status: Option<String>,
}

impl OrderDetails {
    /// Whether applying `self` to `order` would change anything.
    #[must_use]
    pub fn differs_from(&self, order: &Order) -> bool {
        self.numero_commande != order.numero_commande
            || self.google_sheets_id != order.google_sheets_id
            || self.date_commande != order.date_commande
            || self.client_nom != order.client_nom
            || self.client_telephone != order.client_telephone
            || self.adresse != order.adresse
            || self.articles != order.articles
            || self.boutique != order.boutique
            || self.sheet_status != order.sheet_status
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn order(status: OrderStatus, courier: Option<i32>) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(1),
            numero_commande: OrderNumber::parse("CMD-1").unwrap(),
            google_sheets_id: Some("sheet:Sheet1:2".to_string()),
            date_commande: now,
            client_nom: "Jean Dupont".to_string(),
            client_telephone: "0600000000".to_string(),
            adresse: "1 Rue A".to_string(),
            articles: vec![LineItem::new("Widget", 2, Decimal::from_str("9.99").unwrap()).unwrap()],
            boutique: "Shop1".to_string(),
            status,
            livreur_id: courier.map(UserId::new),
            assigned_at: courier.map(|_| now),
            delivered_at: None,
            sheet_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_courier_present_iff_not_pending() {
        assert!(order(OrderStatus::Pending, None).check_invariants().is_ok());
        assert!(order(OrderStatus::Assigned, Some(4)).check_invariants().is_ok());
        assert!(order(OrderStatus::Delivered, Some(4)).check_invariants().is_ok());

        assert!(matches!(
            order(OrderStatus::Assigned, None).check_invariants(),
            Err(OrderInvariantError::MissingCourier(_, OrderStatus::Assigned))
        ));
        assert!(matches!(
            order(OrderStatus::Pending, Some(4)).check_invariants(),
            Err(OrderInvariantError::UnexpectedCourier(_))
        ));
    }

    #[test]
    fn test_empty_articles_rejected() {
        let mut o = order(OrderStatus::Pending, None);
        o.articles.clear();
        assert!(matches!(
            o.check_invariants(),
            Err(OrderInvariantError::NoLineItems(_))
        ));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(order(OrderStatus::Assigned, Some(4))).unwrap();
        assert_eq!(json["numeroCommande"], "CMD-1");
        assert_eq!(json["status"], "assigned");
        assert_eq!(json["livreurId"], 4);
        assert_eq!(json["articles"][0]["nom"], "Widget");
        assert!(json.get("googleSheetsId").is_some());
    }

    #[test]
    fn test_details_change_detection() {
        let o = order(OrderStatus::Pending, None);
        let details = OrderDetails {
            numero_commande: o.numero_commande.clone(),
            google_sheets_id: o.google_sheets_id.clone(),
            date_commande: o.date_commande,
            client_nom: o.client_nom.clone(),
            client_telephone: o.client_telephone.clone(),
            adresse: o.adresse.clone(),
            articles: o.articles.clone(),
            boutique: o.boutique.clone(),
            sheet_status: None,
        };
        assert!(!details.differs_from(&o));

        let moved = OrderDetails {
            adresse: "2 Rue B".to_string(),
            ..details
        };
        assert!(moved.differs_from(&o));
        assert_eq!(o.total(), Decimal::from_str("19.98").unwrap());
    }
}
