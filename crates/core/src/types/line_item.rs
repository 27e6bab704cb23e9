//! Order line items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors raised by [`LineItem::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LineItemError {
    #[error("product name cannot be empty")]
    EmptyName,
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("unit price cannot be negative (got {0})")]
    NegativePrice(Decimal),
}

/// One product line of an order.
///
/// Field names on the wire follow the intake spreadsheet vocabulary
/// (`nom`, `quantite`, `prix`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(rename = "quantite")]
    pub quantity: u32,
    #[serde(rename = "prix", with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

impl LineItem {
    /// Build a validated line item. The name is trimmed.
    ///
    /// # Errors
    ///
    /// See [`LineItem::validate`].
    pub fn new(
        name: impl Into<String>,
        quantity: u32,
        unit_price: Decimal,
    ) -> Result<Self, LineItemError> {
        let item = Self {
            name: name.into().trim().to_owned(),
            quantity,
            unit_price,
        };
        item.validate()?;
        Ok(item)
    }

    /// Check the line item invariants.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name, a zero quantity or a negative price.
    pub fn validate(&self) -> Result<(), LineItemError> {
        if self.name.trim().is_empty() {
            return Err(LineItemError::EmptyName);
        }
        if self.quantity == 0 {
            return Err(LineItemError::ZeroQuantity);
        }
        if self.unit_price.is_sign_negative() && !self.unit_price.is_zero() {
            return Err(LineItemError::NegativePrice(self.unit_price));
        }
        Ok(())
    }

    /// `quantity × unit_price`.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Sum of all line subtotals.
#[must_use]
pub fn order_total(items: &[LineItem]) -> Decimal {
    items.iter().map(LineItem::subtotal).sum()
}
