//! Core types for Livraison.
//!
//! This module provides type-safe wrappers for the delivery domain.

pub mod email;
pub mod id;
pub mod line_item;
pub mod order_number;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use line_item::{LineItem, LineItemError, order_total};
pub use order_number::{OrderNumber, OrderNumberError};
pub use status::*;
