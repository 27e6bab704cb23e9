//! Domain models for the API.
//!
//! Storage rows are converted into these types by the repositories in
//! [`crate::db`]; handlers serialise them directly.

pub mod order;
pub mod sheet_config;
pub mod user;

pub use order::{Order, OrderDetails, OrderInvariantError};
pub use sheet_config::{SheetConfig, SheetConfigInput};
pub use user::{CurrentUser, User, keys};
