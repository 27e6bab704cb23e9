//! Livraison Core - Shared domain types.
//!
//! This crate provides the types shared by every Livraison component:
//! - `api` - REST backend (orders, spreadsheet sync, courier assignment)
//! - `cli` - Command-line tools for migrations, users and manual syncs
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. Database encoding is opt-in via the `postgres`
//! feature.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, order lifecycle, roles, order numbers, line items, emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
