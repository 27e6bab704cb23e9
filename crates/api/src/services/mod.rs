//! Business logic services.
//!
//! # Services
//!
//! - `sync` - Spreadsheet reads, column mapping and best-effort reconcile
//! - `assignment` - All-or-nothing courier assignment with spreadsheet write-back
//! - `transition` - Order status changes under a row lock
//! - `auth` - Password login and bearer tokens
//! - `batch` - The two batch policies shared by sync and assignment

pub mod assignment;
pub mod auth;
pub mod batch;
mod error;
pub mod sync;
pub mod transition;

pub use assignment::{AssignmentOutcome, AssignmentRequest, AssignmentService};
pub use auth::{AuthError, AuthService};
pub use batch::{AtomicBatch, BatchPolicy, BatchReport, BestEffortBatch};
pub use error::{FieldError, ServiceError};
pub use sync::{AccessReport, Activation, SheetTable, SyncResult, SyncService, SyncSummary};
