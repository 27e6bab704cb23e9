//! Manual spreadsheet sync.
//!
//! ```bash
//! lv-cli sync
//! ```
//!
//! Runs the same pipeline as `POST /google-sheets/sync-orders` against the
//! active configuration. Google credentials come from the same variables as
//! the API server.

use livraison_api::config::{ConfigError, DEFAULT_SHOP_LABEL, GoogleConfig};
use livraison_api::services::{ServiceError, SyncService};
use livraison_api::sheets::{SheetsClient, SheetsError};

use super::{CommandError, connect};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sheets(#[from] SheetsError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Sync the active configuration once and log the report.
///
/// # Errors
///
/// Returns `SyncError` when credentials are missing, no configuration is
/// active, or the spreadsheet cannot be read.
pub async fn run() -> Result<(), SyncError> {
    let pool = connect().await?;
    let google = GoogleConfig::from_env()?.ok_or(SheetsError::NotConfigured)?;
    let sheets = SheetsClient::new(&google)?;
    let default_shop =
        std::env::var("SHEETS_DEFAULT_SHOP").unwrap_or_else(|_| DEFAULT_SHOP_LABEL.to_string());

    let summary = SyncService::new(&pool, &sheets, &default_shop)
        .sync_active()
        .await?;

    tracing::info!(
        spreadsheet_id = %summary.spreadsheet_id,
        sheet = %summary.sheet_name,
        created = summary.report.created,
        updated = summary.report.updated,
        unchanged = summary.report.unchanged,
        failed = summary.report.failed,
        skipped = summary.skipped,
        "Sync complete"
    );
    for error in &summary.report.errors {
        tracing::warn!(item = %error.field, "{}", error.message);
    }
    Ok(())
}
