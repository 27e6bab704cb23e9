//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::error::AppError;
use crate::sheets::{SheetsClient, SheetsError};

/// Application state shared across all handlers.
///
/// Cheap to clone. Holds no cached business data: the active spreadsheet
/// configuration is always read from the database.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    sheets: Option<SheetsClient>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ApiConfig, pool: PgPool, sheets: Option<SheetsClient>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                sheets,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Google Sheets client, if credentials are configured.
    #[must_use]
    pub fn sheets_client(&self) -> Option<&SheetsClient> {
        self.inner.sheets.as_ref()
    }

    /// Google Sheets client for handlers that cannot work without one.
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::NotConfigured` wrapped in `AppError`.
    pub fn sheets(&self) -> Result<&SheetsClient, AppError> {
        self.sheets_client()
            .ok_or(AppError::Sheets(SheetsError::NotConfigured))
    }
}
