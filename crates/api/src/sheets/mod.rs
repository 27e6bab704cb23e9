//! Google Sheets gateway.
//!
//! Reads order rows from a spreadsheet tab and writes assignment marks back.
//!
//! # Architecture
//!
//! - Service-account authentication: RS256 assertion → OAuth token → API
//! - Tokens cached in memory and fetched again shortly before expiry
//! - Plain REST calls to the v4 `values` endpoints through `reqwest`
//! - Column mapping driven by a declarative synonym table ([`mapping`])
//!
//! # Security
//!
//! Spreadsheets must be shared with the service account's email. Misconfigured
//! sharing and wrong tab names are the common failures, so every error carries
//! remediation hints through [`SheetsError::suggestions`].

pub mod auth;
pub mod client;
pub mod mapping;
pub mod range;

pub use client::{CellUpdate, SheetsClient, SpreadsheetMetadata};
pub use mapping::{ColumnMap, MappingOutcome, OrderCandidate, OrderField, SheetContext};

use thiserror::Error;

/// Errors that can occur when talking to Google Sheets.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The service account cannot read or write the spreadsheet.
    #[error("access denied to spreadsheet {spreadsheet_id}: {message}")]
    AccessDenied {
        spreadsheet_id: String,
        message: String,
        service_account: Option<String>,
    },

    /// No spreadsheet with this id.
    #[error("spreadsheet {0} not found")]
    SpreadsheetNotFound(String),

    /// The sheet name cannot be expressed as an A1 range.
    #[error("unable to parse range {range}: {message}")]
    RangeParse { range: String, message: String },

    /// Writing assignment marks back to the spreadsheet failed.
    #[error("spreadsheet write-back failed: {message}")]
    ExternalWriteFailed {
        message: String,
        suggestions: Vec<String>,
    },

    /// Token exchange or signing failed.
    #[error("Google authentication failed: {0}")]
    Auth(String),

    /// Rate limited by Google.
    #[error("rate limited by Google Sheets")]
    RateLimited,

    /// Any other API error.
    #[error("Google Sheets API error {status}: {message}")]
    Api { status: u16, message: String },

    /// No service account configured.
    #[error("Google Sheets access is not configured")]
    NotConfigured,
}

impl SheetsError {
    /// Actionable hints for the operator.
    #[must_use]
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::AccessDenied {
                service_account, ..
            } => {
                let mut hints = vec![match service_account {
                    Some(email) => format!("Share the spreadsheet with {email} as Editor"),
                    None => "Share the spreadsheet with the service account as Editor".to_string(),
                }];
                hints.push("Check that the Google Sheets API is enabled for the project".to_string());
                hints
            }
            Self::SpreadsheetNotFound(_) => vec![
                "Check the spreadsheet id: it is the long token in the spreadsheet URL".to_string(),
                "Make sure the spreadsheet has not been deleted or moved".to_string(),
            ],
            Self::RangeParse { .. } => vec![
                "Check that the tab name matches exactly, including case and spaces".to_string(),
                "Avoid the characters [ ] * ? : / \\ in tab names".to_string(),
                "Use the configuration test endpoint to list available tabs".to_string(),
            ],
            Self::ExternalWriteFailed { suggestions, .. } => suggestions.clone(),
            Self::Auth(_) => vec![
                "Check GOOGLE_SERVICE_ACCOUNT_EMAIL and GOOGLE_PRIVATE_KEY".to_string(),
                "Make sure the service account key has not been revoked".to_string(),
            ],
            Self::RateLimited => vec!["Wait a minute and retry".to_string()],
            Self::NotConfigured => vec![
                "Set GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_SERVICE_ACCOUNT_EMAIL and GOOGLE_PRIVATE_KEY"
                    .to_string(),
            ],
            Self::Http(_) | Self::Parse(_) | Self::Api { .. } => {
                vec!["Retry the operation; if it keeps failing check Google service status".to_string()]
            }
        }
    }

    /// Wrap a failure that happened while writing assignment marks.
    #[must_use]
    pub fn into_write_failure(self) -> Self {
        match self {
            Self::ExternalWriteFailed { .. } => self,
            other => {
                let mut suggestions = other.suggestions();
                if matches!(other, Self::AccessDenied { .. }) {
                    suggestions.insert(
                        0,
                        "The service account needs Editor (not Viewer) access to mark rows"
                            .to_string(),
                    );
                }
                Self::ExternalWriteFailed {
                    message: other.to_string(),
                    suggestions,
                }
            }
        }
    }
}
