//! Google Sheets v4 REST client.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::instrument;
use url::Url;

use super::SheetsError;
use super::auth::{GoogleToken, fetch_token};
use crate::config::GoogleConfig;

/// Google Sheets API client.
///
/// Cheap to clone; all clones share one HTTP client and one token cache.
///
/// # Authentication
///
/// Uses service-account tokens fetched lazily on the first call and again
/// whenever the cached token is about to expire. A 401 from the API drops the
/// cached token so the next call starts fresh.
#[derive(Clone)]
pub struct SheetsClient {
    inner: Arc<SheetsClientInner>,
}

struct SheetsClientInner {
    http: reqwest::Client,
    api_base: String,
    credentials: Credentials,
    /// In-memory token cache
    token: RwLock<Option<GoogleToken>>,
}

enum Credentials {
    ServiceAccount(GoogleConfig),
    /// Fixed bearer token, used against mock servers.
    Static(SecretString),
}

/// Title and tab names of a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpreadsheetMetadata {
    pub title: String,
    pub sheets: Vec<String>,
}

/// One value to write into one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    /// A1 range of a single cell.
    pub range: String,
    pub value: String,
}

/// Counters returned by a batch write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchUpdateSummary {
    pub updated_rows: u32,
    pub updated_cells: u32,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize)]
struct SpreadsheetResponse {
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest<'a> {
    value_input_option: &'static str,
    data: Vec<ValueRangeBody<'a>>,
}

#[derive(Serialize)]
struct ValueRangeBody<'a> {
    range: &'a str,
    values: [[&'a str; 1]; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateResponse {
    #[serde(default)]
    total_updated_rows: u32,
    #[serde(default)]
    total_updated_cells: u32,
}

#[derive(Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorBody,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetsClient {
    /// Create a client authenticating as the configured service account.
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::Http` if the HTTP client cannot be built.
    pub fn new(config: &GoogleConfig) -> Result<Self, SheetsError> {
        Self::build(
            config.api_base.clone(),
            Credentials::ServiceAccount(config.clone()),
        )
    }

    /// Create a client that sends a fixed bearer token to `api_base`.
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::Http` if the HTTP client cannot be built.
    pub fn with_static_token(
        api_base: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, SheetsError> {
        Self::build(
            api_base.into(),
            Credentials::Static(SecretString::from(token.into())),
        )
    }

    fn build(api_base: String, credentials: Credentials) -> Result<Self, SheetsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(SheetsClientInner {
                http,
                api_base: api_base.trim_end_matches('/').to_string(),
                credentials,
                token: RwLock::new(None),
            }),
        })
    }

    /// Identity spreadsheets must be shared with.
    #[must_use]
    pub fn service_account_email(&self) -> Option<&str> {
        match &self.inner.credentials {
            Credentials::ServiceAccount(config) => Some(&config.client_email),
            Credentials::Static(_) => None,
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    async fn access_token(&self) -> Result<SecretString, SheetsError> {
        let config = match &self.inner.credentials {
            Credentials::Static(token) => return Ok(token.clone()),
            Credentials::ServiceAccount(config) => config,
        };

        if let Some(token) = self.inner.token.read().await.as_ref()
            && !token.is_expired()
        {
            return Ok(token.access_token.clone());
        }

        let mut guard = self.inner.token.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(token) = guard.as_ref()
            && !token.is_expired()
        {
            return Ok(token.access_token.clone());
        }
        let token = fetch_token(&self.inner.http, config).await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    async fn clear_token(&self) {
        *self.inner.token.write().await = None;
    }

    // =========================================================================
    // Requests
    // =========================================================================

    fn url(&self, spreadsheet_id: &str, suffix: &str) -> Result<Url, SheetsError> {
        let raw = format!(
            "{}/v4/spreadsheets/{}{suffix}",
            self.inner.api_base,
            urlencoding::encode(spreadsheet_id)
        );
        Url::parse(&raw).map_err(|e| SheetsError::Api {
            status: 0,
            message: format!("invalid API URL {raw}: {e}"),
        })
    }

    /// Turn a non-success response into the matching error kind.
    async fn error_from_response(
        &self,
        response: reqwest::Response,
        spreadsheet_id: &str,
        range: Option<&str>,
    ) -> SheetsError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GoogleErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        match status.as_u16() {
            400 if message.contains("Unable to parse range") => SheetsError::RangeParse {
                range: range.unwrap_or_default().to_string(),
                message,
            },
            401 => {
                self.clear_token().await;
                SheetsError::Auth(message)
            }
            403 => SheetsError::AccessDenied {
                spreadsheet_id: spreadsheet_id.to_string(),
                message,
                service_account: self.service_account_email().map(str::to_string),
            },
            404 => SheetsError::SpreadsheetNotFound(spreadsheet_id.to_string()),
            429 => SheetsError::RateLimited,
            code => SheetsError::Api {
                status: code,
                message,
            },
        }
    }

    /// Fetch the spreadsheet title and its tab names.
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::AccessDenied` if the service account cannot read
    /// the spreadsheet, `SheetsError::SpreadsheetNotFound` for an unknown id.
    #[instrument(skip(self))]
    pub async fn spreadsheet_metadata(
        &self,
        spreadsheet_id: &str,
    ) -> Result<SpreadsheetMetadata, SheetsError> {
        let mut url = self.url(spreadsheet_id, "")?;
        url.query_pairs_mut()
            .append_pair("fields", "properties.title,sheets.properties.title");

        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_from_response(response, spreadsheet_id, None).await);
        }

        let body: SpreadsheetResponse = response.json().await?;
        Ok(SpreadsheetMetadata {
            title: body.properties.title,
            sheets: body.sheets.into_iter().map(|s| s.properties.title).collect(),
        })
    }

    /// Read a range as rows of display strings.
    ///
    /// Rows are padded with empty cells to the widest row, so the result is
    /// rectangular.
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::RangeParse` if Google cannot parse `range`, plus
    /// the access errors of [`Self::spreadsheet_metadata`].
    #[instrument(skip(self))]
    pub async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let mut url = self.url(
            spreadsheet_id,
            &format!("/values/{}", urlencoding::encode(range)),
        )?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "FORMATTED_VALUE");

        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self
                .error_from_response(response, spreadsheet_id, Some(range))
                .await);
        }

        let body: ValueRangeResponse = response.json().await?;
        let width = body.values.iter().map(Vec::len).max().unwrap_or(0);
        let rows = body
            .values
            .into_iter()
            .map(|row| {
                let mut cells: Vec<String> = row.into_iter().map(cell_to_string).collect();
                cells.resize(width, String::new());
                cells
            })
            .collect();

        Ok(rows)
    }

    /// Write single-cell values in one request.
    ///
    /// Values are entered as if typed by a user.
    ///
    /// # Errors
    ///
    /// Returns the same error kinds as [`Self::get_values`].
    #[instrument(skip(self, updates), fields(cells = updates.len()))]
    pub async fn batch_update(
        &self,
        spreadsheet_id: &str,
        updates: &[CellUpdate],
    ) -> Result<BatchUpdateSummary, SheetsError> {
        if updates.is_empty() {
            return Ok(BatchUpdateSummary::default());
        }

        let url = self.url(spreadsheet_id, "/values:batchUpdate")?;
        let body = BatchUpdateRequest {
            value_input_option: "USER_ENTERED",
            data: updates
                .iter()
                .map(|u| ValueRangeBody {
                    range: &u.range,
                    values: [[u.value.as_str()]],
                })
                .collect(),
        };

        let token = self.access_token().await?;
        let response = self
            .inner
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let first = updates.first().map(|u| u.range.as_str());
            return Err(self
                .error_from_response(response, spreadsheet_id, first)
                .await);
        }

        let summary: BatchUpdateResponse = response.json().await?;
        tracing::info!(
            spreadsheet_id,
            rows = summary.total_updated_rows,
            cells = summary.total_updated_cells,
            "Spreadsheet cells updated"
        );
        Ok(BatchUpdateSummary {
            updated_rows: summary.total_updated_rows,
            updated_cells: summary.total_updated_cells,
        })
    }
}
