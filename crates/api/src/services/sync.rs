//! Spreadsheet → order store synchronisation.
//!
//! The pipeline is `read_rows → map_rows_to_orders → reconcile`. Reconcile
//! runs under [`BestEffortBatch`]: every row is an independent statement and a
//! bad row never stops the others. Sync only touches descriptive fields, so
//! an order's lifecycle state and courier survive any number of re-syncs.
//!
//! The active configuration is read from the database on every call.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::instrument;

use livraison_core::{OrderNumber, SheetConfigId};

use super::batch::{BatchPolicy, BatchReport, BestEffortBatch, ItemOutcome};
use super::error::ServiceError;
use crate::db::{RepositoryError, orders, sheet_configs};
use crate::models::SheetConfig;
use crate::sheets::mapping::{RowError, map_rows_to_orders};
use crate::sheets::{OrderCandidate, SheetContext, SheetsClient, SheetsError, range};

/// Result of [`SyncService::test_access`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessReport {
    pub title: String,
    pub sheets: Vec<String>,
    pub sheet_exists: bool,
    pub service_account: Option<String>,
    pub suggestions: Vec<String>,
}

/// Raw cells of a tab, header split off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRows {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A tab as JSON objects keyed by header label.
#[derive(Debug, Clone, Serialize)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub data: Vec<Map<String, Value>>,
}

/// What one sync did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    #[serde(flatten)]
    pub report: BatchReport,
    /// Rows with neither an order number nor a client name.
    pub skipped: usize,
    pub total: usize,
}

/// Sync outcome as reported to API clients. A failed sync is data, not an
/// error, when it follows a successful activation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl SyncResult {
    #[must_use]
    pub fn succeeded(summary: SyncSummary) -> Self {
        Self {
            success: true,
            summary: Some(summary),
            error: None,
            suggestions: Vec::new(),
        }
    }

    #[must_use]
    pub fn failed(err: &ServiceError) -> Self {
        let suggestions = match err {
            ServiceError::Sheets(sheets) => sheets.suggestions(),
            _ => Vec::new(),
        };
        Self {
            success: false,
            summary: None,
            error: Some(err.to_string()),
            suggestions,
        }
    }
}

/// Result of [`SyncService::activate`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    pub config: SheetConfig,
    pub sync_result: SyncResult,
}

/// Spreadsheet synchronisation.
pub struct SyncService<'a> {
    pool: &'a PgPool,
    sheets: Option<&'a SheetsClient>,
    default_shop: &'a str,
}

impl<'a> SyncService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, sheets: &'a SheetsClient, default_shop: &'a str) -> Self {
        Self::with_client(pool, Some(sheets), default_shop)
    }

    /// A service that may lack a Google client. Calls that read the
    /// spreadsheet then fail with `SheetsError::NotConfigured`; activation
    /// still flips the flag and reports the failure as its sync result.
    #[must_use]
    pub const fn with_client(
        pool: &'a PgPool,
        sheets: Option<&'a SheetsClient>,
        default_shop: &'a str,
    ) -> Self {
        Self {
            pool,
            sheets,
            default_shop,
        }
    }

    fn client(&self) -> Result<&'a SheetsClient, ServiceError> {
        self.sheets
            .ok_or(ServiceError::Sheets(SheetsError::NotConfigured))
    }

    /// Check that the spreadsheet is reachable and the tab exists.
    ///
    /// A missing tab is reported, not raised, together with the tabs that do
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::AccessDenied` when the service account lacks
    /// permission, or any other gateway error.
    #[instrument(skip(self))]
    pub async fn test_access(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<AccessReport, ServiceError> {
        let sheets = self.client()?;
        let metadata = sheets.spreadsheet_metadata(spreadsheet_id).await?;
        let sheet_exists = metadata.sheets.iter().any(|s| s == sheet_name.trim());
        let suggestions = if sheet_exists {
            Vec::new()
        } else {
            missing_tab_suggestions(sheet_name, &metadata.sheets)
        };

        Ok(AccessReport {
            title: metadata.title,
            sheets: metadata.sheets,
            sheet_exists,
            service_account: sheets.service_account_email().map(str::to_string),
            suggestions,
        })
    }

    /// Read every populated row of a tab. The first row is the header.
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::RangeParse` for an unusable tab name, or any
    /// other gateway error.
    #[instrument(skip(self))]
    pub async fn read_rows(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<SheetRows, ServiceError> {
        let range = range::whole_sheet(sheet_name)?;
        let mut values = self.client()?.get_values(spreadsheet_id, &range).await?;
        if values.is_empty() {
            return Ok(SheetRows::default());
        }
        let header = values.remove(0);
        Ok(SheetRows {
            header,
            rows: values,
        })
    }

    /// Read a tab as objects keyed by header, for display.
    ///
    /// # Errors
    ///
    /// See [`SyncService::read_rows`].
    pub async fn read_table(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<SheetTable, ServiceError> {
        let rows = self.read_rows(spreadsheet_id, sheet_name).await?;
        let context = self.context(spreadsheet_id, sheet_name);
        Ok(rows_to_table(&rows, &context))
    }

    /// Sync the configuration that is active right now.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` when no configuration is active.
    #[instrument(skip(self))]
    pub async fn sync_active(&self) -> Result<SyncSummary, ServiceError> {
        let config = sheet_configs::get_active(self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("no active spreadsheet configuration".into()))?;

        self.sync_config(&config).await
    }

    /// Read, map and reconcile the tab `config` points at, then stamp the
    /// config's `last_used_at`.
    ///
    /// # Errors
    ///
    /// Returns gateway errors from reading the tab. Row-level failures are
    /// counted in the summary instead.
    #[instrument(skip(self, config), fields(config_id = %config.id, sheet = %config.sheet_name))]
    pub async fn sync_config(&self, config: &SheetConfig) -> Result<SyncSummary, ServiceError> {
        let rows = self
            .read_rows(&config.spreadsheet_id, &config.sheet_name)
            .await?;
        let context = self.context(&config.spreadsheet_id, &config.sheet_name);
        let mapped = map_rows_to_orders(&rows.header, &rows.rows, &context);

        let mut report = BatchReport::default();
        for rejected in mapped.rejected {
            report.fail(row_key(rejected.row_number), rejected.message);
        }
        let report = self.reconcile(mapped.candidates, report).await;

        let total = report.total() + mapped.skipped;
        tracing::info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            skipped = mapped.skipped,
            "Spreadsheet sync finished"
        );
        sheet_configs::touch(self.pool, config.id).await?;

        Ok(SyncSummary {
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            report,
            skipped: mapped.skipped,
            total,
        })
    }

    /// Upsert candidates into the order store.
    ///
    /// Lookup is by order number or row reference, the order-number match
    /// winning. A reference match under a different number is not the same
    /// order: its reference is cleared and the row is handled by its own
    /// number. Found orders get their descriptive fields overwritten (last
    /// sync wins); others are inserted as `pending`. A row that changes
    /// nothing is counted as unchanged, so re-running a sync is idempotent.
    ///
    /// Row failures are recorded in `report`, never returned.
    pub async fn reconcile(
        &self,
        candidates: Vec<OrderCandidate>,
        mut report: BatchReport,
    ) -> BatchReport {
        let (candidates, duplicates) = dedupe_candidates(candidates);
        for duplicate in duplicates {
            report.fail(row_key(duplicate.row_number), duplicate.message);
        }

        for candidate in candidates {
            let row_number = candidate.row_number;
            match self.reconcile_one(candidate).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    tracing::warn!(row = row_number, error = %e, "Failed to sync spreadsheet row");
                    report.fail(row_key(row_number), e.to_string());
                }
            }
        }

        match BestEffortBatch::settle(report) {
            Ok(report) | Err(report) => report,
        }
    }

    async fn reconcile_one(&self, candidate: OrderCandidate) -> Result<ItemOutcome, RepositoryError> {
        let OrderCandidate {
            mut details,
            date_from_sheet,
            ..
        } = candidate;

        let mut tx = self.pool.begin().await?;
        let matched = orders::find_for_sync(
            &mut *tx,
            &details.numero_commande,
            details.google_sheets_id.as_deref(),
        )
        .await?;

        // A reference match under another number means rows moved in the
        // sheet. That order keeps its identity and loses the stale reference.
        let existing = match matched {
            Some(order) if order.numero_commande == details.numero_commande => Some(order),
            Some(stale) => {
                tracing::info!(
                    order = %stale.numero_commande,
                    row_order = %details.numero_commande,
                    "Spreadsheet row now holds another order, releasing its reference"
                );
                None
            }
            None => None,
        };
        if let Some(sheet_ref) = details.google_sheets_id.as_deref() {
            orders::release_sheet_ref(&mut *tx, sheet_ref, existing.as_ref().map(|o| o.id))
                .await?;
        }

        let Some(order) = existing else {
            orders::insert_pending(&mut *tx, &details).await?;
            tx.commit().await?;
            return Ok(ItemOutcome::Created);
        };

        // Without a date cell the row would otherwise move the order to the
        // sync time on every run
        if !date_from_sheet {
            details.date_commande = order.date_commande;
        }
        if !details.differs_from(&order) {
            tx.commit().await?;
            return Ok(ItemOutcome::Unchanged);
        }
        orders::update_details(&mut *tx, order.id, &details).await?;
        tx.commit().await?;
        Ok(ItemOutcome::Updated)
    }

    /// Make `id` the only active configuration, then sync it.
    ///
    /// The flag flip commits before the sync runs: a failing sync is
    /// reported in [`Activation::sync_result`] and the activation stays.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown id, with nothing
    /// changed.
    #[instrument(skip(self))]
    pub async fn activate(&self, id: SheetConfigId) -> Result<Activation, ServiceError> {
        let mut tx = self.pool.begin().await?;
        sheet_configs::lock_for_activation(&mut *tx).await?;
        if sheet_configs::get(&mut *tx, id).await?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "spreadsheet configuration {id} not found"
            )));
        }
        sheet_configs::clear_active(&mut *tx).await?;
        let config = sheet_configs::set_active(&mut *tx, id).await?;
        tx.commit().await?;

        tracing::info!(config_id = %config.id, name = %config.name, "Activated spreadsheet configuration");

        let outcome = self.sync_config(&config).await;
        let (config, sync_result) = match outcome {
            Ok(summary) => {
                // Pick up the `last_used_at` the import just stamped
                let config = match sheet_configs::get(self.pool, config.id).await {
                    Ok(Some(fresh)) => fresh,
                    _ => config,
                };
                (config, SyncResult::succeeded(summary))
            }
            Err(e) => {
                tracing::warn!(config_id = %config.id, error = %e, "Sync after activation failed");
                let sync_result = SyncResult::failed(&e);
                (config, sync_result)
            }
        };

        Ok(Activation {
            config,
            sync_result,
        })
    }

    fn context<'c>(&self, spreadsheet_id: &'c str, sheet_name: &'c str) -> SheetContext<'c>
    where
        'a: 'c,
    {
        SheetContext {
            spreadsheet_id,
            sheet_name,
            default_shop: self.default_shop,
        }
    }
}

fn row_key(row_number: u32) -> String {
    format!("row {row_number}")
}

fn missing_tab_suggestions(sheet_name: &str, available: &[String]) -> Vec<String> {
    let mut hints = vec![format!("No tab named '{}' in this spreadsheet", sheet_name.trim())];
    if available.is_empty() {
        hints.push("The spreadsheet has no tabs".to_string());
    } else {
        hints.push(format!("Available tabs: {}", available.join(", ")));
    }
    hints
}

/// Keep the first candidate per order number; later ones become row errors.
fn dedupe_candidates(candidates: Vec<OrderCandidate>) -> (Vec<OrderCandidate>, Vec<RowError>) {
    let mut first_seen: HashMap<OrderNumber, u32> = HashMap::new();
    let mut kept = Vec::with_capacity(candidates.len());
    let mut duplicates = Vec::new();

    for candidate in candidates {
        let number = candidate.details.numero_commande.clone();
        if let Some(first) = first_seen.get(&number) {
            duplicates.push(RowError {
                row_number: candidate.row_number,
                message: format!("order number {number} already used on row {first}"),
            });
            continue;
        }
        first_seen.insert(number, candidate.row_number);
        kept.push(candidate);
    }

    (kept, duplicates)
}

fn rows_to_table(rows: &SheetRows, context: &SheetContext<'_>) -> SheetTable {
    let headers: Vec<String> = rows.header.iter().map(|h| h.trim().to_string()).collect();
    let mut data = Vec::new();

    for (index, row) in rows.rows.iter().enumerate() {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row_number = u32::try_from(index + 2).unwrap_or(u32::MAX);
        let mut object = Map::new();
        for (column, label) in headers.iter().enumerate() {
            if label.is_empty() {
                continue;
            }
            let cell = row.get(column).cloned().unwrap_or_default();
            object.insert(label.clone(), Value::String(cell));
        }
        object.insert("_rowNumber".to_string(), Value::from(row_number));
        object.insert(
            "_googleSheetsId".to_string(),
            Value::String(context.row_reference(row_number)),
        );
        data.push(object);
    }

    SheetTable { headers, data }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use livraison_core::LineItem;
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::OrderDetails;

    const CONTEXT: SheetContext<'static> = SheetContext {
        spreadsheet_id: "sheet-abc",
        sheet_name: "Sheet1",
        default_shop: "Boutique principale",
    };

    fn candidate(number: &str, row_number: u32) -> OrderCandidate {
        OrderCandidate {
            row_number,
            date_from_sheet: true,
            details: OrderDetails {
                numero_commande: OrderNumber::parse(number).unwrap(),
                google_sheets_id: Some(CONTEXT.row_reference(row_number)),
                date_commande: Utc::now(),
                client_nom: "Client".to_string(),
                client_telephone: String::new(),
                adresse: String::new(),
                articles: vec![LineItem::new("Widget", 1, Decimal::ONE).unwrap()],
                boutique: "Shop1".to_string(),
                sheet_status: None,
            },
        }
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_duplicate_numbers_keep_first_row() {
        let (kept, duplicates) = dedupe_candidates(vec![
            candidate("CMD-1", 2),
            candidate("CMD-2", 3),
            candidate("CMD-1", 4),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].row_number, 2);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].row_number, 4);
        assert!(duplicates[0].message.contains("row 2"));
    }

    #[test]
    fn test_table_keys_rows_by_header() {
        let rows = SheetRows {
            header: strings(&["N° Commande", " Client ", ""]),
            rows: vec![
                strings(&["CMD-1", "Jean", "ignored"]),
                strings(&["", "  ", ""]),
                strings(&["CMD-2"]),
            ],
        };
        let table = rows_to_table(&rows, &CONTEXT);

        assert_eq!(table.headers, strings(&["N° Commande", "Client", ""]));
        assert_eq!(table.data.len(), 2);

        let first = &table.data[0];
        assert_eq!(first["N° Commande"], "CMD-1");
        assert_eq!(first["Client"], "Jean");
        assert_eq!(first["_rowNumber"], 2);
        assert_eq!(first["_googleSheetsId"], "sheet-abc:Sheet1:2");
        assert!(!first.contains_key(""));

        // Blank row 3 is skipped, short row 4 is padded
        let second = &table.data[1];
        assert_eq!(second["_rowNumber"], 4);
        assert_eq!(second["Client"], "");
    }

    #[test]
    fn test_missing_tab_lists_available_tabs() {
        let hints = missing_tab_suggestions("Orders", &strings(&["Sheet1", "Mai"]));
        assert!(hints[0].contains("Orders"));
        assert_eq!(hints[1], "Available tabs: Sheet1, Mai");
    }

    #[test]
    fn test_failed_sync_result_carries_suggestions() {
        let result = SyncResult::failed(&ServiceError::Sheets(SheetsError::RangeParse {
            range: "'a:b'".to_string(),
            message: "bad".to_string(),
        }));
        assert!(!result.success);
        assert!(result.summary.is_none());
        assert!(result.error.unwrap().contains("unable to parse range"));
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_sync_result_flattens_counters() {
        let mut report = BatchReport::default();
        report.record(ItemOutcome::Created);
        let json = serde_json::to_value(SyncResult::succeeded(SyncSummary {
            spreadsheet_id: "sheet-abc".to_string(),
            sheet_name: "Sheet1".to_string(),
            report,
            skipped: 0,
            total: 1,
        }))
        .unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["created"], 1);
        assert_eq!(json["total"], 1);
        assert!(json.get("error").is_none());
    }
}
