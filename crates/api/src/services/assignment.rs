//! Batch assignment of orders to a courier.
//!
//! One database transaction covers the whole batch ([`AtomicBatch`]). Each
//! item runs inside its own savepoint so a failing item is recorded without
//! poisoning the transaction; once the loop ends, any failure rolls the batch
//! back. When every item succeeded the spreadsheet rows are marked, and a
//! failed write-back rolls back every upsert as well.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Acquire, PgConnection, PgPool};
use tracing::instrument;

use livraison_core::{LineItem, OrderNumber, UserId};

use super::batch::{AtomicBatch, BatchPolicy, BatchReport, ItemOutcome};
use super::error::ServiceError;
use crate::db::{orders, sheet_configs, users};
use crate::models::{Order, OrderDetails, SheetConfig, User};
use crate::sheets::mapping::{
    UNKNOWN_CLIENT, UNKNOWN_PRODUCT, parse_price, parse_quantity, parse_sheet_date,
};
use crate::sheets::{CellUpdate, ColumnMap, OrderField, SheetsClient, SheetsError, range};

/// Value written into the status column of assigned rows.
pub const ASSIGNED_MARK: &str = "Attribuée";

/// Body of `POST /orders/assign-from-sheets`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    #[serde(default)]
    pub livreur_id: Option<UserId>,
    #[serde(default)]
    pub sheet_orders: Vec<AssignmentItem>,
}

/// One order of an assignment batch, usually a spreadsheet row picked in
/// the UI. Numeric cells may arrive as JSON numbers or strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentItem {
    #[serde(default)]
    pub numero_commande: Option<Value>,
    #[serde(default)]
    pub google_sheets_id: Option<Value>,
    #[serde(default)]
    pub date_commande: Option<String>,
    #[serde(default)]
    pub client_nom: Option<String>,
    #[serde(default)]
    pub client_telephone: Option<Value>,
    #[serde(default)]
    pub adresse: Option<String>,
    #[serde(default)]
    pub articles: Vec<ArticleInput>,
    #[serde(default)]
    pub produit: Option<String>,
    #[serde(default)]
    pub quantite: Option<Value>,
    #[serde(default)]
    pub prix: Option<Value>,
    #[serde(default)]
    pub boutique: Option<String>,
}

/// Line item as sent by clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleInput {
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub quantite: Option<Value>,
    #[serde(default)]
    pub prix: Option<Value>,
}

/// Result of a committed assignment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentOutcome {
    pub created: usize,
    pub updated: usize,
    pub sheet_rows_updated: usize,
    pub orders: Vec<Order>,
}

/// Text of a JSON scalar, trimmed. Empty strings and non-scalars are `None`.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

impl AssignmentItem {
    fn order_number(&self) -> Result<OrderNumber, String> {
        let raw = scalar_text(self.numero_commande.as_ref())
            .ok_or_else(|| "numeroCommande is required".to_string())?;
        OrderNumber::parse(&raw).map_err(|e| e.to_string())
    }

    fn sheet_reference(&self) -> Option<String> {
        scalar_text(self.google_sheets_id.as_ref())
    }

    /// Line items from `articles`, else from the flat product fields. An item
    /// with neither gets one placeholder article.
    fn line_items(&self) -> Result<Vec<LineItem>, String> {
        if !self.articles.is_empty() {
            return self
                .articles
                .iter()
                .enumerate()
                .map(|(i, article)| {
                    let name = non_empty(article.nom.as_deref()).unwrap_or(UNKNOWN_PRODUCT);
                    let quantity = parse_quantity(scalar_text(article.quantite.as_ref()).as_deref())
                        .map_err(|e| format!("articles[{i}]: {e}"))?;
                    let price = parse_price(scalar_text(article.prix.as_ref()).as_deref())
                        .map_err(|e| format!("articles[{i}]: {e}"))?;
                    LineItem::new(name, quantity, price).map_err(|e| format!("articles[{i}]: {e}"))
                })
                .collect();
        }

        let product = non_empty(self.produit.as_deref()).unwrap_or(UNKNOWN_PRODUCT);
        let quantity = parse_quantity(scalar_text(self.quantite.as_ref()).as_deref())?;
        let price = parse_price(scalar_text(self.prix.as_ref()).as_deref())?;
        Ok(vec![
            LineItem::new(product, quantity, price).map_err(|e| e.to_string())?,
        ])
    }

    /// Whether the item carries enough to describe an order on its own.
    fn has_details(&self) -> bool {
        non_empty(self.client_nom.as_deref()).is_some()
    }

    fn details(
        &self,
        numero_commande: OrderNumber,
        google_sheets_id: Option<String>,
        fallback_date: DateTime<Utc>,
        fallback_shop: &str,
    ) -> Result<OrderDetails, String> {
        let client_nom = non_empty(self.client_nom.as_deref()).unwrap_or(UNKNOWN_CLIENT);
        let articles = self.line_items()?;
        let date_commande = non_empty(self.date_commande.as_deref())
            .and_then(parse_sheet_date)
            .unwrap_or(fallback_date);

        Ok(OrderDetails {
            numero_commande,
            google_sheets_id,
            date_commande,
            client_nom: client_nom.to_string(),
            client_telephone: scalar_text(self.client_telephone.as_ref()).unwrap_or_default(),
            adresse: non_empty(self.adresse.as_deref()).unwrap_or_default().to_string(),
            articles,
            boutique: non_empty(self.boutique.as_deref())
                .unwrap_or(fallback_shop)
                .to_string(),
            sheet_status: Some(ASSIGNED_MARK.to_string()),
        })
    }
}

/// A spreadsheet row to mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowTarget {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub row: u32,
}

/// Resolve a stored row reference to a sheet row.
///
/// `{spreadsheetId}:{sheetName}:{row}` is authoritative. A bare integer is
/// taken as a row of the active configuration's tab. Anything else, and the
/// header row, resolve to nothing.
#[must_use]
pub fn resolve_row(reference: &str, active: Option<&SheetConfig>) -> Option<RowTarget> {
    let reference = reference.trim();
    let (target, row) = match reference.rsplit_once(':') {
        Some((prefix, row)) => {
            let (spreadsheet_id, sheet_name) = prefix.split_once(':')?;
            if spreadsheet_id.is_empty() || sheet_name.is_empty() {
                return None;
            }
            (
                (spreadsheet_id.to_string(), sheet_name.to_string()),
                row.parse::<u32>().ok()?,
            )
        }
        None => {
            let row = reference.parse::<u32>().ok()?;
            let config = active?;
            (
                (config.spreadsheet_id.clone(), config.sheet_name.clone()),
                row,
            )
        }
    };
    if row < 2 {
        return None;
    }
    Some(RowTarget {
        spreadsheet_id: target.0,
        sheet_name: target.1,
        row,
    })
}

/// Courier assignment.
pub struct AssignmentService<'a> {
    pool: &'a PgPool,
    sheets: Option<&'a SheetsClient>,
    default_shop: &'a str,
}

impl<'a> AssignmentService<'a> {
    #[must_use]
    pub const fn new(
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

    /// Assign every order of `request` to its courier, all or nothing.
    ///
    /// # Errors
    ///
    /// - `ServiceError::InvalidInput` for a missing, unknown, inactive or
    ///   non-courier user, an empty batch, or when any item fails (the
    ///   details list the failed items)
    /// - `ServiceError::Sheets` with `ExternalWriteFailed` when marking the
    ///   spreadsheet fails
    ///
    /// Nothing is persisted in any error case.
    #[instrument(skip(self, request), fields(items = request.sheet_orders.len()))]
    pub async fn assign(&self, request: &AssignmentRequest) -> Result<AssignmentOutcome, ServiceError> {
        let courier_id = request
            .livreur_id
            .ok_or_else(|| ServiceError::invalid("livreurId is required", "livreurId", "missing"))?;
        if request.sheet_orders.is_empty() {
            return Err(ServiceError::invalid(
                "No orders to assign",
                "sheetOrders",
                "at least one order is required",
            ));
        }
        let courier = self.courier(courier_id).await?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut report = BatchReport::default();
        let mut assigned = Vec::with_capacity(request.sheet_orders.len());

        for (index, item) in request.sheet_orders.iter().enumerate() {
            let mut savepoint = tx.begin().await?;
            match self.assign_one(&mut savepoint, item, courier.id, now).await {
                Ok((outcome, order)) => {
                    savepoint.commit().await?;
                    report.record(outcome);
                    assigned.push(order);
                }
                Err(message) => {
                    savepoint.rollback().await?;
                    tracing::warn!(index, %message, "Assignment item failed");
                    report.fail(format!("sheetOrders[{index}]"), message);
                }
            }
        }

        let report = AtomicBatch::settle(report).map_err(|report| ServiceError::InvalidInput {
            message: format!(
                "{} of {} orders could not be assigned; nothing was saved",
                report.failed,
                report.total()
            ),
            details: report.errors,
        })?;

        let active = sheet_configs::get_active(&mut *tx).await?;
        let sheet_rows_updated = self
            .write_back(&assigned, &courier, active.as_ref())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Spreadsheet write-back failed, rolling back assignment");
                ServiceError::Sheets(e.into_write_failure())
            })?;

        tx.commit().await?;

        tracing::info!(
            courier_id = %courier.id,
            created = report.created,
            updated = report.updated,
            sheet_rows_updated,
            "Assigned orders"
        );

        Ok(AssignmentOutcome {
            created: report.created,
            updated: report.updated,
            sheet_rows_updated,
            orders: assigned,
        })
    }

    async fn courier(&self, id: UserId) -> Result<User, ServiceError> {
        let invalid = |detail: &str| {
            ServiceError::invalid("Invalid courier", "livreurId", detail.to_string())
        };
        let user = users::get(self.pool, id)
            .await?
            .ok_or_else(|| invalid("no such user"))?;
        if !user.is_assignable_courier() {
            return Err(invalid(if user.active {
                "user is not a courier"
            } else {
                "courier account is inactive"
            }));
        }
        Ok(user)
    }

    async fn assign_one(
        &self,
        conn: &mut PgConnection,
        item: &AssignmentItem,
        courier: UserId,
        now: DateTime<Utc>,
    ) -> Result<(ItemOutcome, Order), String> {
        let number = item.order_number()?;
        let sheet_ref = item.sheet_reference();

        let existing = orders::get_by_number_for_update(&mut *conn, &number)
            .await
            .map_err(|e| e.to_string())?;

        let Some(order) = existing else {
            let details = item.details(number, sheet_ref, now, self.default_shop)?;
            let order = orders::insert_assigned(&mut *conn, &details, courier, now)
                .await
                .map_err(|e| e.to_string())?;
            return Ok((ItemOutcome::Created, order));
        };

        if order.status.is_terminal() {
            return Err(format!(
                "order {number} is already {} and cannot be reassigned",
                order.status
            ));
        }
        if let Some(previous) = order.livreur_id
            && previous != courier
        {
            tracing::info!(order = %number, from = %previous, to = %courier, "Reassigning order");
        }

        // A stored reference came from sync and stays authoritative
        let keep_ref = order.google_sheets_id.clone().or(sheet_ref);
        if item.has_details() {
            let details = item.details(
                number.clone(),
                keep_ref.clone(),
                order.date_commande,
                &order.boutique,
            )?;
            if details.differs_from(&order) {
                orders::update_details(&mut *conn, order.id, &details)
                    .await
                    .map_err(|e| e.to_string())?;
            }
        }

        let new_ref = if order.google_sheets_id.is_none() {
            keep_ref.as_deref()
        } else {
            None
        };
        let order = orders::assign(&mut *conn, order.id, courier, now, new_ref)
            .await
            .map_err(|e| e.to_string())?;
        Ok((ItemOutcome::Updated, order))
    }

    /// Mark the spreadsheet rows of `assigned` and return how many rows
    /// were written.
    async fn write_back(
        &self,
        assigned: &[Order],
        courier: &User,
        active: Option<&SheetConfig>,
    ) -> Result<usize, SheetsError> {
        let mut by_sheet: BTreeMap<(String, String), Vec<u32>> = BTreeMap::new();
        for order in assigned {
            let Some(reference) = order.google_sheets_id.as_deref() else {
                continue;
            };
            match resolve_row(reference, active) {
                Some(target) => by_sheet
                    .entry((target.spreadsheet_id, target.sheet_name))
                    .or_default()
                    .push(target.row),
                None => tracing::warn!(
                    order = %order.numero_commande,
                    reference,
                    "Row reference does not point at a spreadsheet row, not marking it"
                ),
            }
        }
        if by_sheet.is_empty() {
            return Ok(0);
        }
        let sheets = self.sheets.ok_or(SheetsError::NotConfigured)?;

        let mut written = 0;
        for ((spreadsheet_id, sheet_name), mut rows) in by_sheet {
            rows.sort_unstable();
            rows.dedup();

            let header = sheets
                .get_values(&spreadsheet_id, &range::header_row(&sheet_name)?)
                .await?
                .into_iter()
                .next()
                .unwrap_or_default();
            let updates = mark_updates(&header, &sheet_name, &rows, &courier.name)?;
            sheets.batch_update(&spreadsheet_id, &updates).await?;
            written += rows.len();
        }
        Ok(written)
    }
}

/// Cell writes marking `rows` of one tab as assigned to `courier_name`.
fn mark_updates(
    header: &[String],
    sheet_name: &str,
    rows: &[u32],
    courier_name: &str,
) -> Result<Vec<CellUpdate>, SheetsError> {
    let columns = ColumnMap::from_header(header);
    let status_column =
        columns
            .column(OrderField::Status)
            .ok_or_else(|| SheetsError::ExternalWriteFailed {
                message: format!("tab '{sheet_name}' has no status column"),
                suggestions: vec![format!(
                    "Add a 'Statut' column to the header row of '{sheet_name}'"
                )],
            })?;
    let courier_column = columns.column(OrderField::Courier);

    let mut updates = Vec::with_capacity(rows.len() * 2);
    for &row in rows {
        updates.push(CellUpdate {
            range: range::cell(sheet_name, status_column, row)?,
            value: ASSIGNED_MARK.to_string(),
        });
        if let Some(column) = courier_column {
            updates.push(CellUpdate {
                range: range::cell(sheet_name, column, row)?,
                value: courier_name.to_string(),
            });
        }
    }
    Ok(updates)
}
