//! Order persistence.
//!
//! Line items live in a JSONB array. Lookups used by sync and assignment are
//! generic over the executor so they can run inside a transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};

use livraison_core::{LineItem, OrderId, OrderNumber, OrderStatus, UserId};

use super::RepositoryError;
use crate::models::{Order, OrderDetails};

const ORDER_COLUMNS: &str = r"
    id, numero_commande, google_sheets_id, date_commande, client_nom,
    client_telephone, adresse, articles, boutique, status, livreur_id,
    assigned_at, delivered_at, sheet_status, created_at, updated_at
";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    numero_commande: String,
    google_sheets_id: Option<String>,
    date_commande: DateTime<Utc>,
    client_nom: String,
    client_telephone: String,
    adresse: String,
    articles: Json<serde_json::Value>,
    boutique: String,
    status: OrderStatus,
    livreur_id: Option<i32>,
    assigned_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    sheet_status: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let numero_commande = OrderNumber::parse(&row.numero_commande).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid order number in database: {e}"))
        })?;
        let articles: Vec<LineItem> = serde_json::from_value(row.articles.0).map_err(|e| {
            RepositoryError::DataCorruption(format!(
                "invalid articles for order {numero_commande}: {e}"
            ))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            numero_commande,
            google_sheets_id: row.google_sheets_id,
            date_commande: row.date_commande,
            client_nom: row.client_nom,
            client_telephone: row.client_telephone,
            adresse: row.adresse,
            articles,
            boutique: row.boutique,
            status: row.status,
            livreur_id: row.livreur_id.map(UserId::new),
            assigned_at: row.assigned_at,
            delivered_at: row.delivered_at,
            sheet_status: row.sheet_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn articles_json(articles: &[LineItem]) -> Result<Json<serde_json::Value>, RepositoryError> {
    serde_json::to_value(articles)
        .map(Json)
        .map_err(|e| RepositoryError::DataCorruption(format!("cannot encode articles: {e}")))
}

fn map_write_error(err: sqlx::Error, number: &OrderNumber) -> RepositoryError {
    RepositoryError::from_unique(
        err,
        format!("order number or spreadsheet row already used (order {number})"),
    )
}

// =============================================================================
// Lookups
// =============================================================================

/// Get an order by storage id.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get<'e, E: PgExecutor<'e>>(
    executor: E,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM livraison.orders WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// Lock an order row for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM livraison.orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// Lock an order by its business number.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_by_number_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    number: &OrderNumber,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM livraison.orders WHERE numero_commande = $1 FOR UPDATE"
    ))
    .bind(number)
    .fetch_optional(executor)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// Find the order a spreadsheet row corresponds to.
///
/// Matches on order number or spreadsheet row reference; when both match
/// different orders the order-number match wins.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn find_for_sync<'e, E: PgExecutor<'e>>(
    executor: E,
    number: &OrderNumber,
    sheet_ref: Option<&str>,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        SELECT {ORDER_COLUMNS} FROM livraison.orders
        WHERE numero_commande = $1 OR ($2::TEXT IS NOT NULL AND google_sheets_id = $2)
        ORDER BY (numero_commande = $1) DESC
        LIMIT 1
        "
    ))
    .bind(number)
    .bind(sheet_ref)
    .fetch_optional(executor)
    .await?;

    row.map(TryInto::try_into).transpose()
}

// =============================================================================
// Writes
// =============================================================================

/// Clear `sheet_ref` from every order other than `keep`, so the reference
/// can move to the order that now sits on that row. Returns how many orders
/// lost it.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn release_sheet_ref<'e, E: PgExecutor<'e>>(
    executor: E,
    sheet_ref: &str,
    keep: Option<OrderId>,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE livraison.orders SET google_sheets_id = NULL, updated_at = NOW()
        WHERE google_sheets_id = $1 AND ($2::INT IS NULL OR id <> $2)
        ",
    )
    .bind(sheet_ref)
    .bind(keep)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Insert a new `pending` order.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order number or row reference
/// is already taken.
pub async fn insert_pending<'e, E: PgExecutor<'e>>(
    executor: E,
    details: &OrderDetails,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        INSERT INTO livraison.orders (
            numero_commande, google_sheets_id, date_commande, client_nom,
            client_telephone, adresse, articles, boutique, sheet_status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(&details.numero_commande)
    .bind(&details.google_sheets_id)
    .bind(details.date_commande)
    .bind(&details.client_nom)
    .bind(&details.client_telephone)
    .bind(&details.adresse)
    .bind(articles_json(&details.articles)?)
    .bind(&details.boutique)
    .bind(&details.sheet_status)
    .fetch_one(executor)
    .await
    .map_err(|e| map_write_error(e, &details.numero_commande))?;

    row.try_into()
}

/// Overwrite the descriptive fields of an order. Status and courier are
/// left untouched.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order vanished, or
/// `RepositoryError::Conflict` on a uniqueness clash.
pub async fn update_details<'e, E: PgExecutor<'e>>(
    executor: E,
    id: OrderId,
    details: &OrderDetails,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        UPDATE livraison.orders SET
            numero_commande = $2,
            google_sheets_id = $3,
            date_commande = $4,
            client_nom = $5,
            client_telephone = $6,
            adresse = $7,
            articles = $8,
            boutique = $9,
            sheet_status = $10,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(id)
    .bind(&details.numero_commande)
    .bind(&details.google_sheets_id)
    .bind(details.date_commande)
    .bind(&details.client_nom)
    .bind(&details.client_telephone)
    .bind(&details.adresse)
    .bind(articles_json(&details.articles)?)
    .bind(&details.boutique)
    .bind(&details.sheet_status)
    .fetch_optional(executor)
    .await
    .map_err(|e| map_write_error(e, &details.numero_commande))?
    .ok_or(RepositoryError::NotFound)?;

    row.try_into()
}

/// Insert an order directly in the `assigned` state.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order number or row reference
/// is already taken.
pub async fn insert_assigned<'e, E: PgExecutor<'e>>(
    executor: E,
    details: &OrderDetails,
    courier: UserId,
    assigned_at: DateTime<Utc>,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        INSERT INTO livraison.orders (
            numero_commande, google_sheets_id, date_commande, client_nom,
            client_telephone, adresse, articles, boutique, sheet_status,
            status, livreur_id, assigned_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'assigned', $10, $11)
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(&details.numero_commande)
    .bind(&details.google_sheets_id)
    .bind(details.date_commande)
    .bind(&details.client_nom)
    .bind(&details.client_telephone)
    .bind(&details.adresse)
    .bind(articles_json(&details.articles)?)
    .bind(&details.boutique)
    .bind(&details.sheet_status)
    .bind(courier)
    .bind(assigned_at)
    .fetch_one(executor)
    .await
    .map_err(|e| map_write_error(e, &details.numero_commande))?;

    row.try_into()
}

/// Move an existing order to `assigned` for `courier`.
///
/// A `google_sheets_id` supplied by the caller replaces the stored one; the
/// other descriptive fields are kept.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order vanished.
pub async fn assign<'e, E: PgExecutor<'e>>(
    executor: E,
    id: OrderId,
    courier: UserId,
    assigned_at: DateTime<Utc>,
    google_sheets_id: Option<&str>,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        UPDATE livraison.orders SET
            status = 'assigned',
            livreur_id = $2,
            assigned_at = $3,
            google_sheets_id = COALESCE($4, google_sheets_id),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(id)
    .bind(courier)
    .bind(assigned_at)
    .bind(google_sheets_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| {
        RepositoryError::from_unique(e, "spreadsheet row already belongs to another order")
    })?
    .ok_or(RepositoryError::NotFound)?;

    row.try_into()
}

/// Record a lifecycle transition.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order vanished.
pub async fn set_status<'e, E: PgExecutor<'e>>(
    executor: E,
    id: OrderId,
    status: OrderStatus,
    delivered_at: Option<DateTime<Utc>>,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        UPDATE livraison.orders SET
            status = $2,
            delivered_at = COALESCE($3, delivered_at),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(id)
    .bind(status)
    .bind(delivered_at)
    .fetch_optional(executor)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    row.try_into()
}

// =============================================================================
// Listing and statistics
// =============================================================================

/// Which orders a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderScope {
    All,
    Courier(UserId),
    Shop(String),
}

/// Whitelisted sort columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    DateCommande,
    CreatedAt,
    UpdatedAt,
    NumeroCommande,
    ClientNom,
    Status,
    Boutique,
}

impl SortField {
    /// Parse the API's camelCase field name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dateCommande" => Some(Self::DateCommande),
            "createdAt" => Some(Self::CreatedAt),
            "updatedAt" => Some(Self::UpdatedAt),
            "numeroCommande" => Some(Self::NumeroCommande),
            "clientNom" => Some(Self::ClientNom),
            "status" => Some(Self::Status),
            "boutique" => Some(Self::Boutique),
            _ => None,
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::DateCommande => "date_commande",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::NumeroCommande => "numero_commande",
            Self::ClientNom => "client_nom",
            Self::Status => "status",
            Self::Boutique => "boutique",
        }
    }
}

/// Filters, ordering and paging for [`list`].
#[derive(Debug, Clone)]
pub struct OrderListQuery {
    pub scope: OrderScope,
    pub status: Option<OrderStatus>,
    pub boutique: Option<String>,
    pub sort: SortField,
    pub descending: bool,
    pub limit: i64,
    pub offset: i64,
}

fn push_filters<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    scope: &'a OrderScope,
    status: Option<OrderStatus>,
    boutique: Option<&'a str>,
) {
    builder.push(" WHERE TRUE");
    match scope {
        OrderScope::All => {}
        OrderScope::Courier(id) => {
            builder.push(" AND livreur_id = ").push_bind(*id);
        }
        OrderScope::Shop(shop) => {
            builder.push(" AND boutique = ").push_bind(shop.as_str());
        }
    }
    if let Some(status) = status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(boutique) = boutique {
        builder.push(" AND boutique = ").push_bind(boutique);
    }
}

/// List orders and the total number matching the filters.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn list(
    pool: &PgPool,
    query: &OrderListQuery,
) -> Result<(Vec<Order>, i64), RepositoryError> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM livraison.orders");
    push_filters(
        &mut count,
        &query.scope,
        query.status,
        query.boutique.as_deref(),
    );
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Postgres>::new(format!(
        "SELECT {ORDER_COLUMNS} FROM livraison.orders"
    ));
    push_filters(
        &mut select,
        &query.scope,
        query.status,
        query.boutique.as_deref(),
    );
    select
        .push(" ORDER BY ")
        .push(query.sort.column())
        .push(if query.descending { " DESC" } else { " ASC" })
        .push(", id DESC LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset);

    let rows: Vec<OrderRow> = select.build_query_as().fetch_all(pool).await?;
    let orders = rows
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<Vec<Order>, _>>()?;

    Ok((orders, total))
}

/// Order counts and value per status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderStats {
    pub total: i64,
    pub by_status: BTreeMap<&'static str, i64>,
    /// Σ quantite × prix over every visible order.
    pub total_value: Decimal,
}

/// Aggregate counts and monetary value within `scope`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn stats(pool: &PgPool, scope: &OrderScope) -> Result<OrderStats, RepositoryError> {
    let mut builder = QueryBuilder::<Postgres>::new(
        r"
        SELECT o.status,
               COUNT(*) AS count,
               COALESCE(SUM((
                   SELECT SUM((a->>'quantite')::NUMERIC * (a->>'prix')::NUMERIC)
                   FROM jsonb_array_elements(o.articles) AS a
               )), 0) AS value
        FROM livraison.orders o
        ",
    );
    push_filters(&mut builder, scope, None, None);
    builder.push(" GROUP BY o.status");

    let rows: Vec<(OrderStatus, i64, Decimal)> = builder.build_query_as().fetch_all(pool).await?;

    let mut stats = OrderStats {
        by_status: OrderStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect(),
        ..OrderStats::default()
    };
    for (status, count, value) in rows {
        stats.by_status.insert(status.as_str(), count);
        stats.total += count;
        stats.total_value += value;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_whitelist() {
        assert_eq!(SortField::parse("clientNom"), Some(SortField::ClientNom));
        assert_eq!(SortField::parse("client_nom"), None);
        assert_eq!(SortField::parse("id; DROP TABLE"), None);
        assert_eq!(SortField::default().column(), "date_commande");
    }

    #[test]
    fn test_filters_bind_values() {
        let scope = OrderScope::Shop("Shop1".to_string());
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM livraison.orders");
        push_filters(&mut builder, &scope, Some(OrderStatus::Assigned), Some("Shop1"));
        let sql = builder.sql();
        assert!(sql.contains("boutique = $1"));
        assert!(sql.contains("status = $2"));
        assert!(sql.contains("boutique = $3"));
        assert!(!sql.contains("Shop1"));
    }
}
