//! Order listing, statistics, status changes and courier assignment.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use livraison_core::{OrderId, OrderStatus, UserRole};

use crate::db::orders::{self, OrderListQuery, OrderScope, SortField};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{CurrentUser, Order};
use crate::services::{AssignmentOutcome, AssignmentRequest, AssignmentService, transition};
use crate::state::AppState;

use super::extract::{JsonBody, PathParam, QueryParams};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Routes open to every authenticated role.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/stats/overview", get(stats_overview))
        .route("/orders/{id}/status", put(update_status))
}

/// Routes for admins and closeurs.
pub fn staff_router() -> Router<AppState> {
    Router::new().route("/orders/assign-from-sheets", post(assign_from_sheets))
}

/// Orders the caller may see.
fn scope_for(user: &CurrentUser) -> Result<OrderScope, AppError> {
    match user.role {
        UserRole::Admin => Ok(OrderScope::All),
        UserRole::Livreur => Ok(OrderScope::Courier(user.id)),
        UserRole::Closeur => user
            .shop
            .clone()
            .map(OrderScope::Shop)
            .ok_or_else(|| AppError::Forbidden("closeur account has no shop".to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<String>,
    boutique: Option<String>,
    sort: Option<String>,
    order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
struct Pagination {
    total: i64,
    page: u32,
    pages: i64,
    limit: u32,
}

impl Pagination {
    fn new(total: i64, page: u32, limit: u32) -> Self {
        let per_page = i64::from(limit);
        Self {
            total,
            page,
            pages: (total + per_page - 1) / per_page,
            limit,
        }
    }
}

impl ListParams {
    /// Validate and clamp the raw query into a repository query.
    fn into_query(self, scope: OrderScope) -> Result<(OrderListQuery, u32, u32), AppError> {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<OrderStatus>()
                    .map_err(|e| AppError::bad_request(e.to_string()))?,
            ),
        };
        let sort = match self.sort.as_deref() {
            None | Some("") => SortField::default(),
            Some(raw) => SortField::parse(raw)
                .ok_or_else(|| AppError::bad_request(format!("cannot sort by '{raw}'")))?,
        };
        let descending = match self.order.as_deref() {
            None | Some("" | "desc") => true,
            Some("asc") => false,
            Some(other) => {
                return Err(AppError::bad_request(format!(
                    "order must be 'asc' or 'desc', got '{other}'"
                )));
            }
        };
        let boutique = self
            .boutique
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());

        let query = OrderListQuery {
            scope,
            status,
            boutique,
            sort,
            descending,
            limit: i64::from(limit),
            offset: i64::from(page - 1) * i64::from(limit),
        };
        Ok((query, page, limit))
    }
}

#[derive(Debug, Serialize)]
struct OrderListResponse {
    success: bool,
    orders: Vec<Order>,
    pagination: Pagination,
}

async fn list_orders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<OrderListResponse>, AppError> {
    let (query, page, limit) = params.into_query(scope_for(&user)?)?;
    let (orders, total) = orders::list(state.pool(), &query).await?;

    Ok(Json(OrderListResponse {
        success: true,
        orders,
        pagination: Pagination::new(total, page, limit),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    success: bool,
    total: i64,
    by_status: BTreeMap<&'static str, i64>,
    total_value: Decimal,
}

async fn stats_overview(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = orders::stats(state.pool(), &scope_for(&user)?).await?;

    Ok(Json(StatsResponse {
        success: true,
        total: stats.total,
        by_status: stats.by_status,
        total_value: stats.total_value,
    }))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
}

#[derive(Debug, Serialize)]
struct OrderResponse {
    success: bool,
    order: Order,
}

async fn update_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    PathParam(id): PathParam<OrderId>,
    JsonBody(body): JsonBody<StatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = transition::transition(state.pool(), &user, id, &body.status).await?;
    Ok(Json(OrderResponse {
        success: true,
        order,
    }))
}

#[derive(Debug, Serialize)]
struct AssignmentResponse {
    success: bool,
    #[serde(flatten)]
    outcome: AssignmentOutcome,
}

async fn assign_from_sheets(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(request): JsonBody<AssignmentRequest>,
) -> Result<Json<AssignmentResponse>, AppError> {
    tracing::info!(
        user_id = %user.id,
        items = request.sheet_orders.len(),
        "Assigning orders from spreadsheet"
    );
    let service = AssignmentService::new(
        state.pool(),
        state.sheets_client(),
        &state.config().default_shop,
    );
    let outcome = service.assign(&request).await?;

    Ok(Json(AssignmentResponse {
        success: true,
        outcome,
    }))
}
