//! Spreadsheet configuration, preview and sync endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use livraison_core::SheetConfigId;

use crate::db::sheet_configs::{self, DeleteOutcome};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::sheet_config::DEFAULT_SHEET_NAME;
use crate::models::{SheetConfig, SheetConfigInput};
use crate::services::{
    AccessReport, FieldError, SheetTable, SyncResult, SyncService, SyncSummary,
};
use crate::state::AppState;

use super::extract::{JsonBody, PathParam, QueryParams};

/// Routes for admins and closeurs.
pub fn staff_router() -> Router<AppState> {
    Router::new()
        .route("/google-sheets/data", get(sheet_data))
        .route("/google-sheets/sync-orders", post(sync_orders))
}

/// Configuration management, admins only.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/google-sheets/config", get(list_configs).post(create_config))
        .route("/google-sheets/config/test", post(test_access))
        .route(
            "/google-sheets/config/{id}",
            get(get_config).put(update_config).delete(delete_config),
        )
        .route("/google-sheets/config/{id}/activate", post(activate_config))
}

fn sync_service(state: &AppState) -> Result<SyncService<'_>, AppError> {
    Ok(SyncService::new(
        state.pool(),
        state.sheets()?,
        &state.config().default_shop,
    ))
}

/// Normalise a config body, turning field problems into a 400 with details.
fn validated(input: SheetConfigInput) -> Result<SheetConfigInput, AppError> {
    input.normalize().map_err(|errors| AppError::InvalidInput {
        message: "Invalid spreadsheet configuration".to_string(),
        details: errors
            .into_iter()
            .map(|(field, message)| FieldError::new(field, message))
            .collect(),
    })
}

fn config_not_found(id: SheetConfigId) -> AppError {
    AppError::NotFound(format!("spreadsheet configuration {id} not found"))
}

// =============================================================================
// Preview and sync
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataParams {
    spreadsheet_id: Option<String>,
    sheet_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataResponse {
    success: bool,
    spreadsheet_id: String,
    sheet_name: String,
    #[serde(flatten)]
    table: SheetTable,
}

/// Rows of an explicit tab, or of the active configuration's tab.
async fn sheet_data(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<DataParams>,
) -> Result<Json<DataResponse>, AppError> {
    let (spreadsheet_id, sheet_name) = match params.spreadsheet_id {
        Some(id) if !id.trim().is_empty() => (
            id.trim().to_string(),
            params
                .sheet_name
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
        ),
        _ => {
            let active = sheet_configs::get_active(state.pool())
                .await?
                .ok_or_else(|| {
                    AppError::NotFound("no active spreadsheet configuration".to_string())
                })?;
            (active.spreadsheet_id, active.sheet_name)
        }
    };

    let table = sync_service(&state)?
        .read_table(&spreadsheet_id, &sheet_name)
        .await?;

    Ok(Json(DataResponse {
        success: true,
        spreadsheet_id,
        sheet_name,
        table,
    }))
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    success: bool,
    #[serde(flatten)]
    summary: SyncSummary,
}

async fn sync_orders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<SyncResponse>, AppError> {
    tracing::info!(user_id = %user.id, "Manual sync requested");
    let summary = sync_service(&state)?.sync_active().await?;
    Ok(Json(SyncResponse {
        success: true,
        summary,
    }))
}

// =============================================================================
// Configuration CRUD
// =============================================================================

#[derive(Debug, Serialize)]
struct ConfigListResponse {
    success: bool,
    configs: Vec<SheetConfig>,
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    success: bool,
    config: SheetConfig,
}

async fn list_configs(State(state): State<AppState>) -> Result<Json<ConfigListResponse>, AppError> {
    let configs = sheet_configs::list(state.pool()).await?;
    Ok(Json(ConfigListResponse {
        success: true,
        configs,
    }))
}

async fn get_config(
    State(state): State<AppState>,
    PathParam(id): PathParam<SheetConfigId>,
) -> Result<Json<ConfigResponse>, AppError> {
    let config = sheet_configs::get(state.pool(), id)
        .await?
        .ok_or_else(|| config_not_found(id))?;
    Ok(Json(ConfigResponse {
        success: true,
        config,
    }))
}

async fn create_config(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(input): JsonBody<SheetConfigInput>,
) -> Result<(StatusCode, Json<ConfigResponse>), AppError> {
    let input = validated(input)?;
    let config = sheet_configs::create(state.pool(), &input, user.id).await?;
    tracing::info!(config_id = %config.id, name = %config.name, "Created spreadsheet configuration");

    Ok((
        StatusCode::CREATED,
        Json(ConfigResponse {
            success: true,
            config,
        }),
    ))
}

async fn update_config(
    State(state): State<AppState>,
    PathParam(id): PathParam<SheetConfigId>,
    JsonBody(input): JsonBody<SheetConfigInput>,
) -> Result<Json<ConfigResponse>, AppError> {
    let input = validated(input)?;
    let config = sheet_configs::update(state.pool(), id, &input)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::NotFound(_) => config_not_found(id),
            other => other,
        })?;
    Ok(Json(ConfigResponse {
        success: true,
        config,
    }))
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

async fn delete_config(
    State(state): State<AppState>,
    PathParam(id): PathParam<SheetConfigId>,
) -> Result<Json<DeleteResponse>, AppError> {
    match sheet_configs::delete_inactive(state.pool(), id).await? {
        DeleteOutcome::Deleted => {
            tracing::info!(config_id = %id, "Deleted spreadsheet configuration");
            Ok(Json(DeleteResponse {
                success: true,
                message: format!("configuration {id} deleted"),
            }))
        }
        DeleteOutcome::IsActive => Err(AppError::InvalidState(
            "the active configuration cannot be deleted; activate another one first".to_string(),
        )),
        DeleteOutcome::NotFound => Err(config_not_found(id)),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivationResponse {
    success: bool,
    config: SheetConfig,
    sync_result: SyncResult,
}

async fn activate_config(
    State(state): State<AppState>,
    PathParam(id): PathParam<SheetConfigId>,
) -> Result<Json<ActivationResponse>, AppError> {
    // Activation does not need Google access; a missing client shows up in
    // the sync result.
    let service = SyncService::with_client(
        state.pool(),
        state.sheets_client(),
        &state.config().default_shop,
    );
    let activation = service.activate(id).await?;
    Ok(Json(ActivationResponse {
        success: true,
        config: activation.config,
        sync_result: activation.sync_result,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestAccessRequest {
    spreadsheet_id: String,
    #[serde(default)]
    sheet_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct TestAccessResponse {
    success: bool,
    #[serde(flatten)]
    report: AccessReport,
}

async fn test_access(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<TestAccessRequest>,
) -> Result<Json<TestAccessResponse>, AppError> {
    let spreadsheet_id = body.spreadsheet_id.trim();
    if spreadsheet_id.is_empty() {
        return Err(AppError::InvalidInput {
            message: "spreadsheetId is required".to_string(),
            details: vec![FieldError::new("spreadsheetId", "missing")],
        });
    }
    let sheet_name = body
        .sheet_name
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());

    let report = sync_service(&state)?
        .test_access(spreadsheet_id, &sheet_name)
        .await?;
    Ok(Json(TestAccessResponse {
        success: true,
        report,
    }))
}
