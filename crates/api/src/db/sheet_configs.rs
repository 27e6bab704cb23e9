//! Spreadsheet configuration persistence.
//!
//! The active flag is exclusive: activation clears every flag and sets one
//! inside the caller's transaction, after taking a table lock through
//! [`lock_for_activation`] so concurrent activations serialise.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use livraison_core::{SheetConfigId, UserId};

use super::RepositoryError;
use crate::models::{SheetConfig, SheetConfigInput};

const CONFIG_COLUMNS: &str = r"
    id, name, spreadsheet_id, sheet_name, description, is_active,
    created_by, last_used_at, created_at, updated_at
";

#[derive(Debug, sqlx::FromRow)]
struct SheetConfigRow {
    id: i32,
    name: String,
    spreadsheet_id: String,
    sheet_name: String,
    description: String,
    is_active: bool,
    created_by: Option<i32>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SheetConfigRow> for SheetConfig {
    fn from(row: SheetConfigRow) -> Self {
        Self {
            id: SheetConfigId::new(row.id),
            name: row.name,
            spreadsheet_id: row.spreadsheet_id,
            sheet_name: row.sheet_name,
            description: row.description,
            is_active: row.is_active,
            created_by: row.created_by.map(UserId::new),
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn name_conflict(err: sqlx::Error, name: &str) -> RepositoryError {
    RepositoryError::from_unique(err, format!("a configuration named '{name}' already exists"))
}

/// List every saved configuration, active first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn list(pool: &PgPool) -> Result<Vec<SheetConfig>, RepositoryError> {
    let rows = sqlx::query_as::<_, SheetConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM livraison.sheet_configs ORDER BY is_active DESC, name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Get a configuration by id.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get<'e, E: PgExecutor<'e>>(
    executor: E,
    id: SheetConfigId,
) -> Result<Option<SheetConfig>, RepositoryError> {
    let row = sqlx::query_as::<_, SheetConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM livraison.sheet_configs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// Read the active configuration, if any.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn get_active<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<Option<SheetConfig>, RepositoryError> {
    let row = sqlx::query_as::<_, SheetConfigRow>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM livraison.sheet_configs WHERE is_active"
    ))
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Into::into))
}

/// Create an inactive configuration. `input` must already be normalised.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the name is taken.
pub async fn create(
    pool: &PgPool,
    input: &SheetConfigInput,
    created_by: UserId,
) -> Result<SheetConfig, RepositoryError> {
    let row = sqlx::query_as::<_, SheetConfigRow>(&format!(
        r"
        INSERT INTO livraison.sheet_configs (name, spreadsheet_id, sheet_name, description, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {CONFIG_COLUMNS}
        "
    ))
    .bind(&input.name)
    .bind(&input.spreadsheet_id)
    .bind(input.sheet_name())
    .bind(input.description())
    .bind(created_by)
    .fetch_one(pool)
    .await
    .map_err(|e| name_conflict(e, &input.name))?;

    Ok(row.into())
}

/// Replace the editable fields of a configuration.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` for an unknown id, or
/// `RepositoryError::Conflict` if the new name is taken.
pub async fn update(
    pool: &PgPool,
    id: SheetConfigId,
    input: &SheetConfigInput,
) -> Result<SheetConfig, RepositoryError> {
    let row = sqlx::query_as::<_, SheetConfigRow>(&format!(
        r"
        UPDATE livraison.sheet_configs SET
            name = $2,
            spreadsheet_id = $3,
            sheet_name = $4,
            description = $5,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CONFIG_COLUMNS}
        "
    ))
    .bind(id)
    .bind(&input.name)
    .bind(&input.spreadsheet_id)
    .bind(input.sheet_name())
    .bind(input.description())
    .fetch_optional(pool)
    .await
    .map_err(|e| name_conflict(e, &input.name))?
    .ok_or(RepositoryError::NotFound)?;

    Ok(row.into())
}

/// Outcome of [`delete_inactive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    IsActive,
    NotFound,
}

/// Delete a configuration unless it is the active one.
///
/// The guard is part of the `DELETE` itself, so a config activated
/// concurrently is never removed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn delete_inactive(
    pool: &PgPool,
    id: SheetConfigId,
) -> Result<DeleteOutcome, RepositoryError> {
    let deleted: Option<i32> = sqlx::query_scalar(
        "DELETE FROM livraison.sheet_configs WHERE id = $1 AND NOT is_active RETURNING id",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    if deleted.is_some() {
        return Ok(DeleteOutcome::Deleted);
    }

    let exists: Option<bool> =
        sqlx::query_scalar("SELECT is_active FROM livraison.sheet_configs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(match exists {
        Some(_) => DeleteOutcome::IsActive,
        None => DeleteOutcome::NotFound,
    })
}

/// Serialise activations for the rest of the transaction.
///
/// `SHARE ROW EXCLUSIVE` conflicts with itself but not with plain reads.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the lock cannot be taken.
pub async fn lock_for_activation<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<(), RepositoryError> {
    sqlx::query("LOCK TABLE livraison.sheet_configs IN SHARE ROW EXCLUSIVE MODE")
        .execute(executor)
        .await?;
    Ok(())
}

/// Clear the active flag on every configuration.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn clear_active<'e, E: PgExecutor<'e>>(executor: E) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE livraison.sheet_configs SET is_active = FALSE, updated_at = NOW() WHERE is_active",
    )
    .execute(executor)
    .await?;
    Ok(())
}

/// Mark one configuration active. `last_used_at` is left to the import
/// that follows.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` for an unknown id.
pub async fn set_active<'e, E: PgExecutor<'e>>(
    executor: E,
    id: SheetConfigId,
) -> Result<SheetConfig, RepositoryError> {
    let row = sqlx::query_as::<_, SheetConfigRow>(&format!(
        r"
        UPDATE livraison.sheet_configs SET
            is_active = TRUE,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CONFIG_COLUMNS}
        "
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    Ok(row.into())
}

/// Stamp `last_used_at` after a successful import.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn touch(pool: &PgPool, id: SheetConfigId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE livraison.sheet_configs SET last_used_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
