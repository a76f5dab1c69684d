//! Action registry administration. Same paranoid-delete semantics as the
//! resource registry; action names are referenced by value from role
//! permission structures. The GET-by-key endpoint accepts an id or a
//! name; mutations take the id.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers::action_from_row;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::rbac::{Action, ActionCreateRequest, ActionUpdateRequest};
use crate::utils::utc_now;

const ACTION_COLUMNS: &str =
    "id, name, description, created_by, updated_by, deleted_by, created_at, updated_at, deleted_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_actions).post(create_action))
        .route("/:action_id", get(get_action).put(update_action).delete(delete_action))
        .route("/:action_id/force", delete(force_delete_action))
        .route("/:action_id/restore", post(restore_action))
}

/// List all non-deleted actions
#[utoipa::path(
    get,
    path = "/api/v1/actions",
    tag = "Actions",
    responses((status = 200, description = "List of actions", body = Vec<Action>)),
    security(("bearerAuth" = []))
)]
pub async fn list_actions(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Action>>> {
    let sql = format!("SELECT {ACTION_COLUMNS} FROM actions WHERE deleted_at IS NULL ORDER BY name");
    let rows = sqlx::query(&sql).fetch_all(&state.pool).await?;

    Ok(Json(rows.iter().map(action_from_row).collect()))
}

/// Register a new action
#[utoipa::path(
    post,
    path = "/api/v1/actions",
    tag = "Actions",
    request_body = ActionCreateRequest,
    responses(
        (status = 201, description = "Action created", body = Action),
        (status = 409, description = "Action name already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_action(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<ActionCreateRequest>,
) -> AppResult<(StatusCode, Json<Action>)> {
    ensure_name_available(&state.pool, &req.name, None).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO actions (id, name, description, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&req.name)
    .bind(&req.description)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let action = Action {
        id,
        name: req.name,
        description: req.description,
        created_by: Some(auth.user_id),
        updated_by: None,
        deleted_by: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &action,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(action)))
}

/// Get an action by id or by name
#[utoipa::path(
    get,
    path = "/api/v1/actions/{action_id}",
    tag = "Actions",
    params(("action_id" = String, Path, description = "Action id or name")),
    responses(
        (status = 200, description = "Action details", body = Action),
        (status = 404, description = "Action not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_action(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(action_key): Path<String>,
) -> AppResult<Json<Action>> {
    let action = match Uuid::parse_str(&action_key) {
        Ok(action_id) => fetch_action(&state.pool, action_id, false).await?,
        Err(_) => fetch_action_by_name(&state.pool, &action_key).await?,
    };
    Ok(Json(action))
}

/// Update an action; renames re-check name uniqueness
#[utoipa::path(
    put,
    path = "/api/v1/actions/{action_id}",
    tag = "Actions",
    params(("action_id" = Uuid, Path, description = "Action id")),
    request_body = ActionUpdateRequest,
    responses(
        (status = 200, description = "Action updated", body = Action),
        (status = 404, description = "Action not found"),
        (status = 409, description = "Action name already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_action(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(action_id): Path<Uuid>,
    Json(req): Json<ActionUpdateRequest>,
) -> AppResult<Json<Action>> {
    let previous = fetch_action(&state.pool, action_id, false).await?;
    let mut action = previous.clone();

    if let Some(name) = req.name {
        if name != action.name {
            ensure_name_available(&state.pool, &name, Some(action_id)).await?;
        }
        action.name = name;
    }
    if req.description.is_some() {
        action.description = req.description;
    }

    let now = utc_now();
    sqlx::query(
        "UPDATE actions SET name = ?, description = ?, updated_by = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&action.name)
    .bind(&action.description)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(action_id.to_string())
    .execute(&state.pool)
    .await?;

    action.updated_by = Some(auth.user_id);
    action.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &action,
        Some(&previous),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(action))
}

/// Soft-delete an action
#[utoipa::path(
    delete,
    path = "/api/v1/actions/{action_id}",
    tag = "Actions",
    params(("action_id" = Uuid, Path, description = "Action id")),
    responses(
        (status = 204, description = "Action soft-deleted"),
        (status = 404, description = "Action not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_action(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(action_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let action = fetch_action(&state.pool, action_id, false).await?;

    let now = utc_now();
    sqlx::query(
        "UPDATE actions SET deleted_at = ?, deleted_by = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(action_id.to_string())
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &action,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Permanently delete an action
#[utoipa::path(
    delete,
    path = "/api/v1/actions/{action_id}/force",
    tag = "Actions",
    params(("action_id" = Uuid, Path, description = "Action id")),
    responses(
        (status = 204, description = "Action permanently deleted"),
        (status = 404, description = "Action not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn force_delete_action(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(action_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let action = fetch_action(&state.pool, action_id, true).await?;

    sqlx::query("DELETE FROM actions WHERE id = ?")
        .bind(action_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "force_deleted",
        Some(auth.user_id),
        &action,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Restore a soft-deleted action
#[utoipa::path(
    post,
    path = "/api/v1/actions/{action_id}/restore",
    tag = "Actions",
    params(("action_id" = Uuid, Path, description = "Action id")),
    responses(
        (status = 200, description = "Action restored", body = Action),
        (status = 404, description = "Action not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn restore_action(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(action_id): Path<Uuid>,
) -> AppResult<Json<Action>> {
    let mut action = fetch_action(&state.pool, action_id, true).await?;

    let now = utc_now();
    sqlx::query("UPDATE actions SET deleted_at = NULL, deleted_by = NULL, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(action_id.to_string())
        .execute(&state.pool)
        .await?;

    action.deleted_at = None;
    action.deleted_by = None;
    action.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "restored",
        Some(auth.user_id),
        &action,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(action))
}

async fn fetch_action_by_name(pool: &SqlitePool, name: &str) -> AppResult<Action> {
    let sql = format!("SELECT {ACTION_COLUMNS} FROM actions WHERE name = ? AND deleted_at IS NULL");

    let row = sqlx::query(&sql)
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("action {name} not found")))?;

    Ok(action_from_row(&row))
}

async fn fetch_action(pool: &SqlitePool, action_id: Uuid, include_deleted: bool) -> AppResult<Action> {
    let filter = if include_deleted { "" } else { " AND deleted_at IS NULL" };
    let sql = format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?{filter}");

    let row = sqlx::query(&sql)
        .bind(action_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("action {action_id} not found")))?;

    Ok(action_from_row(&row))
}

async fn ensure_name_available(pool: &SqlitePool, name: &str, exclude: Option<Uuid>) -> AppResult<()> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM actions WHERE name = ? AND deleted_at IS NULL AND id != ?",
            )
            .bind(name)
            .bind(id.to_string())
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(1) FROM actions WHERE name = ? AND deleted_at IS NULL")
                .bind(name)
                .fetch_one(pool)
                .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict(format!("action name {name} already in use")));
    }

    Ok(())
}
