//! Role administration API.
//!
//! Roles carry the denormalized permission structures the route guard
//! evaluates, so every mutation here is logged to the activity log with
//! Critical severity. Name uniqueness is enforced among non-deleted rows
//! only; soft-deleted roles stay restorable and permanently deletable.
//!
//! Read endpoints address a role by id or by name through the same path
//! parameter; mutations take the id.

use std::collections::{BTreeMap, BTreeSet};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers::role_from_row;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::rbac::{
    PermissionCheckQuery, PermissionCheckRequest, PermissionCheckResponse, ResourceActionsResponse,
    Role, RoleCreateRequest, RoleUpdateRequest,
};
use crate::utils::utc_now;

const ROLE_COLUMNS: &str =
    "id, name, description, permissions, created_by, updated_by, deleted_by, created_at, updated_at, deleted_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:role_id", get(get_role).put(update_role).delete(delete_role))
        .route("/:role_id/force", delete(force_delete_role))
        .route("/:role_id/restore", post(restore_role))
        .route("/:role_id/check", get(check_permission_by_query).post(check_permission))
        .route("/:role_id/actions/:resource", get(actions_for_resource))
        .route("/:role_id/resource-actions", get(resource_actions))
}

/// List all non-deleted roles
#[utoipa::path(
    get,
    path = "/api/v1/roles",
    tag = "Roles",
    responses((status = 200, description = "List of roles", body = Vec<Role>)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE deleted_at IS NULL ORDER BY name");
    let rows = sqlx::query(&sql).fetch_all(&state.pool).await?;

    Ok(Json(rows.iter().map(role_from_row).collect()))
}

/// Create a new role
#[utoipa::path(
    post,
    path = "/api/v1/roles",
    tag = "Roles",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role name already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    ensure_role_name_available(&state.pool, &req.name, None).await?;

    let id = Uuid::new_v4();
    let now = utc_now();
    let permissions_json = serde_json::to_string(&req.permissions)
        .map_err(|err| AppError::bad_request(format!("invalid permission structure: {err}")))?;

    sqlx::query(
        "INSERT INTO roles (id, name, description, permissions, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&req.name)
    .bind(&req.description)
    .bind(&permissions_json)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let role = Role {
        id,
        name: req.name,
        description: req.description,
        permissions: req.permissions,
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
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

/// Get a role by id or by name
#[utoipa::path(
    get,
    path = "/api/v1/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = String, Path, description = "Role id or name")),
    responses(
        (status = 200, description = "Role details", body = Role),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(role_key): Path<String>,
) -> AppResult<Json<Role>> {
    let role = resolve_role(&state.pool, &role_key).await?;
    Ok(Json(role))
}

/// Update a role; renames re-check name uniqueness
#[utoipa::path(
    put,
    path = "/api/v1/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role name already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
    Json(req): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    let previous = fetch_role(&state.pool, role_id, false).await?;
    let mut role = previous.clone();

    if let Some(name) = req.name {
        if name != role.name {
            ensure_role_name_available(&state.pool, &name, Some(role_id)).await?;
        }
        role.name = name;
    }
    if req.description.is_some() {
        role.description = req.description;
    }
    if let Some(permissions) = req.permissions {
        role.permissions = permissions;
    }

    let now = utc_now();
    let permissions_json = serde_json::to_string(&role.permissions)
        .map_err(|err| AppError::bad_request(format!("invalid permission structure: {err}")))?;

    sqlx::query(
        "UPDATE roles SET name = ?, description = ?, permissions = ?, updated_by = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&role.name)
    .bind(&role.description)
    .bind(&permissions_json)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(role_id.to_string())
    .execute(&state.pool)
    .await?;

    role.updated_by = Some(auth.user_id);
    role.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &role,
        Some(&previous),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

/// Soft-delete a role
#[utoipa::path(
    delete,
    path = "/api/v1/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role soft-deleted"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let role = fetch_role(&state.pool, role_id, false).await?;

    let now = utc_now();
    sqlx::query(
        "UPDATE roles SET deleted_at = ?, deleted_by = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(role_id.to_string())
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Permanently delete a role, soft-deleted or not
#[utoipa::path(
    delete,
    path = "/api/v1/roles/{role_id}/force",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role permanently deleted"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn force_delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let role = fetch_role(&state.pool, role_id, true).await?;

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "force_deleted",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Restore a soft-deleted role
#[utoipa::path(
    post,
    path = "/api/v1/roles/{role_id}/restore",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role restored", body = Role),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn restore_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    let mut role = fetch_role(&state.pool, role_id, true).await?;

    let now = utc_now();
    sqlx::query("UPDATE roles SET deleted_at = NULL, deleted_by = NULL, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(role_id.to_string())
        .execute(&state.pool)
        .await?;

    role.deleted_at = None;
    role.deleted_by = None;
    role.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "restored",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

/// Actions a role may perform on one resource
#[utoipa::path(
    get,
    path = "/api/v1/roles/{role_id}/actions/{resource}",
    tag = "Roles",
    params(
        ("role_id" = String, Path, description = "Role id or name"),
        ("resource" = String, Path, description = "Resource name"),
    ),
    responses(
        (status = 200, description = "Granted actions", body = ResourceActionsResponse),
        (status = 404, description = "Role or resource not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn actions_for_resource(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((role_key, resource)): Path<(String, String)>,
) -> AppResult<Json<ResourceActionsResponse>> {
    let role = resolve_role(&state.pool, &role_key).await?;
    ensure_resource_exists(&state.pool, &resource).await?;

    Ok(Json(ResourceActionsResponse {
        role: role.name.clone(),
        resource: resource.clone(),
        actions: role.permissions.actions_for(&resource).into_iter().collect(),
    }))
}

/// Grants across every known resource; ALL structures are expanded
#[utoipa::path(
    get,
    path = "/api/v1/roles/{role_id}/resource-actions",
    tag = "Roles",
    params(("role_id" = String, Path, description = "Role id or name")),
    responses(
        (status = 200, description = "Resource name to granted actions"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn resource_actions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(role_key): Path<String>,
) -> AppResult<Json<BTreeMap<String, BTreeSet<String>>>> {
    let role = resolve_role(&state.pool, &role_key).await?;

    let known: Vec<String> =
        sqlx::query_scalar("SELECT name FROM resources WHERE deleted_at IS NULL ORDER BY name")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(role.permissions.all_resource_actions(&known)))
}

/// Ad-hoc permission check
#[utoipa::path(
    post,
    path = "/api/v1/roles/{role_id}/check",
    tag = "Roles",
    params(("role_id" = String, Path, description = "Role id or name")),
    request_body = PermissionCheckRequest,
    responses(
        (status = 200, description = "Check result", body = PermissionCheckResponse),
        (status = 404, description = "Role or resource not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_permission(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(role_key): Path<String>,
    Json(req): Json<PermissionCheckRequest>,
) -> AppResult<Json<PermissionCheckResponse>> {
    let response = evaluate_check(&state.pool, &role_key, req.resource, req.action).await?;
    Ok(Json(response))
}

/// Ad-hoc permission check via query parameters
#[utoipa::path(
    get,
    path = "/api/v1/roles/{role_id}/check",
    tag = "Roles",
    params(
        ("role_id" = String, Path, description = "Role id or name"),
        PermissionCheckQuery,
    ),
    responses(
        (status = 200, description = "Check result", body = PermissionCheckResponse),
        (status = 404, description = "Role or resource not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_permission_by_query(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(role_key): Path<String>,
    Query(query): Query<PermissionCheckQuery>,
) -> AppResult<Json<PermissionCheckResponse>> {
    let response = evaluate_check(&state.pool, &role_key, query.resource, query.action).await?;
    Ok(Json(response))
}

async fn evaluate_check(
    pool: &SqlitePool,
    role_key: &str,
    resource: String,
    action: String,
) -> AppResult<PermissionCheckResponse> {
    let role = resolve_role(pool, role_key).await?;
    ensure_resource_exists(pool, &resource).await?;

    let allowed = role.permissions.allows(&resource, &action);

    Ok(PermissionCheckResponse {
        role: role.name,
        resource,
        action,
        allowed,
    })
}

/// Resolve a path key to a non-deleted role: ids take the id lookup,
/// anything else is treated as a role name.
async fn resolve_role(pool: &SqlitePool, key: &str) -> AppResult<Role> {
    match Uuid::parse_str(key) {
        Ok(role_id) => fetch_role(pool, role_id, false).await,
        Err(_) => fetch_role_by_name(pool, key).await,
    }
}

async fn fetch_role(pool: &SqlitePool, role_id: Uuid, include_deleted: bool) -> AppResult<Role> {
    let filter = if include_deleted { "" } else { " AND deleted_at IS NULL" };
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?{filter}");

    let row = sqlx::query(&sql)
        .bind(role_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role {role_id} not found")))?;

    Ok(role_from_row(&row))
}

async fn fetch_role_by_name(pool: &SqlitePool, name: &str) -> AppResult<Role> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = ? AND deleted_at IS NULL");

    let row = sqlx::query(&sql)
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role {name} not found")))?;

    Ok(role_from_row(&row))
}

async fn ensure_role_name_available(
    pool: &SqlitePool,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM roles WHERE name = ? AND deleted_at IS NULL AND id != ?",
            )
            .bind(name)
            .bind(id.to_string())
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE name = ? AND deleted_at IS NULL")
                .bind(name)
                .fetch_one(pool)
                .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict(format!("role name {name} already in use")));
    }

    Ok(())
}

async fn ensure_resource_exists(pool: &SqlitePool, name: &str) -> AppResult<()> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM resources WHERE name = ? AND deleted_at IS NULL")
            .bind(name)
            .fetch_one(pool)
            .await?;

    if count == 0 {
        return Err(AppError::not_found(format!("resource {name} not found")));
    }

    Ok(())
}
