//! Resource registry administration. Resource rows are referenced by
//! name from role permission structures; renames do not cascade into
//! existing structures. The GET-by-key endpoint accepts an id or a
//! name; mutations take the id.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers::resource_from_row;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::rbac::{Resource, ResourceCreateRequest, ResourceUpdateRequest};
use crate::utils::utc_now;

const RESOURCE_COLUMNS: &str =
    "id, name, description, created_by, updated_by, deleted_by, created_at, updated_at, deleted_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_resources).post(create_resource))
        .route("/:resource_id", get(get_resource).put(update_resource).delete(delete_resource))
        .route("/:resource_id/force", delete(force_delete_resource))
        .route("/:resource_id/restore", post(restore_resource))
}

/// List all non-deleted resources
#[utoipa::path(
    get,
    path = "/api/v1/resources",
    tag = "Resources",
    responses((status = 200, description = "List of resources", body = Vec<Resource>)),
    security(("bearerAuth" = []))
)]
pub async fn list_resources(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Resource>>> {
    let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE deleted_at IS NULL ORDER BY name");
    let rows = sqlx::query(&sql).fetch_all(&state.pool).await?;

    Ok(Json(rows.iter().map(resource_from_row).collect()))
}

/// Register a new resource
#[utoipa::path(
    post,
    path = "/api/v1/resources",
    tag = "Resources",
    request_body = ResourceCreateRequest,
    responses(
        (status = 201, description = "Resource created", body = Resource),
        (status = 409, description = "Resource name already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<ResourceCreateRequest>,
) -> AppResult<(StatusCode, Json<Resource>)> {
    ensure_name_available(&state.pool, &req.name, None).await?;

    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO resources (id, name, description, created_by, created_at, updated_at) \
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

    let resource = Resource {
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
        &resource,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(resource)))
}

/// Get a resource by id or by name
#[utoipa::path(
    get,
    path = "/api/v1/resources/{resource_id}",
    tag = "Resources",
    params(("resource_id" = String, Path, description = "Resource id or name")),
    responses(
        (status = 200, description = "Resource details", body = Resource),
        (status = 404, description = "Resource not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_resource(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(resource_key): Path<String>,
) -> AppResult<Json<Resource>> {
    let resource = match Uuid::parse_str(&resource_key) {
        Ok(resource_id) => fetch_resource(&state.pool, resource_id, false).await?,
        Err(_) => fetch_resource_by_name(&state.pool, &resource_key).await?,
    };
    Ok(Json(resource))
}

/// Update a resource; renames re-check name uniqueness
#[utoipa::path(
    put,
    path = "/api/v1/resources/{resource_id}",
    tag = "Resources",
    params(("resource_id" = Uuid, Path, description = "Resource id")),
    request_body = ResourceUpdateRequest,
    responses(
        (status = 200, description = "Resource updated", body = Resource),
        (status = 404, description = "Resource not found"),
        (status = 409, description = "Resource name already in use"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(resource_id): Path<Uuid>,
    Json(req): Json<ResourceUpdateRequest>,
) -> AppResult<Json<Resource>> {
    let previous = fetch_resource(&state.pool, resource_id, false).await?;
    let mut resource = previous.clone();

    if let Some(name) = req.name {
        if name != resource.name {
            ensure_name_available(&state.pool, &name, Some(resource_id)).await?;
        }
        resource.name = name;
    }
    if req.description.is_some() {
        resource.description = req.description;
    }

    let now = utc_now();
    sqlx::query(
        "UPDATE resources SET name = ?, description = ?, updated_by = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&resource.name)
    .bind(&resource.description)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(resource_id.to_string())
    .execute(&state.pool)
    .await?;

    resource.updated_by = Some(auth.user_id);
    resource.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &resource,
        Some(&previous),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(resource))
}

/// Soft-delete a resource
#[utoipa::path(
    delete,
    path = "/api/v1/resources/{resource_id}",
    tag = "Resources",
    params(("resource_id" = Uuid, Path, description = "Resource id")),
    responses(
        (status = 204, description = "Resource soft-deleted"),
        (status = 404, description = "Resource not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(resource_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let resource = fetch_resource(&state.pool, resource_id, false).await?;

    let now = utc_now();
    sqlx::query(
        "UPDATE resources SET deleted_at = ?, deleted_by = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(resource_id.to_string())
    .execute(&state.pool)
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &resource,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Permanently delete a resource
#[utoipa::path(
    delete,
    path = "/api/v1/resources/{resource_id}/force",
    tag = "Resources",
    params(("resource_id" = Uuid, Path, description = "Resource id")),
    responses(
        (status = 204, description = "Resource permanently deleted"),
        (status = 404, description = "Resource not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn force_delete_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(resource_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let resource = fetch_resource(&state.pool, resource_id, true).await?;

    sqlx::query("DELETE FROM resources WHERE id = ?")
        .bind(resource_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "force_deleted",
        Some(auth.user_id),
        &resource,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Restore a soft-deleted resource
#[utoipa::path(
    post,
    path = "/api/v1/resources/{resource_id}/restore",
    tag = "Resources",
    params(("resource_id" = Uuid, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource restored", body = Resource),
        (status = 404, description = "Resource not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn restore_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(resource_id): Path<Uuid>,
) -> AppResult<Json<Resource>> {
    let mut resource = fetch_resource(&state.pool, resource_id, true).await?;

    let now = utc_now();
    sqlx::query("UPDATE resources SET deleted_at = NULL, deleted_by = NULL, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(resource_id.to_string())
        .execute(&state.pool)
        .await?;

    resource.deleted_at = None;
    resource.deleted_by = None;
    resource.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "restored",
        Some(auth.user_id),
        &resource,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(resource))
}

async fn fetch_resource_by_name(pool: &SqlitePool, name: &str) -> AppResult<Resource> {
    let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE name = ? AND deleted_at IS NULL");

    let row = sqlx::query(&sql)
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("resource {name} not found")))?;

    Ok(resource_from_row(&row))
}

async fn fetch_resource(
    pool: &SqlitePool,
    resource_id: Uuid,
    include_deleted: bool,
) -> AppResult<Resource> {
    let filter = if include_deleted { "" } else { " AND deleted_at IS NULL" };
    let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?{filter}");

    let row = sqlx::query(&sql)
        .bind(resource_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("resource {resource_id} not found")))?;

    Ok(resource_from_row(&row))
}

async fn ensure_name_available(pool: &SqlitePool, name: &str, exclude: Option<Uuid>) -> AppResult<()> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar(
                "SELECT COUNT(1) FROM resources WHERE name = ? AND deleted_at IS NULL AND id != ?",
            )
            .bind(name)
            .bind(id.to_string())
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(1) FROM resources WHERE name = ? AND deleted_at IS NULL")
                .bind(name)
                .fetch_one(pool)
                .await?
        }
    };

    if count > 0 {
        return Err(AppError::conflict(format!("resource name {name} already in use")));
    }

    Ok(())
}
