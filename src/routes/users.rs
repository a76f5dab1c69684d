use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers::user_from_row;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::user::User;

const USER_SELECT: &str = "SELECT u.id, u.name, u.email, u.kind, u.organization_id, \
     r.name AS role_name, u.created_at, u.updated_at, u.deleted_at \
     FROM users u LEFT JOIN roles r ON r.id = u.role_id AND r.deleted_at IS NULL";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:user_id", get(get_user))
}

/// List all non-deleted users
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "Users",
    responses((status = 200, description = "List of users", body = Vec<User>)),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    let sql = format!("{USER_SELECT} WHERE u.deleted_at IS NULL ORDER BY u.created_at DESC");
    let rows = sqlx::query(&sql).fetch_all(&state.pool).await?;

    Ok(Json(rows.iter().map(user_from_row).collect()))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let sql = format!("{USER_SELECT} WHERE u.id = ? AND u.deleted_at IS NULL");

    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))?;

    Ok(Json(user_from_row(&row)))
}
