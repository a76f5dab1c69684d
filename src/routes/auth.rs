use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers::user_from_row;
use crate::errors::{AppError, AppResult};
use crate::jwt::{AuthUser, PrincipalKind, TokenIdentity};
use crate::models::user::{AuthResponse, LoginRequest, RegisterRequest, SelectOrganizationRequest, User};
use crate::utils::{hash_password, utc_now, verify_password};

/// Role granted to self-registered accounts.
const DEFAULT_ROLE: &str = "MEMBER";

const USER_SELECT: &str = "SELECT u.id, u.name, u.email, u.kind, u.password_hash, u.organization_id, \
     r.name AS role_name, u.created_at, u.updated_at, u.deleted_at \
     FROM users u LEFT JOIN roles r ON r.id = u.role_id AND r.deleted_at IS NULL";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/employee/login", post(employee_login))
        .route("/employee/select-organization", post(select_organization))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let role_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM roles WHERE name = ? AND deleted_at IS NULL")
            .bind(DEFAULT_ROLE)
            .fetch_optional(&state.pool)
            .await?;

    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, kind, role_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind("user")
    .bind(&role_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user = fetch_user_by_id(&state.pool, user_id).await?;
    let token = state.jwt.encode(&identity_for(&user))?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user, password_hash) = fetch_credentials(&state.pool, &payload.email, None).await?;

    if !verify_password(&payload.password, &password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(&identity_for(&user))?;

    Ok(Json(AuthResponse { token, user }))
}

/// Staff login; only `employee` accounts may authenticate here.
#[utoipa::path(
    post,
    path = "/auth/employee/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn employee_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user, password_hash) = fetch_credentials(&state.pool, &payload.email, Some("employee")).await?;

    if !verify_password(&payload.password, &password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(&identity_for(&user))?;

    Ok(Json(AuthResponse { token, user }))
}

/// Pin an employee session to one organization; re-issues the token with
/// the organization claim embedded.
#[utoipa::path(
    post,
    path = "/auth/employee/select-organization",
    tag = "Auth",
    request_body = SelectOrganizationRequest,
    responses(
        (status = 200, description = "Organization selected", body = AuthResponse),
        (status = 403, description = "Not an employee account")
    ),
    security(("bearerAuth" = []))
)]
pub async fn select_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SelectOrganizationRequest>,
) -> AppResult<Json<AuthResponse>> {
    if auth.claims.kind != PrincipalKind::Employee {
        return Err(AppError::forbidden("organization selection requires an employee account"));
    }

    let now = utc_now();
    sqlx::query("UPDATE users SET organization_id = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(payload.organization_id.to_string())
        .bind(now)
        .bind(auth.user_id.to_string())
        .execute(&state.pool)
        .await?;

    let user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    let token = state.jwt.encode(&identity_for(&user))?;

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged")),
    security(("bearerAuth" = []))
)]
pub async fn logout(_auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

fn identity_for(user: &User) -> TokenIdentity {
    TokenIdentity {
        user_id: user.id,
        email: user.email.clone(),
        name: Some(user.name.clone()),
        role: user.role.clone(),
        kind: if user.kind == "employee" {
            PrincipalKind::Employee
        } else {
            PrincipalKind::User
        },
        organization_id: user.organization_id,
    }
}

async fn fetch_credentials(
    pool: &SqlitePool,
    email: &str,
    kind: Option<&str>,
) -> AppResult<(User, String)> {
    let sql = match kind {
        Some(_) => format!("{USER_SELECT} WHERE u.email = ? AND u.kind = ? AND u.deleted_at IS NULL"),
        None => format!("{USER_SELECT} WHERE u.email = ? AND u.deleted_at IS NULL"),
    };

    let mut query = sqlx::query(&sql).bind(email);
    if let Some(kind) = kind {
        query = query.bind(kind);
    }

    let row = query
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_hash: String = row.get("password_hash");

    Ok((user_from_row(&row), password_hash))
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<User> {
    let sql = format!("{USER_SELECT} WHERE u.id = ? AND u.deleted_at IS NULL");

    let row = sqlx::query(&sql)
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))?;

    Ok(user_from_row(&row))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
            .bind(email)
            .fetch_one(pool)
            .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}
