use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers::campaign_from_row;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::campaign::{self, Campaign, CampaignCreateRequest, CampaignUpdateRequest};
use crate::utils::utc_now;

const CAMPAIGN_COLUMNS: &str =
    "id, name, subject, status, created_by, created_at, updated_at, deleted_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_campaigns).post(create_campaign))
        .route("/:id", get(get_campaign).put(update_campaign).delete(delete_campaign))
        .route("/:id/force", delete(force_delete_campaign))
        .route("/:id/restore", post(restore_campaign))
        .route("/:id/export", get(export_campaign))
}

#[utoipa::path(
    get,
    path = "/api/v1/campaigns",
    tag = "Campaigns",
    responses((status = 200, description = "List campaigns", body = Vec<Campaign>)),
    security(("bearerAuth" = []))
)]
pub async fn list_campaigns(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Campaign>>> {
    let sql = format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE deleted_at IS NULL ORDER BY created_at DESC"
    );
    let rows = sqlx::query(&sql).fetch_all(&state.pool).await?;

    Ok(Json(rows.iter().map(campaign_from_row).collect()))
}

/// Export snapshot of one campaign
#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}/export",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Export snapshot", body = Campaign),
        (status = 404, description = "Campaign not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn export_campaign(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Campaign>> {
    let campaign = fetch_campaign(&state.pool, id, false).await?;
    Ok(Json(campaign))
}

#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    tag = "Campaigns",
    request_body = CampaignCreateRequest,
    responses((status = 201, description = "Campaign created", body = Campaign)),
    security(("bearerAuth" = []))
)]
pub async fn create_campaign(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CampaignCreateRequest>,
) -> AppResult<(StatusCode, Json<Campaign>)> {
    let id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO campaigns (id, name, subject, status, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, 'draft', ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&payload.name)
    .bind(&payload.subject)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let campaign = Campaign {
        id,
        name: payload.name,
        subject: payload.subject,
        status: "draft".to_string(),
        created_by: Some(auth.user_id),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    log_activity(&state.event_bus, "created", Some(auth.user_id), &campaign);

    Ok((StatusCode::CREATED, Json(campaign)))
}

#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Campaign detail", body = Campaign),
        (status = 404, description = "Campaign not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_campaign(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Campaign>> {
    let campaign = fetch_campaign(&state.pool, id, false).await?;
    Ok(Json(campaign))
}

#[utoipa::path(
    put,
    path = "/api/v1/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign id")),
    request_body = CampaignUpdateRequest,
    responses(
        (status = 200, description = "Campaign updated", body = Campaign),
        (status = 404, description = "Campaign not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_campaign(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CampaignUpdateRequest>,
) -> AppResult<Json<Campaign>> {
    let mut campaign = fetch_campaign(&state.pool, id, false).await?;

    if let Some(name) = payload.name {
        campaign.name = name;
    }
    if let Some(subject) = payload.subject {
        campaign.subject = subject;
    }
    if let Some(status) = payload.status {
        if !campaign::STATUSES.contains(&status.as_str()) {
            return Err(AppError::bad_request(format!("unknown campaign status {status}")));
        }
        campaign.status = status;
    }

    let now = utc_now();
    sqlx::query(
        "UPDATE campaigns SET name = ?, subject = ?, status = ?, updated_at = ? \
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&campaign.name)
    .bind(&campaign.subject)
    .bind(&campaign.status)
    .bind(now)
    .bind(id.to_string())
    .execute(&state.pool)
    .await?;

    campaign.updated_at = now;

    log_activity(&state.event_bus, "updated", Some(auth.user_id), &campaign);

    Ok(Json(campaign))
}

#[utoipa::path(
    delete,
    path = "/api/v1/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 204, description = "Campaign soft-deleted"),
        (status = 404, description = "Campaign not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_campaign(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let campaign = fetch_campaign(&state.pool, id, false).await?;

    let now = utc_now();
    sqlx::query("UPDATE campaigns SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &campaign);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/v1/campaigns/{id}/force",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 204, description = "Campaign permanently deleted"),
        (status = 404, description = "Campaign not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn force_delete_campaign(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let campaign = fetch_campaign(&state.pool, id, true).await?;

    sqlx::query("DELETE FROM campaigns WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity(&state.event_bus, "force_deleted", Some(auth.user_id), &campaign);

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/restore",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Campaign restored", body = Campaign),
        (status = 404, description = "Campaign not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn restore_campaign(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Campaign>> {
    let mut campaign = fetch_campaign(&state.pool, id, true).await?;

    let now = utc_now();
    sqlx::query("UPDATE campaigns SET deleted_at = NULL, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    campaign.deleted_at = None;
    campaign.updated_at = now;

    log_activity(&state.event_bus, "restored", Some(auth.user_id), &campaign);

    Ok(Json(campaign))
}

async fn fetch_campaign(pool: &SqlitePool, id: Uuid, include_deleted: bool) -> AppResult<Campaign> {
    let filter = if include_deleted { "" } else { " AND deleted_at IS NULL" };
    let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?{filter}");

    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("campaign {id} not found")))?;

    Ok(campaign_from_row(&row))
}
