use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::authz::PermissionSet;
use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resource name -> allowed action names; `ALL` is the fallback key.
    #[schema(value_type = Object)]
    pub permissions: PermissionSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "CAMPAIGN_MANAGER")]
    pub name: String,
    #[schema(example = "Can manage campaigns and contact lists")]
    pub description: Option<String>,
    /// Defaults to an empty structure (no grants).
    #[serde(default)]
    #[schema(value_type = Object)]
    pub permissions: PermissionSet,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Object)]
    pub permissions: Option<PermissionSet>,
}

// =============================================================================
// RESOURCE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loggable for Resource {
    fn entity_type() -> &'static str { "resource" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResourceCreateRequest {
    #[schema(example = "SEGMENTS")]
    pub name: String,
    #[schema(example = "Audience segments")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResourceUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

// =============================================================================
// ACTION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Action {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loggable for Action {
    fn entity_type() -> &'static str { "action" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActionCreateRequest {
    #[schema(example = "ARCHIVE")]
    pub name: String,
    #[schema(example = "Archive completed entities")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActionUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

// =============================================================================
// PERMISSION QUERIES
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionCheckRequest {
    #[schema(example = "CAMPAIGNS")]
    pub resource: String,
    #[schema(example = "READ")]
    pub action: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PermissionCheckQuery {
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub role: String,
    pub resource: String,
    pub action: String,
    pub allowed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceActionsResponse {
    pub role: String,
    pub resource: String,
    pub actions: Vec<String>,
}
