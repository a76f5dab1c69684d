use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

pub const STATUSES: &[&str] = &["draft", "scheduled", "sent"];

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    #[schema(example = "draft")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Loggable for Campaign {
    fn entity_type() -> &'static str { "campaign" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CampaignCreateRequest {
    #[schema(example = "October newsletter")]
    pub name: String,
    #[schema(example = "What's new this month")]
    pub subject: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CampaignUpdateRequest {
    pub name: Option<String>,
    pub subject: Option<String>,
    #[schema(example = "scheduled")]
    pub status: Option<String>,
}
