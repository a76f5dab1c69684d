//! Manual row mapping for entities whose ids live as TEXT columns.
//! Queries select named columns; these helpers turn rows back into API
//! models without `FromRow` derives so joins can alias freely.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::models::campaign::Campaign;
use crate::models::rbac::{Action, Resource, Role};
use crate::models::user::User;

fn uuid_col(row: &SqliteRow, column: &str) -> Uuid {
    Uuid::parse_str(row.get::<&str, _>(column)).unwrap_or_default()
}

fn opt_uuid_col(row: &SqliteRow, column: &str) -> Option<Uuid> {
    row.get::<Option<String>, _>(column)
        .and_then(|raw| Uuid::parse_str(&raw).ok())
}

pub fn role_from_row(row: &SqliteRow) -> Role {
    let raw_permissions: String = row.get("permissions");

    Role {
        id: uuid_col(row, "id"),
        name: row.get("name"),
        description: row.get("description"),
        permissions: serde_json::from_str(&raw_permissions).unwrap_or_default(),
        created_by: opt_uuid_col(row, "created_by"),
        updated_by: opt_uuid_col(row, "updated_by"),
        deleted_by: opt_uuid_col(row, "deleted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

pub fn resource_from_row(row: &SqliteRow) -> Resource {
    Resource {
        id: uuid_col(row, "id"),
        name: row.get("name"),
        description: row.get("description"),
        created_by: opt_uuid_col(row, "created_by"),
        updated_by: opt_uuid_col(row, "updated_by"),
        deleted_by: opt_uuid_col(row, "deleted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

pub fn action_from_row(row: &SqliteRow) -> Action {
    Action {
        id: uuid_col(row, "id"),
        name: row.get("name"),
        description: row.get("description"),
        created_by: opt_uuid_col(row, "created_by"),
        updated_by: opt_uuid_col(row, "updated_by"),
        deleted_by: opt_uuid_col(row, "deleted_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

/// Expects the role name joined in as `role_name`.
pub fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: uuid_col(row, "id"),
        name: row.get("name"),
        email: row.get("email"),
        kind: row.get("kind"),
        role: row.get("role_name"),
        organization_id: opt_uuid_col(row, "organization_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}

pub fn campaign_from_row(row: &SqliteRow) -> Campaign {
    Campaign {
        id: uuid_col(row, "id"),
        name: row.get("name"),
        subject: row.get("subject"),
        status: row.get("status"),
        created_by: opt_uuid_col(row, "created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    }
}
