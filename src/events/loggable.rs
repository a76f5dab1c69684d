use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity log entries. Controls retention policies
/// and log filtering downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Long-term retention, never auto-deleted. All RBAC mutations land
    /// here: who could do what, and when it changed, must stay auditable.
    Critical,
    /// Medium-term retention (default).
    Important,
    /// Aggressively trimmed.
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Important
    }
}

/// Trait for entities that can be recorded in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Entity type name, the prefix in event names like "role.created".
    fn entity_type() -> &'static str;

    /// Id of the entity the event is about.
    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }
}
