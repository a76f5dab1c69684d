//! Authorization module - permission model, inference engine, and route guard
//!
//! This module implements the RBAC core:
//! - Per-role permission structures (resource name -> allowed action names)
//!   with an `ALL` fallback grant
//! - Deterministic resource/action inference from HTTP method + URL path
//! - A global route guard with a deliberate fail-open posture, isolated
//!   behind a configurable fallback policy

mod evaluator;
mod guard;
mod inference;

pub use evaluator::PermissionSet;
pub use guard::{route_guard, Decision, GuardConfig, AUTH_EXEMPT_PATHS};
pub use inference::{infer, infer_action, infer_resource, RouteTarget};

/// What the guard does with requests it cannot positively decide
/// (no role claim, unresolvable target, failed role lookup).
///
/// `Open` is the documented default: the guard is a best-effort layered
/// check, not the sole authorization boundary, and degrades to "allow"
/// so the API stays reachable when the RBAC layer is partially
/// unavailable. `Closed` flips those branches to deny for environments
/// that want strict behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    Open,
    Closed,
}

impl FallbackPolicy {
    pub fn from_env() -> Self {
        match std::env::var("GUARD_FALLBACK")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "closed" | "strict" => FallbackPolicy::Closed,
            _ => FallbackPolicy::Open,
        }
    }
}

/// Canonical resource names. Permission structures and the inference
/// table reference resources by these exact strings.
pub mod resources {
    /// Pseudo-resource: fallback grant applying to every resource that is
    /// not explicitly keyed in a permission structure.
    pub const ALL: &str = "ALL";

    pub const USERS: &str = "USERS";
    pub const EMPLOYEES: &str = "EMPLOYEES";
    pub const ORGANIZATIONS: &str = "ORGANIZATIONS";
    pub const ROLES: &str = "ROLES";
    pub const RESOURCES: &str = "RESOURCES";
    pub const ACTIONS: &str = "ACTIONS";
    pub const CAMPAIGNS: &str = "CAMPAIGNS";
    pub const CONTACT_LISTS: &str = "CONTACT_LISTS";
    pub const CONTACTS: &str = "CONTACTS";
    pub const TEMPLATES: &str = "TEMPLATES";
    pub const ASSETS: &str = "ASSETS";
}

/// Canonical action names. Membership tests are exact, case-sensitive
/// string comparisons against these.
pub mod actions {
    pub const CREATE: &str = "CREATE";
    pub const READ: &str = "READ";
    pub const UPDATE: &str = "UPDATE";
    pub const DELETE: &str = "DELETE";
    pub const LIST: &str = "LIST";
    pub const EXPORT: &str = "EXPORT";
    pub const IMPORT: &str = "IMPORT";
}
