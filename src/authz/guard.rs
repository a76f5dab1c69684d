use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sqlx::{Row, SqlitePool};

use crate::app::AppState;
use crate::errors::{AppError, AppResult, INSUFFICIENT_PERMISSIONS};
use crate::jwt::Claims;

use super::evaluator::PermissionSet;
use super::inference::infer;
use super::FallbackPolicy;

/// Authentication-flow paths reachable before a role is known. These are
/// matched by prefix against the raw request path.
pub const AUTH_EXEMPT_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/logout",
    "/auth/callback",
    "/auth/employee/login",
    "/auth/employee/select-organization",
];

/// Route-level guard metadata, assembled once at app construction.
/// `public_paths` marks routes that never require authorization (health,
/// docs); `skip_paths` is an operator escape hatch for routes that opt
/// out of protection entirely.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub public_paths: Vec<String>,
    pub skip_paths: Vec<String>,
    pub fallback: FallbackPolicy,
}

impl GuardConfig {
    pub fn from_env() -> Self {
        let skip_paths = std::env::var("GUARD_SKIP_PATHS")
            .unwrap_or_default()
            .split(',')
            .filter(|path| !path.trim().is_empty())
            .map(|path| path.trim().to_string())
            .collect();

        Self {
            public_paths: vec![
                "/health".to_string(),
                "/docs".to_string(),
                "/api-docs".to_string(),
            ],
            skip_paths,
            fallback: FallbackPolicy::from_env(),
        }
    }
}

/// Outcome of one pass through the guard, computed once per request.
/// Under the default open fallback policy every variant except `Denied`
/// resolves to "allow": the guard catches permission violations on
/// routes it understands and deliberately steps aside everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Route marked public in the guard config.
    PublicRoute,
    /// Route marked to skip protection in the guard config.
    SkippedRoute,
    /// Authentication-flow path, reachable before a role exists.
    AuthPath,
    /// No role claim attached; the upstream identity gate owns the 401.
    MissingRoleClaim,
    /// Inference produced no resource or no action for this request.
    UnresolvedTarget,
    /// Role grants the inferred action on the inferred resource.
    Granted,
    /// Role exists and does not grant the inferred pair.
    Denied,
    /// Role lookup missed or errored; resolved by the fallback policy.
    LookupFailed,
}

impl Decision {
    pub fn allows(self, policy: FallbackPolicy) -> bool {
        match self {
            Decision::PublicRoute
            | Decision::SkippedRoute
            | Decision::AuthPath
            | Decision::Granted => true,
            Decision::Denied => false,
            Decision::MissingRoleClaim | Decision::UnresolvedTarget | Decision::LookupFailed => {
                policy == FallbackPolicy::Open
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Decision::PublicRoute => "public_route",
            Decision::SkippedRoute => "skipped_route",
            Decision::AuthPath => "auth_path",
            Decision::MissingRoleClaim => "missing_role_claim",
            Decision::UnresolvedTarget => "unresolved_target",
            Decision::Granted => "granted",
            Decision::Denied => "denied",
            Decision::LookupFailed => "lookup_failed",
        }
    }
}

/// Global route-protection middleware. Runs after the identity layer has
/// (best-effort) attached claims, and before routing.
pub async fn route_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    // Read everything needed from `req` synchronously, then await on owned
    // data only: a `&Request` held across the `.await` would make this
    // future `!Send`, which `middleware::from_fn` requires.
    let decision = match classify(&state, &req) {
        Classification::Resolved(decision) => decision,
        Classification::NeedsLookup {
            role,
            resource,
            action,
        } => decide(&state, &role, resource, action).await,
    };

    tracing::debug!(
        method = %req.method(),
        path = %req.uri().path(),
        decision = decision.as_str(),
        "route guard"
    );

    if decision.allows(state.guard.fallback) {
        next.run(req).await
    } else {
        AppError::forbidden(INSUFFICIENT_PERMISSIONS).into_response()
    }
}

/// Result of the synchronous, request-reading phase of the guard. Either
/// the request resolves to a final decision without a database hit, or it
/// needs a live role lookup for the inferred `(resource, action)` pair.
enum Classification {
    Resolved(Decision),
    NeedsLookup {
        role: String,
        resource: &'static str,
        action: &'static str,
    },
}

/// Synchronous classification pass. All reads of `req` happen here so the
/// borrow ends before any `.await`, keeping the guard future `Send`.
fn classify(state: &AppState, req: &Request) -> Classification {
    let path = req.uri().path();

    if matches_prefix(&state.guard.public_paths, path) {
        return Classification::Resolved(Decision::PublicRoute);
    }
    if matches_prefix(&state.guard.skip_paths, path) {
        return Classification::Resolved(Decision::SkippedRoute);
    }
    if AUTH_EXEMPT_PATHS.iter().any(|prefix| path.starts_with(prefix)) {
        return Classification::Resolved(Decision::AuthPath);
    }

    // Claims are attached (or not) by the upstream identity middleware.
    // Authenticating the request is that layer's job; a missing or
    // role-less claim is not additionally blocked here.
    let role = match req
        .extensions()
        .get::<Claims>()
        .and_then(|claims| claims.role.as_deref())
    {
        Some(role) if !role.is_empty() => role.to_string(),
        _ => return Classification::Resolved(Decision::MissingRoleClaim),
    };

    let target = infer(req.method(), path);
    let (Some(resource), Some(action)) = (target.resource, target.action) else {
        return Classification::Resolved(Decision::UnresolvedTarget);
    };

    Classification::NeedsLookup {
        role,
        resource,
        action,
    }
}

async fn decide(
    state: &AppState,
    role: &str,
    resource: &'static str,
    action: &'static str,
) -> Decision {
    // Re-fetch the live role on every request: the token carries only the
    // role name, never permissions, so admin changes apply without
    // waiting for token expiry. No retry on failure - a failed lookup
    // falls straight to the fallback policy.
    match load_role_permissions(&state.pool, role).await {
        Ok(Some(permissions)) => {
            if permissions.allows(resource, action) {
                Decision::Granted
            } else {
                Decision::Denied
            }
        }
        Ok(None) => {
            tracing::warn!(role = %role, "token role has no matching row, applying fallback policy");
            Decision::LookupFailed
        }
        Err(err) => {
            tracing::warn!(role = %role, error = %err, "role lookup failed, applying fallback policy");
            Decision::LookupFailed
        }
    }
}

fn matches_prefix(prefixes: &[String], path: &str) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

async fn load_role_permissions(
    pool: &SqlitePool,
    role_name: &str,
) -> AppResult<Option<PermissionSet>> {
    let row = sqlx::query("SELECT permissions FROM roles WHERE name = ? AND deleted_at IS NULL")
        .bind(role_name)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let raw: String = row.get("permissions");
    let permissions = serde_json::from_str(&raw).map_err(|err| {
        AppError::internal(format!("malformed permission structure for role {role_name}: {err}"))
    })?;

    Ok(Some(permissions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_policy_allows_everything_but_denied() {
        for decision in [
            Decision::PublicRoute,
            Decision::SkippedRoute,
            Decision::AuthPath,
            Decision::MissingRoleClaim,
            Decision::UnresolvedTarget,
            Decision::Granted,
            Decision::LookupFailed,
        ] {
            assert!(decision.allows(FallbackPolicy::Open), "{:?}", decision);
        }
        assert!(!Decision::Denied.allows(FallbackPolicy::Open));
    }

    #[test]
    fn closed_policy_flips_fallback_branches() {
        assert!(!Decision::MissingRoleClaim.allows(FallbackPolicy::Closed));
        assert!(!Decision::UnresolvedTarget.allows(FallbackPolicy::Closed));
        assert!(!Decision::LookupFailed.allows(FallbackPolicy::Closed));

        // exemptions and positive grants are unaffected
        assert!(Decision::PublicRoute.allows(FallbackPolicy::Closed));
        assert!(Decision::SkippedRoute.allows(FallbackPolicy::Closed));
        assert!(Decision::AuthPath.allows(FallbackPolicy::Closed));
        assert!(Decision::Granted.allows(FallbackPolicy::Closed));
        assert!(!Decision::Denied.allows(FallbackPolicy::Closed));
    }

    #[test]
    fn exemption_list_matches_employee_flows() {
        for path in [
            "/auth/login",
            "/auth/logout",
            "/auth/callback",
            "/auth/employee/login",
            "/auth/employee/select-organization",
        ] {
            assert!(
                AUTH_EXEMPT_PATHS.iter().any(|prefix| path.starts_with(prefix)),
                "{path} should be exempt"
            );
        }
        assert!(!AUTH_EXEMPT_PATHS.iter().any(|p| "/auth/me".starts_with(p)));
        assert!(!AUTH_EXEMPT_PATHS.iter().any(|p| "/auth/register".starts_with(p)));
    }
}
