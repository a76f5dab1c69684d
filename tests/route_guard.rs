use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;
use uuid::Uuid;

use mailcraft::create_app;
use mailcraft::jwt::{JwtConfig, PrincipalKind, TokenIdentity};

async fn setup() -> Result<(Router, SqlitePool, tempfile::TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_guard.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok((app, pool, dir))
}

fn token_for(role: Option<&str>) -> Result<String> {
    let jwt = JwtConfig::from_env()?;
    let identity = TokenIdentity {
        user_id: Uuid::new_v4(),
        email: "tester@example.com".to_string(),
        name: Some("Tester".to_string()),
        role: role.map(String::from),
        kind: PrincipalKind::User,
        organization_id: None,
    };
    Ok(jwt.encode(&identity)?)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    Ok(request)
}

async fn body_json(resp: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn route_guard_decisions() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    // public route: no token needed
    let resp = app.clone().oneshot(request("GET", "/health", None, None)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // auth exemptions reach their handlers without a role
    let bad_creds = json!({"email": "nobody@example.com", "password": "password123"});
    let resp = app
        .clone()
        .oneshot(request("POST", "/auth/login", None, Some(bad_creds.clone()))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "login must be reachable, not forbidden");

    let resp = app
        .clone()
        .oneshot(request("POST", "/auth/employee/login", None, Some(bad_creds))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/auth/employee/select-organization",
            None,
            Some(json!({"organization_id": Uuid::new_v4()})),
        )?)
        .await?;
    // exempt from the guard; the handler itself demands identity
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // exempt path with no registered route: falls through to routing, not to a 403
    let resp = app.clone().oneshot(request("GET", "/auth/callback", None, None)?).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // token without a role claim: guard steps aside, handler accepts the identity
    let roleless = token_for(None)?;
    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/roles", Some(&roleless), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK, "missing role claim must not be blocked by the guard");

    // path with no known resource segment: unresolved target, allowed through
    let member = token_for(Some("MEMBER"))?;
    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/profile", Some(&member), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // role name with no matching row: lookup miss, allowed through
    let ghost = token_for(Some("GHOST"))?;
    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/users", Some(&ghost), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn explicit_grants_end_to_end() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let admin = token_for(Some("ADMIN"))?;

    // seeded ADMIN holds ALL, so it may create roles
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/roles",
            Some(&admin),
            Some(json!({
                "name": "USER_VIEWER",
                "permissions": {"USERS": ["READ", "LIST"]}
            })),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let viewer = token_for(Some("USER_VIEWER"))?;

    // LIST on USERS is granted
    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/users", Some(&viewer), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // DELETE on USERS is not in the grant set: denied before routing
    let resp = app
        .clone()
        .oneshot(request("DELETE", "/api/v1/users/5", Some(&viewer), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await?;
    assert_eq!(
        body["message"],
        "Forbidden. Insufficient permissions for this operation",
        "denial message must not leak the checked pair"
    );

    Ok(())
}

#[tokio::test]
async fn all_fallback_grant_end_to_end() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    // seeded SUPPORT holds {"ALL": ["READ", "LIST"]}
    let support = token_for(Some("SUPPORT"))?;

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/campaigns", Some(&support), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // READ on a campaign id resolves through the ALL fallback; the 404 is
    // the handler's, which proves the guard let the request in
    let missing = Uuid::new_v4();
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/api/v1/campaigns/{missing}"), Some(&support), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // CREATE is not in the fallback set
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/campaigns",
            Some(&support),
            Some(json!({"name": "Autumn", "subject": "Hello"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn restore_paths_classify_as_update() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let admin = token_for(Some("ADMIN"))?;

    for (name, permissions) in [
        ("RESTORER", json!({"ROLES": ["UPDATE"]})),
        ("CREATOR", json!({"ROLES": ["CREATE"]})),
    ] {
        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/roles",
                Some(&admin),
                Some(json!({"name": name, "permissions": permissions})),
            )?)
            .await?;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let missing = Uuid::new_v4();

    // POST .../restore is classified UPDATE, so the UPDATE-holder passes the
    // guard and reaches the handler (which 404s on the random id)
    let restorer = token_for(Some("RESTORER"))?;
    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/api/v1/roles/{missing}/restore"), Some(&restorer), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // the CREATE-holder is denied even though the verb is POST
    let creator = token_for(Some("CREATOR"))?;
    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/api/v1/roles/{missing}/restore"), Some(&creator), None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}
