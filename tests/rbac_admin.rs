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
    let db_path = dir.path().join("test_rbac.db");
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

fn admin_token() -> Result<String> {
    let jwt = JwtConfig::from_env()?;
    let identity = TokenIdentity {
        user_id: Uuid::new_v4(),
        email: "admin@example.com".to_string(),
        name: Some("Admin".to_string()),
        role: Some("ADMIN".to_string()),
        kind: PrincipalKind::Employee,
        organization_id: None,
    };
    Ok(jwt.encode(&identity)?)
}

fn request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    let request = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(body.to_string()))?
        }
        None => builder.body(Body::empty())?,
    };
    Ok(request)
}

async fn body_json(resp: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn role_lifecycle_and_permission_round_trip() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let token = admin_token()?;

    let permissions = json!({"ACTIONS": ["CREATE", "READ"]});

    // create
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/roles",
            &token,
            Some(json!({"name": "QA", "description": "quality", "permissions": permissions})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await?;
    let role_id = created["id"].as_str().context("role id missing")?.to_string();
    assert_eq!(created["permissions"], permissions);

    // duplicate name conflicts
    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/roles", &token, Some(json!({"name": "QA"})))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // the same path parameter resolves by id and by name
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/api/v1/roles/{role_id}"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/roles/QA", &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // rename onto an existing name conflicts; a fresh name succeeds
    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/roles/{role_id}"),
            &token,
            Some(json!({"name": "ADMIN"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/roles/{role_id}"),
            &token,
            Some(json!({"name": "QA_TEAM"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // soft delete hides the role from default queries and frees the name
    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/api/v1/roles/{role_id}"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/api/v1/roles/{role_id}"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/roles/QA_TEAM", &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/roles", &token, Some(json!({"name": "QA_TEAM"})))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let replacement = body_json(resp).await?;
    let replacement_id = replacement["id"].as_str().context("role id missing")?.to_string();

    // drop the replacement again so the restore below has a free name
    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/api/v1/roles/{replacement_id}/force"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // restore brings the original back with an identical permission structure
    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/api/v1/roles/{role_id}/restore"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let restored = body_json(resp).await?;
    assert_eq!(restored["permissions"], permissions);
    assert!(restored.get("deleted_at").is_none());

    // permanent delete is terminal: nothing left to restore
    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/api/v1/roles/{role_id}/force"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/api/v1/roles/{role_id}/restore"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn permission_queries() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let token = admin_token()?;

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/roles",
            &token,
            Some(json!({"name": "AUDITOR", "permissions": {"ACTIONS": ["CREATE", "READ"]}})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await?;
    let auditor_id = created["id"].as_str().context("role id missing")?.to_string();

    // actions for one resource, by role id and by role name
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/api/v1/roles/{auditor_id}/actions/ACTIONS"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["actions"], json!(["CREATE", "READ"]));

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/roles/AUDITOR/actions/ACTIONS", &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // unknown resource is a 404, not an empty grant
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/api/v1/roles/{auditor_id}/actions/NOPE"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // ad-hoc checks
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/api/v1/roles/{auditor_id}/check"),
            &token,
            Some(json!({"resource": "ACTIONS", "action": "CREATE"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["allowed"], json!(true));

    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/api/v1/roles/{auditor_id}/check"),
            &token,
            Some(json!({"resource": "ACTIONS", "action": "DELETE"})),
        )?)
        .await?;
    let body = body_json(resp).await?;
    assert_eq!(body["allowed"], json!(false));

    let resp = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/roles/{auditor_id}/check?resource=ACTIONS&action=READ"),
            &token,
            None,
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await?;
    assert_eq!(body["allowed"], json!(true));

    // expansion: the seeded ADMIN role holds ALL and is reported across
    // every known resource except the ALL pseudo-resource
    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/roles/ADMIN/resource-actions", &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let expansion = body_json(resp).await?;
    let map = expansion.as_object().context("expansion must be an object")?;
    assert!(map.get("ALL").is_none());
    assert!(map.contains_key("USERS"));
    assert!(map.contains_key("CAMPAIGNS"));
    assert_eq!(map["USERS"].as_array().map(Vec::len), Some(7));

    // an explicit structure is returned verbatim
    let resp = app
        .clone()
        .oneshot(request("GET", &format!("/api/v1/roles/{auditor_id}/resource-actions"), &token, None)?)
        .await?;
    let expansion = body_json(resp).await?;
    assert_eq!(expansion, json!({"ACTIONS": ["CREATE", "READ"]}));

    Ok(())
}

#[tokio::test]
async fn resource_and_action_registries() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let token = admin_token()?;

    // resources
    let resp = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/resources",
            &token,
            Some(json!({"name": "SEGMENTS", "description": "Audience segments"})),
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await?;
    let resource_id = created["id"].as_str().context("resource id missing")?.to_string();

    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/resources", &token, Some(json!({"name": "SEGMENTS"})))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/resources/SEGMENTS", &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request("DELETE", &format!("/api/v1/resources/{resource_id}"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/resources/SEGMENTS", &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(request("POST", &format!("/api/v1/resources/{resource_id}/restore"), &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // actions
    let resp = app
        .clone()
        .oneshot(request("POST", "/api/v1/actions", &token, Some(json!({"name": "ARCHIVE"})))?)
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/actions/ARCHIVE", &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(request("GET", "/api/v1/actions", &token, None)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let listing = body_json(resp).await?;
    let names: Vec<&str> = listing
        .as_array()
        .context("listing must be an array")?
        .iter()
        .filter_map(|action| action["name"].as_str())
        .collect();
    assert!(names.contains(&"ARCHIVE"));
    assert!(names.contains(&"CREATE"));

    Ok(())
}
