use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;

use mailcraft::create_app;

async fn body_json(resp: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn auth_flow_edge_cases() -> Result<()> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_auth.db");
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

    // 1. Register with short password
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "Short", "email": "short@example.com", "password": "short"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // 2. Register a valid user; self-registration lands on the MEMBER role
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "Ada", "email": "ada@example.com", "password": "password123"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await?;
    let member_token = created["token"].as_str().context("token missing")?.to_string();
    assert_eq!(created["user"]["role"], json!("MEMBER"));
    assert_eq!(created["user"]["kind"], json!("user"));

    // 3. Duplicate email
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "Ada 2", "email": "ada@example.com", "password": "password123"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // 4. Wrong password
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"email": "ada@example.com", "password": "wrongpassword"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 5. Valid login
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"email": "ada@example.com", "password": "password123"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // 6. /auth/me echoes the account
    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("authorization", format!("Bearer {member_token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let me = body_json(resp).await?;
    assert_eq!(me["email"], json!("ada@example.com"));

    // 7. MEMBER grants reach campaigns but not role administration
    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/campaigns")
        .header("authorization", format!("Bearer {member_token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/roles")
        .header("authorization", format!("Bearer {member_token}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"name": "SNEAKY"}).to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // 8. Customer accounts cannot use the employee login
    let req = Request::builder()
        .method("POST")
        .uri("/auth/employee/login")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"email": "ada@example.com", "password": "password123"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 9. ...nor pin an organization
    let req = Request::builder()
        .method("POST")
        .uri("/auth/employee/select-organization")
        .header("authorization", format!("Bearer {member_token}"))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"organization_id": "00000000-0000-0000-0000-000000000001"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // 10. Access a protected route without a token: the guard steps aside
    // (no role claim) and the handler's extractor rejects
    let req = Request::builder().method("GET").uri("/api/v1/campaigns").body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 11. Logout acknowledges
    let req = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header("authorization", format!("Bearer {member_token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn employee_organization_selection() -> Result<()> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_employee.db");
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

    // seed an employee directly, the way the admin CLI would
    let password_hash = mailcraft::utils::hash_password("password123").map_err(|e| anyhow::anyhow!("{e}"))?;
    let admin_role_id: String =
        sqlx::query_scalar("SELECT id FROM roles WHERE name = 'ADMIN' AND deleted_at IS NULL")
            .fetch_one(&pool)
            .await?;
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, kind, role_id, created_at, updated_at) \
         VALUES (?, 'Ops', 'ops@example.com', ?, 'employee', ?, datetime('now'), datetime('now'))",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&password_hash)
    .bind(&admin_role_id)
    .execute(&pool)
    .await?;

    let req = Request::builder()
        .method("POST")
        .uri("/auth/employee/login")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"email": "ops@example.com", "password": "password123"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let login = body_json(resp).await?;
    let token = login["token"].as_str().context("token missing")?.to_string();
    assert_eq!(login["user"]["kind"], json!("employee"));

    let organization_id = uuid::Uuid::new_v4();
    let req = Request::builder()
        .method("POST")
        .uri("/auth/employee/select-organization")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"organization_id": organization_id}).to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let selected = body_json(resp).await?;
    assert_eq!(selected["user"]["organization_id"], json!(organization_id.to_string()));

    Ok(())
}
