use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use mailcraft::authz::infer;
use mailcraft::authz::PermissionSet;
use mailcraft::utils::hash_password;

#[derive(Parser, Debug)]
#[command(author, version, about = "mailcraft admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create an employee account holding the ADMIN role
    SeedAdmin {
        email: String,
        password: String,
        #[arg(long, default_value = "Administrator")]
        name: String,
    },
    /// Dry-run the route guard: infer the target for a method + path and
    /// evaluate it against a role's stored permission structure
    Check {
        role: String,
        method: String,
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            get_migrator().await?.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::SeedAdmin { email, password, name } => {
            let pool = get_pool().await?;
            seed_admin(&pool, &email, &password, &name).await?;
            println!("Created admin account {email}");
        }
        Commands::Check { role, method, path } => {
            let pool = get_pool().await?;
            check(&pool, &role, &method, &path).await?;
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn get_migrator() -> anyhow::Result<Migrator> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    Migrator::new(dir).await.context("failed to load migrations")
}

async fn print_status(pool: &SqlitePool, migrator: &Migrator) -> anyhow::Result<()> {
    let applied: HashSet<i64> = sqlx::query_scalar("SELECT version FROM _sqlx_migrations")
        .fetch_all(pool)
        .await
        .unwrap_or_default()
        .into_iter()
        .collect();

    for migration in migrator.iter() {
        let mark = if applied.contains(&migration.version) { "applied" } else { "pending" };
        println!("{:>16} {:>8} {}", migration.version, mark, migration.description);
    }

    Ok(())
}

async fn seed_admin(pool: &SqlitePool, email: &str, password: &str, name: &str) -> anyhow::Result<()> {
    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
            .bind(email)
            .fetch_one(pool)
            .await?;
    if existing > 0 {
        anyhow::bail!("email {email} already in use");
    }

    let role_id: String =
        sqlx::query_scalar("SELECT id FROM roles WHERE name = 'ADMIN' AND deleted_at IS NULL")
            .fetch_optional(pool)
            .await?
            .context("ADMIN role missing; run migrations first")?;

    let password_hash = hash_password(password).map_err(|err| anyhow::anyhow!("{err}"))?;
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, kind, role_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'employee', ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(&role_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

async fn check(pool: &SqlitePool, role: &str, method: &str, path: &str) -> anyhow::Result<()> {
    let method = method
        .to_uppercase()
        .parse::<axum::http::Method>()
        .context("invalid HTTP method")?;

    let target = infer(&method, path);
    match (target.resource, target.action) {
        (Some(resource), Some(action)) => {
            println!("target: {resource} {action}");

            let raw: Option<String> =
                sqlx::query_scalar("SELECT permissions FROM roles WHERE name = ? AND deleted_at IS NULL")
                    .bind(role)
                    .fetch_optional(pool)
                    .await?;
            let raw = raw.with_context(|| format!("role {role} not found"))?;
            let permissions: PermissionSet = serde_json::from_str(&raw)?;

            if permissions.allows(resource, action) {
                println!("{role}: allowed");
            } else {
                println!("{role}: denied");
            }
        }
        _ => {
            println!("target unresolved; the guard would let this request through");
        }
    }

    Ok(())
}
