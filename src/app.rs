use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::{middleware, Router};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{self, GuardConfig};
use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::jwt::{self, JwtConfig};
use crate::routes::{actions, auth, campaigns, health, resources, roles, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub guard: Arc<GuardConfig>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, guard: GuardConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            guard: Arc::new(guard),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let guard_config = GuardConfig::from_env();

    let (event_bus, event_rx) = events::init_event_bus();
    tokio::spawn(events::start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, guard_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .nest("/users", users::routes())
        .nest("/campaigns", campaigns::routes())
        .nest("/roles", roles::routes())
        .nest("/resources", resources::routes())
        .nest("/actions", actions::routes());

    // Layers run outermost-last-added: identity attachment must wrap the
    // route guard so claims are in the request extensions before the
    // guard reads them.
    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth::routes())
        .nest("/api/v1", api_routes)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state.clone(), authz::route_guard))
        .layer(middleware::from_fn_with_state(state, jwt::attach_identity))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
