mod api;
mod auth;
mod config;
mod query;
mod store;
mod tasks;

use auth::{AppState, SharedState};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use config::Config;
use std::sync::Arc;
use store::TaskStore;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Boot ───────────────────────────────────────────────────
    let config = Config::from_env();

    let store = TaskStore::open(&config.db_path).expect("Failed to open task database");
    tracing::info!(path = %config.db_path, "task database open");

    // ── Shared state ───────────────────────────────────────────
    let addr = config.addr.clone();
    let state: SharedState = Arc::new(AppState { store, config });

    // ── Router ─────────────────────────────────────────────────
    // Everything except register and login sits behind the bearer check.
    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/user", get(auth::current_user))
        .route("/api/tasks", get(api::list_tasks).post(api::create_task))
        .route(
            "/api/tasks/:id",
            get(api::get_task)
                .put(api::update_task)
                .delete(api::delete_task),
        )
        .route("/api/tasks/:id/complete", patch(api::complete_task))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let app = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .merge(protected)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // ── Start ──────────────────────────────────────────────────
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .expect("Failed to bind server address");
    axum::serve(listener, app).await.expect("Server error");
}
