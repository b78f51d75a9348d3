//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Task definitions and runs (`/api/tasks`)
//! - Batches and their schedules (`/api/batches`)
//! - Action catalog (`/api/action-types`)
//! - Status event stream (`/api/events`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for browser clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Task routes
        .route(
            "/api/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route(
            "/api/tasks/:id",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/api/tasks/:id/toggle", post(handlers::toggle_task))
        .route("/api/tasks/:id/run", post(handlers::run_task))
        .route("/api/tasks/:id/status", get(handlers::task_status))
        // Batch routes
        .route(
            "/api/batches",
            get(handlers::list_batches).post(handlers::create_batch),
        )
        .route(
            "/api/batches/:id",
            get(handlers::get_batch).delete(handlers::delete_batch),
        )
        .route("/api/batches/:id/start", post(handlers::start_batch))
        .route(
            "/api/batches/:id/schedule",
            post(handlers::set_schedule).delete(handlers::clear_schedule),
        )
        // Catalog and events
        .route("/api/action-types", get(handlers::list_action_types))
        .route("/api/events", get(handlers::status_events))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
