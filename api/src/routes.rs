use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let migration_routes = Router::new()
        .route("/api/migrations/types", get(handlers::migrations::list_types))
        .route(
            "/api/migrations",
            post(handlers::migrations::submit_migration).get(handlers::migrations::list_migrations),
        )
        .route(
            "/api/migrations/:id",
            get(handlers::migrations::get_migration).delete(handlers::migrations::delete_migration),
        )
        .route(
            "/api/migrations/:id/cancel",
            post(handlers::migrations::cancel_migration),
        )
        // Server-Sent Events for one job's event log
        .route(
            "/api/migrations/:id/events",
            get(handlers::sse::migration_events),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(migration_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
