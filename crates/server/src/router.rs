use super::{handlers, state::AppState};
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Creates the Axum router with all the application routes.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .route("/me", get(handlers::get_me_handler))
        .route("/users", get(handlers::get_users_handler))
        .route("/users/{id}", patch(handlers::update_user_role_handler))
        .route(
            "/ingestion",
            post(handlers::create_ingestion_handler).get(handlers::list_ingestions_handler),
        )
        .route("/ingestion/stats", get(handlers::ingestion_stats_handler))
        .route(
            "/ingestion/{id}",
            get(handlers::get_ingestion_handler)
                .patch(handlers::update_ingestion_handler)
                .delete(handlers::delete_ingestion_handler),
        )
        .route(
            "/ingestion/{id}/start",
            post(handlers::start_ingestion_handler),
        )
        .route(
            "/ingestion/{id}/complete",
            post(handlers::complete_ingestion_handler),
        )
        .route(
            "/ingestion/{id}/fail",
            post(handlers::fail_ingestion_handler),
        )
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
