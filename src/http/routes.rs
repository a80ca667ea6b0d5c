use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Candidate-facing operations
        .route("/links/:token", get(handlers::link_status))
        .route("/interviews/start", post(handlers::start_interview))
        .route(
            "/interviews/:id/questions/:question_id/chunks",
            post(handlers::append_chunk),
        )
        .route(
            "/interviews/:id/questions/:question_id/finalize",
            post(handlers::finalize_response),
        )
        .route("/interviews/:id/finalize", post(handlers::finalize_interview))
        // Operator-facing operations
        .route("/interviews/:id/analysis", post(handlers::request_analysis))
        .route("/interviews/:id", get(handlers::read_interview))
        // Browser clients record from the interview link page
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
