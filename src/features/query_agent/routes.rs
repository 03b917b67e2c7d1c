use axum::{
    routing::{get, post},
    Router,
};

use crate::features::query_agent::handlers::{self, QueryState};

/// Create routes for the query agent feature
pub fn routes(state: QueryState) -> Router {
    Router::new()
        .route("/api/query", post(handlers::query_sync))
        .route("/api/query/stream", post(handlers::query_stream))
        .route("/api/ask", post(handlers::ask))
        .route("/api/cache/stats", get(handlers::cache_stats))
        .route("/api/cache/clear", post(handlers::cache_clear))
        .with_state(state)
}
