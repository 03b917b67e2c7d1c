use std::sync::Arc;

use axum::{routing::get, Router};

use crate::features::archive::handlers;
use crate::features::archive::services::ArchiveService;

/// Create routes for the archive feature
pub fn routes(service: Arc<ArchiveService>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/status", get(handlers::status))
        .route("/api/current", get(handlers::current_conditions))
        .route("/api/temperature", get(handlers::temperature_range))
        .route("/api/rainfall", get(handlers::rainfall))
        .route("/api/wind", get(handlers::wind_events))
        .route("/api/humidity", get(handlers::humidity_range))
        .route("/api/daily-rain", get(handlers::daily_rainfall))
        .route("/api/pressure", get(handlers::pressure_trend))
        .with_state(service)
}
