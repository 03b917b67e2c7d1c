use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::core::error::{AppError, Result};
use crate::features::archive::dtos::{
    ArchiveStatusDto, CurrentConditionsDto, DailyRainfallDto, DatabaseStatusDto,
    HumidityRangeDto, PressureTrendDto, RainfallDto, RangeQuery, StatusComponentsDto,
    TemperatureRangeDto, WindEventDto, WindQuery,
};
use crate::features::archive::models::local_time;
use crate::features::archive::services::ArchiveService;
use crate::shared::types::ErrorResponse;

/// Liveness banner
pub async fn index() -> &'static str {
    "Weather query API is running. See /api/status or /api/current."
}

/// Archive health
#[utoipa::path(
    get,
    path = "/api/status",
    responses(
        (status = 200, description = "Archive reachable", body = ArchiveStatusDto),
        (status = 500, description = "Archive degraded", body = ArchiveStatusDto)
    ),
    tag = "archive"
)]
pub async fn status(
    State(service): State<Arc<ArchiveService>>,
) -> (StatusCode, Json<ArchiveStatusDto>) {
    let timestamp = Utc::now().to_rfc3339();
    let path = service.db_path().to_string();

    match service.snapshot().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ArchiveStatusDto {
                status: "operational".to_string(),
                timestamp,
                components: StatusComponentsDto {
                    database: DatabaseStatusDto {
                        status: "healthy".to_string(),
                        path,
                        record_count: Some(snapshot.record_count),
                        latest_reading: snapshot
                            .latest
                            .and_then(local_time)
                            .map(|dt| dt.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()),
                        message: None,
                    },
                },
            }),
        ),
        Err(e) => {
            tracing::warn!("Archive status degraded: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ArchiveStatusDto {
                    status: "degraded".to_string(),
                    timestamp,
                    components: StatusComponentsDto {
                        database: DatabaseStatusDto {
                            status: "error".to_string(),
                            path,
                            record_count: None,
                            latest_reading: None,
                            message: Some(e.to_string()),
                        },
                    },
                }),
            )
        }
    }
}

/// Latest reading
#[utoipa::path(
    get,
    path = "/api/current",
    responses(
        (status = 200, description = "Most recent archive record", body = CurrentConditionsDto),
        (status = 404, description = "Archive is empty", body = ErrorResponse)
    ),
    tag = "archive"
)]
pub async fn current_conditions(
    State(service): State<Arc<ArchiveService>>,
) -> Result<Json<CurrentConditionsDto>> {
    service
        .current_conditions()
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No data found".to_string()))
}

/// Temperature statistics for a date window
#[utoipa::path(
    get,
    path = "/api/temperature",
    params(RangeQuery),
    responses(
        (status = 200, description = "Temperature statistics", body = TemperatureRangeDto),
        (status = 400, description = "Missing or invalid dates", body = ErrorResponse)
    ),
    tag = "archive"
)]
pub async fn temperature_range(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<TemperatureRangeDto>> {
    let range = query.date_range()?;
    Ok(Json(service.temperature_range(&range).await?))
}

/// Rainfall totals for a date window
#[utoipa::path(
    get,
    path = "/api/rainfall",
    params(RangeQuery),
    responses(
        (status = 200, description = "Rainfall totals", body = RainfallDto),
        (status = 400, description = "Missing or invalid dates", body = ErrorResponse)
    ),
    tag = "archive"
)]
pub async fn rainfall(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<RainfallDto>> {
    let range = query.date_range()?;
    Ok(Json(service.rainfall(&range).await?))
}

/// Readings where wind or gusts reached a threshold
#[utoipa::path(
    get,
    path = "/api/wind",
    params(WindQuery),
    responses(
        (status = 200, description = "Wind events, strongest first", body = Vec<WindEventDto>),
        (status = 400, description = "Missing or invalid parameters", body = ErrorResponse)
    ),
    tag = "archive"
)]
pub async fn wind_events(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<WindQuery>,
) -> Result<Json<Vec<WindEventDto>>> {
    let (min_speed, range) = query.parse()?;
    Ok(Json(service.wind_events(min_speed, &range).await?))
}

#[utoipa::path(
    get,
    path = "/api/humidity",
    params(RangeQuery),
    responses(
        (status = 200, description = "Humidity statistics", body = HumidityRangeDto),
        (status = 400, description = "Missing or invalid dates", body = ErrorResponse)
    ),
    tag = "archive"
)]
pub async fn humidity_range(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<HumidityRangeDto>> {
    let range = query.date_range()?;
    Ok(Json(service.humidity_range(&range).await?))
}

#[utoipa::path(
    get,
    path = "/api/daily-rain",
    params(RangeQuery),
    responses(
        (status = 200, description = "Rain totals per day", body = Vec<DailyRainfallDto>),
        (status = 400, description = "Missing or invalid dates", body = ErrorResponse)
    ),
    tag = "archive"
)]
pub async fn daily_rainfall(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<DailyRainfallDto>>> {
    let range = query.date_range()?;
    Ok(Json(service.daily_rainfall(&range).await?))
}

#[utoipa::path(
    get,
    path = "/api/pressure",
    params(RangeQuery),
    responses(
        (status = 200, description = "Barometric trend", body = PressureTrendDto),
        (status = 400, description = "Missing or invalid dates", body = ErrorResponse)
    ),
    tag = "archive"
)]
pub async fn pressure_trend(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<PressureTrendDto>> {
    let range = query.date_range()?;
    Ok(Json(service.pressure_trend(&range).await?))
}
