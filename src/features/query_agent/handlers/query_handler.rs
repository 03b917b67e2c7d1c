use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::AppJson;
use crate::features::query_agent::dtos::{
    CacheClearedDto, CacheStatsDto, QueryRequestDto, QueryResponseDto,
};
use crate::features::query_agent::services::{QueryService, StreamEvent, StreamingPolicy};
use crate::shared::types::ErrorResponse;

/// State for query handlers
#[derive(Clone)]
pub struct QueryState {
    pub service: Arc<QueryService>,
    pub policy: Arc<dyn StreamingPolicy>,
}

fn validated(dto: QueryRequestDto) -> Result<QueryRequestDto> {
    dto.validate()
        .map_err(|e| AppError::Validation(format!("Invalid request: {}", e)))?;
    Ok(dto)
}

async fn answer_sync(
    service: &QueryService,
    dto: QueryRequestDto,
) -> Result<Json<QueryResponseDto>> {
    let answer = service.answer(&dto.query, dto.use_cache).await?;
    Ok(Json(QueryResponseDto::new(dto.query, answer)))
}

/// One SSE frame per event: `data: <json>`
fn stream_response(service: &QueryService, query: &str) -> Response {
    let rx = service.stream(query);

    let stream = ReceiverStream::new(rx).map(|event: StreamEvent| {
        let frame = Event::default().json_data(&event).unwrap_or_else(|e| {
            tracing::error!("Failed to encode stream event: {}", e);
            Event::default().data(r#"{"type":"error","message":"encoding failure"}"#)
        });
        Ok::<_, Infallible>(frame)
    });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("ping"),
        )
        .into_response()
}

/// Answer a question and wait for the full response
#[utoipa::path(
    post,
    path = "/api/query",
    request_body = QueryRequestDto,
    responses(
        (status = 200, description = "Answer", body = QueryResponseDto),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
        (status = 502, description = "Model service error", body = ErrorResponse)
    ),
    tag = "query"
)]
pub async fn query_sync(
    State(state): State<QueryState>,
    AppJson(dto): AppJson<QueryRequestDto>,
) -> Result<Json<QueryResponseDto>> {
    let dto = validated(dto)?;
    answer_sync(&state.service, dto).await
}

/// Answer a question as a live event stream
#[utoipa::path(
    post,
    path = "/api/query/stream",
    request_body = QueryRequestDto,
    responses(
        (
            status = 200,
            description = "SSE stream of start/token/done/error events",
            content_type = "text/event-stream",
            body = StreamEvent
        ),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "query"
)]
pub async fn query_stream(
    State(state): State<QueryState>,
    AppJson(dto): AppJson<QueryRequestDto>,
) -> Result<Response> {
    let dto = validated(dto)?;
    Ok(stream_response(&state.service, &dto.query))
}

/// Answer a question, streaming open-ended ones and waiting on short lookups
#[utoipa::path(
    post,
    path = "/api/ask",
    request_body = QueryRequestDto,
    responses(
        (status = 200, description = "JSON answer or SSE stream depending on the question"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 502, description = "Model service error", body = ErrorResponse)
    ),
    tag = "query"
)]
pub async fn ask(
    State(state): State<QueryState>,
    AppJson(dto): AppJson<QueryRequestDto>,
) -> Result<Response> {
    let dto = validated(dto)?;

    if state.policy.should_stream(&dto.query) {
        tracing::debug!("Routing query to the streaming path");
        return Ok(stream_response(&state.service, &dto.query));
    }

    Ok(answer_sync(&state.service, dto).await?.into_response())
}

/// Response cache statistics
#[utoipa::path(
    get,
    path = "/api/cache/stats",
    responses(
        (status = 200, description = "Cache statistics", body = CacheStatsDto)
    ),
    tag = "query"
)]
pub async fn cache_stats(State(state): State<QueryState>) -> Json<CacheStatsDto> {
    Json(state.service.cache().stats().into())
}

/// Drop every cached answer and reset the counters
#[utoipa::path(
    post,
    path = "/api/cache/clear",
    responses(
        (status = 200, description = "Cache cleared", body = CacheClearedDto)
    ),
    tag = "query"
)]
pub async fn cache_clear(State(state): State<QueryState>) -> Json<CacheClearedDto> {
    state.service.cache().clear();
    Json(CacheClearedDto::cleared())
}
