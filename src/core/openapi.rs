use utoipa::{Modify, OpenApi};

use crate::features::archive::{dtos as archive_dtos, handlers as archive_handlers};
use crate::features::query_agent::{
    dtos as query_dtos, handlers as query_handlers, services as query_services,
};
use crate::shared::types::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        // Archive
        archive_handlers::status,
        archive_handlers::current_conditions,
        archive_handlers::temperature_range,
        archive_handlers::rainfall,
        archive_handlers::wind_events,
        archive_handlers::humidity_range,
        archive_handlers::daily_rainfall,
        archive_handlers::pressure_trend,
        // Query agent
        query_handlers::query_sync,
        query_handlers::query_stream,
        query_handlers::ask,
        query_handlers::cache_stats,
        query_handlers::cache_clear,
    ),
    components(
        schemas(
            // Shared
            ErrorResponse,
            // Archive
            archive_dtos::ArchiveStatusDto,
            archive_dtos::StatusComponentsDto,
            archive_dtos::DatabaseStatusDto,
            archive_dtos::CurrentConditionsDto,
            archive_dtos::TemperatureRangeDto,
            archive_dtos::RainfallDto,
            archive_dtos::WindEventDto,
            archive_dtos::HumidityRangeDto,
            archive_dtos::DailyRainfallDto,
            archive_dtos::PressureTrend,
            archive_dtos::PressureTrendDto,
            // Query agent
            query_dtos::QueryRequestDto,
            query_dtos::QueryResponseDto,
            query_dtos::CacheStatsDto,
            query_dtos::CacheClearedDto,
            query_services::StreamEvent,
        )
    ),
    tags(
        (name = "archive", description = "Direct reads of the WeeWX archive"),
        (name = "query", description = "Natural-language questions answered by the model with archive tools"),
    ),
    info(
        title = "Weather Query API",
        version = "0.1.0",
        description = "Natural-language and direct queries over a WeeWX weather archive",
    )
)]
pub struct ApiDoc;

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
