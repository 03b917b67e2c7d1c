use schemars::JsonSchema;
use serde::Deserialize;

use super::registry::ToolDefinition;

pub const GET_CURRENT_CONDITIONS: &str = "get_current_conditions";
pub const QUERY_TEMPERATURE_RANGE: &str = "query_temperature_range";
pub const QUERY_RAINFALL: &str = "query_rainfall";
pub const FIND_WIND_EVENTS: &str = "find_wind_events";
pub const QUERY_HUMIDITY_RANGE: &str = "query_humidity_range";
pub const QUERY_DAILY_RAINFALL: &str = "query_daily_rainfall";
pub const QUERY_PRESSURE_TREND: &str = "query_pressure_trend";

/// Arguments of tools that take no input
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DateRangeArgs {
    /// Start date in ISO format (YYYY-MM-DD, or YYYY-MM-DDTHH:MM for a time of day)
    pub start_date: String,
    /// End date in ISO format (YYYY-MM-DD covers the whole day)
    pub end_date: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WindEventArgs {
    /// Minimum wind speed threshold, in the station's units (mph or m/s)
    pub min_speed: f64,
    /// Start date in ISO format (YYYY-MM-DD, or YYYY-MM-DDTHH:MM for a time of day)
    pub start_date: String,
    /// End date in ISO format (YYYY-MM-DD covers the whole day)
    pub end_date: String,
}

pub fn current_conditions_tool() -> ToolDefinition {
    ToolDefinition::new(
        GET_CURRENT_CONDITIONS,
        "Get the most recent weather conditions from the station: temperature, humidity, \
         pressure, wind, rain and dewpoint of the latest archive record.",
    )
    .with_args::<NoArgs>()
}

pub fn temperature_range_tool() -> ToolDefinition {
    ToolDefinition::new(
        QUERY_TEMPERATURE_RANGE,
        "Get temperature statistics (min, max, average) for a date range, including when \
         the hottest and coldest readings occurred.",
    )
    .with_args::<DateRangeArgs>()
}

pub fn rainfall_tool() -> ToolDefinition {
    ToolDefinition::new(
        QUERY_RAINFALL,
        "Get total rainfall, peak rain rate and number of readings for a date range.",
    )
    .with_args::<DateRangeArgs>()
}

pub fn wind_events_tool() -> ToolDefinition {
    ToolDefinition::new(
        FIND_WIND_EVENTS,
        "Find times when sustained wind or gusts reached a threshold. Returns at most 50 \
         readings, strongest first.",
    )
    .with_args::<WindEventArgs>()
}

pub fn humidity_range_tool() -> ToolDefinition {
    ToolDefinition::new(
        QUERY_HUMIDITY_RANGE,
        "Get outdoor humidity statistics (min, max, average) for a date range.",
    )
    .with_args::<DateRangeArgs>()
}

pub fn daily_rainfall_tool() -> ToolDefinition {
    ToolDefinition::new(
        QUERY_DAILY_RAINFALL,
        "Get rainfall totals per calendar day for a date range. Use this to find the \
         wettest days or dry spells.",
    )
    .with_args::<DateRangeArgs>()
}

pub fn pressure_trend_tool() -> ToolDefinition {
    ToolDefinition::new(
        QUERY_PRESSURE_TREND,
        "Get the barometric pressure trend (rising, falling or steady) with start, end, \
         min and max pressure for a date range.",
    )
    .with_args::<DateRangeArgs>()
}
