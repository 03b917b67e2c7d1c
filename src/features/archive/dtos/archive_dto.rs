use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::core::error::{AppError, Result};
use crate::features::archive::models::{
    local_time, ArchiveRecord, ColumnStats, DailyRain, DateRange, RainTotals, WindRecord,
};
use crate::shared::constants::DISPLAY_TIME_FORMAT;

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn display_time(timestamp: i64) -> Option<String> {
    local_time(timestamp).map(|dt| dt.format(DISPLAY_TIME_FORMAT).to_string())
}

// ==================== Query parameters ====================

/// Date-window query parameters of the dashboard endpoints
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct RangeQuery {
    /// Start date (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
    #[param(example = "2024-06-01")]
    pub start: Option<String>,
    /// End date, inclusive (YYYY-MM-DD or YYYY-MM-DDTHH:MM)
    #[param(example = "2024-06-30")]
    pub end: Option<String>,
}

impl RangeQuery {
    pub fn date_range(&self) -> Result<DateRange> {
        match (non_empty(&self.start), non_empty(&self.end)) {
            (Some(start), Some(end)) => DateRange::parse(start, end),
            _ => Err(AppError::BadRequest(
                "Missing required query params: start, end".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct WindQuery {
    /// Wind speed threshold in station units
    #[param(example = "20")]
    pub min_speed: Option<String>,
    #[param(example = "2024-06-01")]
    pub start: Option<String>,
    #[param(example = "2024-06-30")]
    pub end: Option<String>,
}

impl WindQuery {
    pub fn parse(&self) -> Result<(f64, DateRange)> {
        let (Some(min_speed), Some(start), Some(end)) = (
            non_empty(&self.min_speed),
            non_empty(&self.start),
            non_empty(&self.end),
        ) else {
            return Err(AppError::BadRequest(
                "Missing required query params: min_speed, start, end".to_string(),
            ));
        };

        let min_speed = min_speed
            .trim()
            .parse::<f64>()
            .map_err(|_| AppError::BadRequest(format!("Invalid min_speed: {}", min_speed)))?;

        Ok((min_speed, DateRange::parse(start, end)?))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

// ==================== Results ====================

/// Latest archive record
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentConditionsDto {
    /// Station-local ISO timestamp
    pub timestamp: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub rain: Option<f64>,
    pub rain_rate: Option<f64>,
    pub dewpoint: Option<f64>,
}

impl From<ArchiveRecord> for CurrentConditionsDto {
    fn from(record: ArchiveRecord) -> Self {
        Self {
            timestamp: local_time(record.date_time)
                .map(|dt| dt.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()),
            temperature: record.out_temp,
            humidity: record.out_humidity,
            pressure: record.barometer,
            wind_speed: record.wind_speed,
            wind_direction: record.wind_dir,
            rain: record.rain,
            rain_rate: record.rain_rate,
            dewpoint: record.dewpoint,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TemperatureRangeDto {
    pub period: String,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub avg_temperature: Option<f64>,
    pub hottest_day: Option<String>,
    pub coldest_day: Option<String>,
}

impl TemperatureRangeDto {
    pub fn new(
        range: &DateRange,
        stats: ColumnStats,
        hottest_at: Option<i64>,
        coldest_at: Option<i64>,
    ) -> Self {
        Self {
            period: range.period.clone(),
            min_temperature: stats.min_value,
            max_temperature: stats.max_value,
            avg_temperature: stats.avg_value.map(|v| round_to(v, 1)),
            hottest_day: hottest_at.and_then(display_time),
            coldest_day: coldest_at.and_then(display_time),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RainfallDto {
    pub period: String,
    pub total_rainfall: f64,
    pub max_rain_rate: Option<f64>,
    pub num_readings: i64,
}

impl RainfallDto {
    pub fn new(range: &DateRange, totals: RainTotals) -> Self {
        Self {
            period: range.period.clone(),
            total_rainfall: totals.total_rain.map(|v| round_to(v, 2)).unwrap_or(0.0),
            max_rain_rate: totals.max_rain_rate,
            num_readings: totals.num_readings,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WindEventDto {
    pub timestamp: Option<String>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_direction: Option<f64>,
}

impl From<WindRecord> for WindEventDto {
    fn from(record: WindRecord) -> Self {
        Self {
            timestamp: display_time(record.date_time),
            wind_speed: record.wind_speed,
            wind_gust: record.wind_gust,
            wind_direction: record.wind_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HumidityRangeDto {
    pub period: String,
    pub min_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
    pub avg_humidity: Option<f64>,
}

impl HumidityRangeDto {
    pub fn new(range: &DateRange, stats: ColumnStats) -> Self {
        Self {
            period: range.period.clone(),
            min_humidity: stats.min_value,
            max_humidity: stats.max_value,
            avg_humidity: stats.avg_value.map(|v| round_to(v, 1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DailyRainfallDto {
    /// Station-local calendar day
    pub date: String,
    pub total_rainfall: f64,
}

impl From<DailyRain> for DailyRainfallDto {
    fn from(row: DailyRain) -> Self {
        Self {
            date: row.day,
            total_rainfall: row.total_rain.map(|v| round_to(v, 2)).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PressureTrend {
    Rising,
    Falling,
    Steady,
}

impl PressureTrend {
    /// Changes within 0.1% of the starting pressure count as steady
    pub fn classify(start: f64, end: f64) -> Self {
        let change = end - start;
        if change.abs() < start.abs() * 0.001 {
            PressureTrend::Steady
        } else if change > 0.0 {
            PressureTrend::Rising
        } else {
            PressureTrend::Falling
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PressureTrendDto {
    pub period: String,
    pub start_pressure: Option<f64>,
    pub end_pressure: Option<f64>,
    pub min_pressure: Option<f64>,
    pub max_pressure: Option<f64>,
    pub change: Option<f64>,
    pub trend: Option<PressureTrend>,
}

impl PressureTrendDto {
    pub fn new(
        range: &DateRange,
        stats: ColumnStats,
        first: Option<f64>,
        last: Option<f64>,
    ) -> Self {
        let (change, trend) = match (first, last) {
            (Some(start), Some(end)) => (
                Some(round_to(end - start, 3)),
                Some(PressureTrend::classify(start, end)),
            ),
            _ => (None, None),
        };

        Self {
            period: range.period.clone(),
            start_pressure: first,
            end_pressure: last,
            min_pressure: stats.min_value,
            max_pressure: stats.max_value,
            change,
            trend,
        }
    }
}

// ==================== Status ====================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArchiveStatusDto {
    /// "operational" or "degraded"
    pub status: String,
    pub timestamp: String,
    pub components: StatusComponentsDto,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusComponentsDto {
    pub database: DatabaseStatusDto,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatabaseStatusDto {
    /// "healthy" or "error"
    pub status: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_reading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
