use sqlx::SqlitePool;

use crate::core::error::{AppError, Result};
use crate::features::archive::dtos::{
    CurrentConditionsDto, DailyRainfallDto, HumidityRangeDto, PressureTrendDto, RainfallDto,
    TemperatureRangeDto, WindEventDto,
};
use crate::features::archive::models::{
    ArchiveRecord, ArchiveSnapshot, ColumnStats, DailyRain, DateRange, RainTotals, WindRecord,
};
use crate::shared::constants::WIND_EVENT_LIMIT;

/// Read-only analytics over the WeeWX SQLite archive
pub struct ArchiveService {
    pool: SqlitePool,
    db_path: String,
}

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |e| {
        tracing::error!("Failed to {}: {:?}", context, e);
        AppError::Database(e)
    }
}

impl ArchiveService {
    pub fn new(pool: SqlitePool, db_path: impl Into<String>) -> Self {
        Self {
            pool,
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Record count and newest timestamp
    pub async fn snapshot(&self) -> Result<ArchiveSnapshot> {
        let record_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM archive")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count archive records"))?;

        let latest: Option<i64> =
            sqlx::query_scalar("SELECT dateTime FROM archive ORDER BY dateTime DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("fetch latest archive timestamp"))?;

        Ok(ArchiveSnapshot {
            record_count,
            latest,
        })
    }

    /// Most recent reading, if the archive has any
    pub async fn current_conditions(&self) -> Result<Option<CurrentConditionsDto>> {
        let record = sqlx::query_as::<_, ArchiveRecord>(
            r#"
            SELECT dateTime, outTemp, outHumidity, barometer, windSpeed,
                   windDir, rain, rainRate, dewpoint
            FROM archive
            ORDER BY dateTime DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch current conditions"))?;

        Ok(record.map(Into::into))
    }

    pub async fn temperature_range(&self, range: &DateRange) -> Result<TemperatureRangeDto> {
        let stats = self.column_stats("outTemp", range).await?;
        let hottest_at = self.extreme_time("outTemp", "DESC", range).await?;
        let coldest_at = self.extreme_time("outTemp", "ASC", range).await?;

        Ok(TemperatureRangeDto::new(range, stats, hottest_at, coldest_at))
    }

    pub async fn rainfall(&self, range: &DateRange) -> Result<RainfallDto> {
        let totals = sqlx::query_as::<_, RainTotals>(
            r#"
            SELECT SUM(rain) AS total_rain,
                   MAX(rainRate) AS max_rain_rate,
                   COUNT(*) AS num_readings
            FROM archive
            WHERE dateTime >= ?1 AND dateTime <= ?2
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("query rainfall"))?;

        Ok(RainfallDto::new(range, totals))
    }

    /// Readings where sustained wind or gusts reached `min_speed`, strongest first
    pub async fn wind_events(
        &self,
        min_speed: f64,
        range: &DateRange,
    ) -> Result<Vec<WindEventDto>> {
        let records = sqlx::query_as::<_, WindRecord>(
            r#"
            SELECT dateTime, windSpeed, windGust, windDir
            FROM archive
            WHERE dateTime >= ?1 AND dateTime <= ?2
              AND (windSpeed >= ?3 OR windGust >= ?3)
            ORDER BY windSpeed DESC
            LIMIT ?4
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(min_speed)
        .bind(WIND_EVENT_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("query wind events"))?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    pub async fn humidity_range(&self, range: &DateRange) -> Result<HumidityRangeDto> {
        let stats = self.column_stats("outHumidity", range).await?;
        Ok(HumidityRangeDto::new(range, stats))
    }

    /// Rain totals per station-local calendar day
    pub async fn daily_rainfall(&self, range: &DateRange) -> Result<Vec<DailyRainfallDto>> {
        let rows = sqlx::query_as::<_, DailyRain>(
            r#"
            SELECT date(dateTime, 'unixepoch', 'localtime') AS day,
                   SUM(rain) AS total_rain
            FROM archive
            WHERE dateTime >= ?1 AND dateTime <= ?2
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("query daily rainfall"))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn pressure_trend(&self, range: &DateRange) -> Result<PressureTrendDto> {
        let stats = self.column_stats("barometer", range).await?;
        let first = self.edge_value("barometer", "ASC", range).await?;
        let last = self.edge_value("barometer", "DESC", range).await?;

        Ok(PressureTrendDto::new(range, stats, first, last))
    }

    // Column names below come from fixed call sites, never from user input

    async fn column_stats(&self, column: &str, range: &DateRange) -> Result<ColumnStats> {
        let sql = format!(
            "SELECT MIN({c}) AS min_value, MAX({c}) AS max_value, AVG({c}) AS avg_value \
             FROM archive WHERE dateTime >= ?1 AND dateTime <= ?2",
            c = column
        );

        sqlx::query_as::<_, ColumnStats>(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("aggregate archive column"))
    }

    /// Timestamp of the highest (DESC) or lowest (ASC) non-null value
    async fn extreme_time(
        &self,
        column: &str,
        order: &str,
        range: &DateRange,
    ) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT dateTime FROM archive \
             WHERE dateTime >= ?1 AND dateTime <= ?2 AND {c} IS NOT NULL \
             ORDER BY {c} {order} LIMIT 1",
            c = column,
            order = order
        );

        sqlx::query_scalar::<_, i64>(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find extreme reading"))
    }

    /// First (ASC) or last (DESC) non-null value in time order
    async fn edge_value(
        &self,
        column: &str,
        order: &str,
        range: &DateRange,
    ) -> Result<Option<f64>> {
        let sql = format!(
            "SELECT {c} FROM archive \
             WHERE dateTime >= ?1 AND dateTime <= ?2 AND {c} IS NOT NULL \
             ORDER BY dateTime {order} LIMIT 1",
            c = column,
            order = order
        );

        sqlx::query_scalar::<_, f64>(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find edge reading"))
    }
}
