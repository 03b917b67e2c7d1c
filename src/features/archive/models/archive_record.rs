use sqlx::FromRow;

/// One row of the WeeWX `archive` table (the columns this service reads)
#[derive(Debug, Clone, FromRow)]
pub struct ArchiveRecord {
    #[sqlx(rename = "dateTime")]
    pub date_time: i64,
    #[sqlx(rename = "outTemp")]
    pub out_temp: Option<f64>,
    #[sqlx(rename = "outHumidity")]
    pub out_humidity: Option<f64>,
    pub barometer: Option<f64>,
    #[sqlx(rename = "windSpeed")]
    pub wind_speed: Option<f64>,
    #[sqlx(rename = "windDir")]
    pub wind_dir: Option<f64>,
    pub rain: Option<f64>,
    #[sqlx(rename = "rainRate")]
    pub rain_rate: Option<f64>,
    pub dewpoint: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct WindRecord {
    #[sqlx(rename = "dateTime")]
    pub date_time: i64,
    #[sqlx(rename = "windSpeed")]
    pub wind_speed: Option<f64>,
    #[sqlx(rename = "windGust")]
    pub wind_gust: Option<f64>,
    #[sqlx(rename = "windDir")]
    pub wind_dir: Option<f64>,
}

/// MIN/MAX/AVG of one column over a window
#[derive(Debug, Clone, Default, FromRow)]
pub struct ColumnStats {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub avg_value: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RainTotals {
    pub total_rain: Option<f64>,
    pub max_rain_rate: Option<f64>,
    pub num_readings: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyRain {
    pub day: String,
    pub total_rain: Option<f64>,
}

/// Size and freshness of the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSnapshot {
    pub record_count: i64,
    pub latest: Option<i64>,
}
