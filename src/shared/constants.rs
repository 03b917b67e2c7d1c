/// Default location of the WeeWX SQLite archive
pub const DEFAULT_DB_PATH: &str = "/var/lib/weewx/weewx.sdb";

/// Maximum accepted length (in characters) of a free-text query
pub const MAX_QUERY_LENGTH: usize = 2000;

/// Maximum number of rows returned by `find_wind_events`
pub const WIND_EVENT_LIMIT: i64 = 50;

/// Timestamp format used for human-facing dates in tool results
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
