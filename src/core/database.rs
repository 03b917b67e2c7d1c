use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::core::config::ArchiveConfig;

/// How long SQLite waits on a lock held by the WeeWX writer before giving up
const BUSY_TIMEOUT_SECS: u64 = 5;

/// Create a read-only pool over the WeeWX archive.
///
/// The pool connects lazily: a missing or unreadable archive surfaces as a
/// degraded status or a tool error instead of preventing startup.
pub fn create_pool(config: &ArchiveConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.db_path))?
        .read_only(true)
        .create_if_missing(false)
        .busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS));

    Ok(SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_lazy_with(options))
}
