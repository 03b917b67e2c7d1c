use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::features::query_agent::services::{CacheStats, QueryAnswer};
use crate::shared::constants::MAX_QUERY_LENGTH;

fn default_use_cache() -> bool {
    true
}

/// Query text must have 1..=MAX_QUERY_LENGTH characters once trimmed
fn validate_query_text(query: &str) -> Result<(), ValidationError> {
    let length = query.trim().chars().count();
    if length == 0 || length > MAX_QUERY_LENGTH {
        return Err(ValidationError::new("query_length").with_message(Cow::Owned(format!(
            "Query must be between 1 and {} characters",
            MAX_QUERY_LENGTH
        ))));
    }
    Ok(())
}

/// Free-text question about the weather archive
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct QueryRequestDto {
    /// The question, e.g. "How much rain fell last week?"
    #[validate(custom(function = "validate_query_text"))]
    pub query: String,

    /// Serve and store answers through the response cache (default true)
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryResponseDto {
    pub query: String,
    pub response: String,
    /// Whether the answer came from the response cache
    pub cached: bool,
}

impl QueryResponseDto {
    pub fn new(query: String, answer: QueryAnswer) -> Self {
        Self {
            query,
            response: answer.response,
            cached: answer.cached,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheStatsDto {
    pub cache_size: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate_percent: f64,
    pub ttl_seconds: u64,
}

impl From<CacheStats> for CacheStatsDto {
    fn from(stats: CacheStats) -> Self {
        Self {
            cache_size: stats.size,
            cache_hits: stats.hits,
            cache_misses: stats.misses,
            hit_rate_percent: stats.hit_rate_percent,
            ttl_seconds: stats.ttl.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheClearedDto {
    pub status: String,
}

impl CacheClearedDto {
    pub fn cleared() -> Self {
        Self {
            status: "cleared".to_string(),
        }
    }
}
