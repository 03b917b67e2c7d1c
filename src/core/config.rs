use std::env;
use std::time::Duration;

use crate::shared::constants::DEFAULT_DB_PATH;
use crate::shared::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub archive: ArchiveConfig,
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub cache: CacheConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Whether the query serving context is started at all
    pub serving_enabled: bool,
    /// Worker threads of the dedicated serving runtime
    pub serving_worker_threads: usize,
}

/// WeeWX SQLite archive access
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub db_path: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Interval of the background archive watcher
    pub watch_interval: Duration,
}

/// Remote model service (Anthropic Messages API)
#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Conversation driver limits
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    pub retry: RetryPolicy,
    pub station_name: String,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub title: String,
    pub version: String,
    pub description: String,
}

/// Parse a boolean flag the lenient way operators write them
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", name)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        let app = AppConfig::from_env()?;
        let model = ModelConfig::from_env(app.serving_enabled)?;

        Ok(Config {
            app,
            archive: ArchiveConfig::from_env()?,
            model,
            agent: AgentConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            swagger: SwaggerConfig::from_env(),
        })
    }
}

impl AppConfig {
    const DEFAULT_PORT: u16 = 9090;
    const DEFAULT_SERVING_WORKER_THREADS: usize = 2;

    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| Self::DEFAULT_PORT.to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let serving_enabled = env::var("SERVING_ENABLED")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        let serving_worker_threads = parse_env(
            "SERVING_WORKER_THREADS",
            Self::DEFAULT_SERVING_WORKER_THREADS,
        )?
        .max(1);

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            serving_enabled,
            serving_worker_threads,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ArchiveConfig {
    const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_WATCH_INTERVAL_SECS: u64 = 60;

    pub fn from_env() -> Result<Self, String> {
        let db_path = env::var("WEEWX_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

        let max_connections =
            parse_env("ARCHIVE_MAX_CONNECTIONS", Self::DEFAULT_MAX_CONNECTIONS)?.max(1);

        let acquire_timeout_secs = parse_env(
            "ARCHIVE_ACQUIRE_TIMEOUT_SECS",
            Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
        )?;

        let watch_interval_secs = parse_env(
            "ARCHIVE_WATCH_INTERVAL_SECS",
            Self::DEFAULT_WATCH_INTERVAL_SECS,
        )?
        .max(1);

        Ok(Self {
            db_path,
            max_connections,
            acquire_timeout_secs,
            watch_interval: Duration::from_secs(watch_interval_secs),
        })
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelConfig {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const DEFAULT_MODEL: &'static str = "claude-sonnet-4-5";
    const DEFAULT_MAX_TOKENS: u32 = 1024;
    const DEFAULT_TIMEOUT_SECS: u64 = 60;

    /// The API key is only mandatory when the serving context will run
    pub fn from_env(required: bool) -> Result<Self, String> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|s| !s.is_empty());
        let api_key = match api_key {
            Some(key) => key,
            None if required => {
                return Err("ANTHROPIC_API_KEY environment variable is required".to_string())
            }
            None => String::new(),
        };

        let base_url = env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| Self::DEFAULT_MODEL.to_string());

        let max_tokens = parse_env("ANTHROPIC_MAX_TOKENS", Self::DEFAULT_MAX_TOKENS)?;
        let timeout_secs = parse_env("MODEL_TIMEOUT_SECS", Self::DEFAULT_TIMEOUT_SECS)?.max(1);

        Ok(Self {
            api_key,
            base_url,
            model,
            max_tokens,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl AgentConfig {
    const DEFAULT_MAX_ITERATIONS: u32 = 8;
    const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 15;
    const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
    const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 250;
    const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 2000;

    pub fn from_env() -> Result<Self, String> {
        let max_iterations =
            parse_env("AGENT_MAX_ITERATIONS", Self::DEFAULT_MAX_ITERATIONS)?.max(1);
        let tool_timeout_secs =
            parse_env("TOOL_TIMEOUT_SECS", Self::DEFAULT_TOOL_TIMEOUT_SECS)?.max(1);
        let max_attempts =
            parse_env("RETRY_MAX_ATTEMPTS", Self::DEFAULT_RETRY_MAX_ATTEMPTS)?.max(1);
        let initial_backoff_ms = parse_env(
            "RETRY_INITIAL_BACKOFF_MS",
            Self::DEFAULT_RETRY_INITIAL_BACKOFF_MS,
        )?;
        let max_backoff_ms =
            parse_env("RETRY_MAX_BACKOFF_MS", Self::DEFAULT_RETRY_MAX_BACKOFF_MS)?;
        let station_name = env::var("STATION_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "home".to_string());

        Ok(Self {
            max_iterations,
            tool_timeout: Duration::from_secs(tool_timeout_secs),
            retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(initial_backoff_ms),
                max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
                backoff_multiplier: 2.0,
            },
            station_name,
        })
    }
}

impl CacheConfig {
    const DEFAULT_TTL_SECS: u64 = 300; // 5 minutes

    pub fn from_env() -> Result<Self, String> {
        let ttl_secs = parse_env("CACHE_TTL_SECS", Self::DEFAULT_TTL_SECS)?;
        Ok(Self {
            ttl: Duration::from_secs(ttl_secs),
        })
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Self {
        let title =
            env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Weather Query API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION").unwrap_or_else(|_| {
            "Natural-language and direct queries over a WeeWX weather archive".to_string()
        });

        Self {
            title,
            version,
            description,
        }
    }
}
