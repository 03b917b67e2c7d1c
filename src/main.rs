mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::Config;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::supervisor::{shutdown_channel, ServingExit, ServingSupervisor, ShutdownSignal};
use crate::core::{database, middleware};
use crate::features::archive::{routes as archive_routes, ArchiveService, ArchiveWatcher};
use crate::features::query_agent::{
    create_tool_registry, routes as query_routes, ConversationDriver, DriverConfig,
    KeywordStreamingPolicy, QueryService, QueryState, ResponseCache, SystemPrompt,
};
use crate::modules::llm::{AnthropicClient, ModelClient};
use crate::shared::clock::{Clock, SystemClock};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Log system info
    let available_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        available_cpus,
        worker_threads,
        std::process::id()
    );

    tracing::info!("Configuration loaded successfully");

    // Host workload: the archive watcher runs for the whole process lifetime
    let pool = database::create_pool(&config.archive)?;
    let archive_service = Arc::new(ArchiveService::new(pool, config.archive.db_path.clone()));
    tracing::info!("Archive pool created for {}", config.archive.db_path);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (shutdown, shutdown_signal) = shutdown_channel();

    let watcher = ArchiveWatcher::new(
        Arc::clone(&archive_service),
        Arc::clone(&clock),
        config.archive.watch_interval,
    );
    let watcher_handle = tokio::spawn(watcher.run(shutdown_signal.clone()));
    tracing::info!("Archive watcher spawned");

    if config.app.serving_enabled {
        let serving_config = config.clone();
        let serving_signal = shutdown_signal.clone();
        let supervisor = ServingSupervisor::spawn(config.app.serving_worker_threads, move || {
            serve(serving_config, serving_signal)
        })?;

        let serving = supervisor.wait();
        tokio::pin!(serving);

        let serving_ended_first = tokio::select! {
            _ = shutdown_requested() => false,
            exit = &mut serving => {
                if exit != ServingExit::Completed {
                    tracing::warn!("Query serving is down; archive watcher keeps running");
                }
                true
            }
        };

        if serving_ended_first {
            shutdown_requested().await;
            shutdown.trigger();
        } else {
            tracing::info!("Shutdown requested, stopping query serving");
            shutdown.trigger();
            serving.await;
        }
    } else {
        tracing::info!("Query serving disabled (SERVING_ENABLED=false)");
        shutdown_requested().await;
        shutdown.trigger();
    }

    watcher_handle.await?;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_requested() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Query serving context. Runs on its own runtime under `ServingSupervisor`.
async fn serve(config: Config, shutdown: ShutdownSignal) -> anyhow::Result<()> {
    // Separate pool so serving load cannot starve the watcher's connections
    let pool = database::create_pool(&config.archive)?;
    let archive_service = Arc::new(ArchiveService::new(pool, config.archive.db_path.clone()));

    let tool_registry = Arc::new(create_tool_registry(Arc::clone(&archive_service)));
    let toolset_version = tool_registry.version();
    tracing::info!(
        "Agent tool registry initialized with {} tools (version {}): {}",
        tool_registry.len(),
        &toolset_version[..12],
        tool_registry.names().join(", ")
    );

    let model: Arc<dyn ModelClient> = Arc::new(AnthropicClient::new(&config.model)?);
    tracing::info!(
        "Model client initialized ({} at {})",
        config.model.model,
        config.model.base_url
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let driver = Arc::new(ConversationDriver::new(
        model,
        Arc::clone(&tool_registry),
        SystemPrompt::new(config.agent.station_name.clone())?,
        Arc::clone(&clock),
        DriverConfig::from_config(&config.agent, &config.model),
    ));

    let cache =
        Arc::new(ResponseCache::new(config.cache.ttl, clock).with_namespace(toolset_version));
    tracing::info!("Response cache initialized (ttl={:?})", config.cache.ttl);

    let query_state = QueryState {
        service: Arc::new(QueryService::new(driver, cache)),
        policy: Arc::new(KeywordStreamingPolicy::default()),
    };

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    let swagger =
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi));

    // Simple health check endpoint
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let app = Router::new()
        .merge(swagger)
        .merge(archive_routes::routes(archive_service))
        .merge(query_routes::routes(query_state))
        .merge(health_route)
        .layer(middleware::cors_layer(&config.app.cors_allowed_origins))
        .layer(
            ServiceBuilder::new()
                // Generate X-Request-Id using UUID v7 (or use client-provided one)
                .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(middleware::MakeSpanWithRequestId)
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                // Propagate X-Request-Id to response headers
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_send_buffer_size(256 * 1024)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(65535)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    Ok(())
}
