//! Filtered Stream Binary
//!
//! Starts the stream simulator API and its health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin filtered-stream
//! ```
//!
//! # Environment Variables
//!
//! - `STREAM_HTTP_PORT`: Streaming API port (default: 8080)
//! - `STREAM_HEALTH_PORT`: Health check HTTP port (default: 8081)
//! - `STREAM_DEFAULT_DELAY_MS`: Tick interval when none is requested (default: 100)
//! - `STREAM_MAX_DELAY_MS`: Upper bound for requested tick intervals (default: 10000)
//! - `STREAM_RECENT_WINDOW`: Sample/firehose no-repeat window (default: 10)
//! - `STREAM_SNAPSHOT_REFRESH_MS`: Sample/firehose snapshot refresh (default: 5000)
//! - `STREAM_RULE_REFRESH_MS`: Search stream rule refresh (default: 2000)
//! - `STREAM_LANG_EMPTY_REFRESH_MS`: Language stream refresh while empty (default: 500)
//! - `STREAM_LANG_REFRESH_MS`: Language stream refresh once populated (default: 5000)
//! - `STREAM_CHANNEL_CAPACITY`: Lines buffered per connection (default: 256)
//! - `OTEL_ENABLED`: Enable OpenTelemetry span export (default: false)
//! - `RUST_LOG`: Log filter (default: filtered_stream=info)

use std::sync::Arc;

use filtered_stream::infrastructure::telemetry;
use filtered_stream::{
    AppState, ConnectionRegistry, HealthServer, HealthServerState, HttpServer, InMemoryStore,
    ServiceConfig, StreamDispatcher, UsageLedger, UsageMeter, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting filtered stream simulator");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store = Arc::new(InMemoryStore::new());
    let usage = Arc::new(UsageLedger::new());
    let registry = Arc::new(ConnectionRegistry::new());

    let meter: Arc<dyn UsageMeter> = usage.clone();
    let dispatcher = Arc::new(StreamDispatcher::new(
        Arc::clone(&store),
        meter,
        Arc::clone(&registry),
        config.stream.dispatcher_config(),
    ));

    let app_state = AppState {
        dispatcher,
        store: Arc::clone(&store),
        usage: Arc::clone(&usage),
        shutdown: shutdown_token.clone(),
        channel_capacity: config.stream.channel_capacity,
    };
    let http_server = HttpServer::new(
        config.server.http_port,
        app_state,
        shutdown_token.clone(),
    );

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        registry,
        store,
        usage,
        shutdown_token.clone(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "Streaming API error");
        }
    });

    tracing::info!("Filtered stream ready");

    await_shutdown(shutdown_token).await?;

    http_handle.await?;

    tracing::info!("Filtered stream stopped");
    Ok(())
}

/// Load .env file from the current directory, if present.
fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        health_port = config.server.health_port,
        default_delay_ms = config.stream.default_delay_ms,
        max_delay_ms = config.stream.max_delay_ms,
        recent_window = config.stream.recent_window,
        "Configuration loaded"
    );
}

/// Wait for SIGINT or SIGTERM, then cancel every server and open stream.
async fn await_shutdown(shutdown_token: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                tracing::info!("Received Ctrl+C, initiating shutdown");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C, initiating shutdown");
    }

    shutdown_token.cancel();
    Ok(())
}
