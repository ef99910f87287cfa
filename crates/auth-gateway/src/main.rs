//! Auth Gateway
//!
//! Entry point. Loads configuration, fetches the key set once, and serves the
//! catch-all gateway route until SIGINT/SIGTERM.

use auth_gateway::auth::KeySetLoader;
use auth_gateway::config::Config;
use auth_gateway::context::GatewayContext;
use auth_gateway::routes::{self, AppState};
use auth_gateway::services::identity::CognitoIdentityResolver;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Auth Gateway");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        port = config.port,
        upstream_url = %config.upstream_url,
        region = %config.region,
        pool_id = %config.pool_id,
        "Configuration loaded successfully"
    );

    if let Some(metrics_address) = &config.metrics_bind_address {
        let addr: SocketAddr = metrics_address.parse().map_err(|e| {
            error!("Invalid metrics bind address: {}", e);
            e
        })?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| {
                error!("Failed to install Prometheus exporter: {}", e);
                e
            })?;
        info!("Metrics exporter listening on {}", addr);
    }

    // The key set is fetched exactly once; verification never fetches again
    let loader = KeySetLoader::new();
    let key_set = match &config.jwks_url {
        Some(url) => loader.load_from_url(url).await,
        None => loader.load(&config.region, &config.pool_id).await,
    }
    .map_err(|e| {
        error!("Failed to load key set: {}", e);
        e
    })?;

    let identity = CognitoIdentityResolver::from_env(
        &config.region,
        config.pool_id.clone(),
        config.identity_endpoint.clone(),
    )
    .await;

    let bind_address = config.bind_address();
    let drain_seconds = config.drain_seconds;

    let context = GatewayContext::new(config, Arc::new(key_set), Arc::new(identity)).map_err(|e| {
        error!("Failed to build gateway context: {}", e);
        e
    })?;

    let app = routes::build_routes(AppState::new(&context));

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Auth Gateway listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await?;

    info!("Auth Gateway shutdown complete");

    Ok(())
}

/// JSON logs unless `LOG_FORMAT=text`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "auth_gateway=info,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|format| !format.eq_ignore_ascii_case("text"))
        .unwrap_or(true);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}
