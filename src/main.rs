use clap::Parser;
use mirage::adapters::emitter::BroadcastEmitter;
use mirage::adapters::health_handler::HealthHandler;
use mirage::adapters::metrics_handler::{MetricsCollector, MetricsHandler};
use mirage::adapters::mock_server::MockServer;
use mirage::cli::Cli;
use mirage::config::{watcher::SpecWatcher, Settings};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    info!(
        "Starting Mirage mock server on {}:{} (environment: {})",
        host, port, settings.specs.environment
    );

    let metrics = Arc::new(MetricsCollector::new()?);
    let server = Arc::new(MockServer::new(&settings, BroadcastEmitter::new(), metrics.clone()));
    server.initialize().await;

    // Refresh when local spec files change
    let _watcher = if settings.specs.watch_local {
        let runtime = tokio::runtime::Handle::current();
        let server_for_watcher = server.clone();
        Some(SpecWatcher::new(&settings.specs.root, move || {
            let server = server_for_watcher.clone();
            runtime.spawn(async move {
                match server.refresh().await {
                    Ok(_) => info!("Specs reloaded after local change"),
                    Err(e) => error!("Failed to reload specs: {}", e),
                }
            });
        })?)
    } else {
        None
    };

    let health_handler = Arc::new(HealthHandler::new(server.clone()));
    let metrics_handler = Arc::new(MetricsHandler::new(metrics));
    let app = mirage::create_app(server, health_handler, metrics_handler, &settings.mock.api_prefix);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
