use mirage::adapters::{
    emitter::BroadcastEmitter,
    health_handler::HealthHandler,
    metrics_handler::{MetricsCollector, MetricsHandler},
    mock_server::MockServer,
};
use mirage::config::Settings;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

pub struct TestServer {
    pub addr: SocketAddr,
    pub base_url: String,
}

impl TestServer {
    /// Serves the fixture specs on a random port.
    pub async fn new() -> Self {
        Self::with_root(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")).await
    }

    pub async fn with_root(root: PathBuf) -> Self {
        let mut settings = Settings::default();
        settings.server.port = 0;
        settings.specs.root = root;

        let metrics_collector = Arc::new(MetricsCollector::new().unwrap());
        let server = Arc::new(MockServer::new(
            &settings,
            BroadcastEmitter::new(),
            metrics_collector.clone(),
        ));
        server.initialize().await;

        let health_handler = Arc::new(HealthHandler::new(server.clone()));
        let metrics_handler = Arc::new(MetricsHandler::new(metrics_collector));
        let app = mirage::create_app(server, health_handler, metrics_handler, &settings.mock.api_prefix);

        // Start server on random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to be ready
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestServer { addr, base_url }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
