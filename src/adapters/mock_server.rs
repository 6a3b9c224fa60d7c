//! Composition root: owns the registry, the emitter and the compiled
//! route/trigger state, and rebuilds that state whenever specs reload.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::adapters::emitter::BroadcastEmitter;
use crate::adapters::metrics_handler::MetricsCollector;
use crate::adapters::route_table::{get_route_stats, MockRequest, RouteDeps, RouteTable};
use crate::adapters::spec_registry::{CacheSnapshot, CacheStatus, SpecRegistry};
use crate::adapters::trigger_index::TriggerIndex;
use crate::config::Settings;
use crate::domain::{EventEmitter, SpecError};

/// Everything derived from one cache snapshot. Never mutated, only replaced.
pub struct CompiledState {
    pub specs: Arc<CacheSnapshot>,
    pub routes: RouteTable,
    pub triggers: Arc<TriggerIndex>,
}

pub struct MockServer {
    enabled: bool,
    environment: String,
    root: PathBuf,
    default_delay_ms: u64,
    registry: SpecRegistry,
    emitter: BroadcastEmitter,
    metrics: Arc<MetricsCollector>,
    state: RwLock<Arc<CompiledState>>,
    // Held across load and install so compiled state follows registry order
    install_lock: Mutex<()>,
}

impl MockServer {
    pub fn new(settings: &Settings, emitter: BroadcastEmitter, metrics: Arc<MetricsCollector>) -> Self {
        let registry = SpecRegistry::new(&settings.specs).with_metrics(metrics.clone());
        let empty = compile(
            Arc::new(CacheSnapshot::default()),
            &emitter,
            &metrics,
            settings.mock.default_delay_ms,
        );

        Self {
            enabled: settings.mock.enabled,
            environment: settings.specs.environment.clone(),
            root: settings.specs.root.clone(),
            default_delay_ms: settings.mock.default_delay_ms,
            registry,
            emitter,
            metrics,
            state: RwLock::new(Arc::new(empty)),
            install_lock: Mutex::new(()),
        }
    }

    /// Load specs (honoring the cache) and compile routes and triggers.
    pub async fn initialize(&self) -> Arc<CompiledState> {
        let _guard = self.install_lock.lock().await;
        let snapshot = self.registry.load_specs(&self.root, false).await;
        if snapshot.open_api.is_none() {
            warn!("No OpenAPI document loaded; mock routes are disabled until a refresh succeeds");
        }
        self.install(snapshot).await
    }

    /// Force a reload. On failure the previous state keeps serving.
    pub async fn refresh(&self) -> Result<Arc<CompiledState>, SpecError> {
        let _guard = self.install_lock.lock().await;
        let snapshot = self.registry.refresh_specs(&self.root).await?;
        Ok(self.install(snapshot).await)
    }

    async fn install(&self, snapshot: Arc<CacheSnapshot>) -> Arc<CompiledState> {
        let compiled = Arc::new(compile(snapshot, &self.emitter, &self.metrics, self.default_delay_ms));
        info!(
            "Compiled {} route(s) and {} trigger rule(s)",
            compiled.routes.len(),
            compiled.triggers.len()
        );
        *self.state.write().await = Arc::clone(&compiled);
        compiled
    }

    pub async fn current(&self) -> Arc<CompiledState> {
        Arc::clone(&*self.state.read().await)
    }

    pub async fn dispatch(&self, request: MockRequest) -> axum::response::Response {
        // The request keeps this state even if a refresh lands mid-flight
        let state = self.current().await;
        state.routes.dispatch(request).await
    }

    pub fn emitter(&self) -> &BroadcastEmitter {
        &self.emitter
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub async fn cache_status(&self) -> CacheStatus {
        self.registry.get_cache_status().await
    }

    /// Body of `GET /_mock/status`.
    pub async fn status(&self) -> Value {
        let state = self.current().await;
        let routes = state
            .specs
            .open_api
            .as_deref()
            .map(get_route_stats)
            .unwrap_or_else(|| get_route_stats(&json!({})));
        let cache = self.cache_status().await;

        json!({
            "enabled": self.enabled,
            "environment": self.environment,
            "specs": presence(&state.specs),
            "routes": routes,
            "socketTriggers": state.triggers.stats(),
            "cache": cache,
        })
    }
}

pub fn presence(specs: &CacheSnapshot) -> Value {
    json!({
        "openApi": specs.open_api.is_some(),
        "asyncApi": specs.async_api.is_some(),
        "webhooks": specs.webhooks.is_some(),
    })
}

fn compile(
    specs: Arc<CacheSnapshot>,
    emitter: &BroadcastEmitter,
    metrics: &Arc<MetricsCollector>,
    default_delay_ms: u64,
) -> CompiledState {
    let triggers = Arc::new(
        specs
            .async_api
            .as_deref()
            .map(TriggerIndex::parse)
            .unwrap_or_else(TriggerIndex::empty),
    );

    let deps = RouteDeps {
        emitter: Arc::new(emitter.clone()) as Arc<dyn EventEmitter>,
        triggers: Arc::clone(&triggers),
        default_delay_ms,
        metrics: Some(Arc::clone(metrics)),
    };
    let open_api = specs.open_api.clone().unwrap_or_else(|| Arc::new(json!({})));

    CompiledState {
        routes: RouteTable::generate(open_api, deps),
        triggers,
        specs,
    }
}
