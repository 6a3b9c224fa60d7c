//! Fetches and caches the OpenAPI, AsyncAPI and webhook documents.
//!
//! Each document is fetched from the URL configured for the active
//! environment and falls back to `<root>/<kind>.json`. A document that is
//! unavailable from both places is simply absent; it never fails the load.
//! The cache is an immutable [`CacheSnapshot`] swapped wholesale, so readers
//! holding an `Arc` to the previous snapshot keep a consistent view.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::adapters::metrics_handler::MetricsCollector;
use crate::config::{SpecSettings, SpecUrls};
use crate::domain::{SpecError, SpecKind};

#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub open_api: Option<Arc<Value>>,
    pub async_api: Option<Arc<Value>>,
    pub webhooks: Option<Arc<Value>>,
    pub last_fetch: Option<DateTime<Utc>>,
    fetched_at: Option<Instant>,
}

impl CacheSnapshot {
    pub fn get(&self, kind: SpecKind) -> Option<&Arc<Value>> {
        match kind {
            SpecKind::OpenApi => self.open_api.as_ref(),
            SpecKind::AsyncApi => self.async_api.as_ref(),
            SpecKind::Webhooks => self.webhooks.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        SpecKind::ALL.iter().all(|kind| self.get(*kind).is_none())
    }

    fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|at| at.elapsed())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub has_open_api: bool,
    pub has_async_api: bool,
    pub has_webhooks: bool,
    pub last_fetch: Option<String>,
    pub ttl_ms: u64,
    pub cache_valid: bool,
    pub expires_in_ms: u64,
}

pub struct SpecRegistry {
    client: reqwest::Client,
    urls: SpecUrls,
    ttl: Duration,
    fetch_timeout: Duration,
    cache: RwLock<Arc<CacheSnapshot>>,
    // Serializes reloads so concurrent callers do not stampede the remotes
    reload_lock: Mutex<()>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SpecRegistry {
    pub fn new(settings: &SpecSettings) -> Self {
        let urls = settings.active_urls().cloned().unwrap_or_default();

        if urls.openapi.is_none() && urls.asyncapi.is_none() && urls.webhooks.is_none() {
            info!(
                "No remote spec URLs for environment '{}', using local files only",
                settings.environment
            );
        }

        Self {
            client: reqwest::Client::new(),
            urls,
            ttl: Duration::from_millis(settings.cache_ttl_ms),
            fetch_timeout: Duration::from_millis(settings.fetch_timeout_ms),
            cache: RwLock::new(Arc::new(CacheSnapshot::default())),
            reload_lock: Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The current snapshot, without triggering a load.
    pub async fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&*self.cache.read().await)
    }

    fn is_fresh(&self, snapshot: &CacheSnapshot) -> bool {
        snapshot.age().is_some_and(|age| age < self.ttl)
    }

    /// Cached documents while the TTL holds, otherwise a fresh load.
    ///
    /// An expired cache is only replaced by an empty load when it was empty
    /// already; a previously good snapshot survives a total outage.
    pub async fn load_specs(&self, root: &Path, force_refresh: bool) -> Arc<CacheSnapshot> {
        if !force_refresh {
            let current = self.snapshot().await;
            if self.is_fresh(&current) {
                return current;
            }
        }

        let _guard = self.reload_lock.lock().await;

        // Another caller may have reloaded while we waited
        if !force_refresh {
            let current = self.snapshot().await;
            if self.is_fresh(&current) {
                return current;
            }
        }

        let loaded = Arc::new(self.fetch_all(root).await);
        let mut cache = self.cache.write().await;
        if loaded.is_empty() && !cache.is_empty() {
            warn!("No spec documents available, keeping the previous cache");
            return Arc::clone(&*cache);
        }
        *cache = Arc::clone(&loaded);
        loaded
    }

    /// Reload bypassing the TTL. Fails with [`SpecError::NothingLoaded`]
    /// when every document is absent, leaving the previous cache in place.
    pub async fn refresh_specs(&self, root: &Path) -> Result<Arc<CacheSnapshot>, SpecError> {
        let _guard = self.reload_lock.lock().await;

        let loaded = self.fetch_all(root).await;
        if loaded.is_empty() {
            return Err(SpecError::NothingLoaded);
        }

        let loaded = Arc::new(loaded);
        *self.cache.write().await = Arc::clone(&loaded);
        info!(
            "Spec cache refreshed (openapi: {}, asyncapi: {}, webhooks: {})",
            loaded.open_api.is_some(),
            loaded.async_api.is_some(),
            loaded.webhooks.is_some()
        );
        Ok(loaded)
    }

    pub async fn get_cache_status(&self) -> CacheStatus {
        let snapshot = self.snapshot().await;
        let ttl_ms = self.ttl.as_millis() as u64;
        let expires_in_ms = snapshot
            .age()
            .map(|age| self.ttl.saturating_sub(age).as_millis() as u64)
            .unwrap_or(0);

        CacheStatus {
            has_open_api: snapshot.open_api.is_some(),
            has_async_api: snapshot.async_api.is_some(),
            has_webhooks: snapshot.webhooks.is_some(),
            last_fetch: snapshot.last_fetch.map(|t| t.to_rfc3339()),
            ttl_ms,
            cache_valid: self.is_fresh(&snapshot),
            expires_in_ms,
        }
    }

    async fn fetch_all(&self, root: &Path) -> CacheSnapshot {
        let (open_api, async_api, webhooks) = tokio::join!(
            self.fetch_document(SpecKind::OpenApi, root),
            self.fetch_document(SpecKind::AsyncApi, root),
            self.fetch_document(SpecKind::Webhooks, root),
        );

        CacheSnapshot {
            open_api: open_api.map(Arc::new),
            async_api: async_api.map(Arc::new),
            webhooks: webhooks.map(Arc::new),
            last_fetch: Some(Utc::now()),
            fetched_at: Some(Instant::now()),
        }
    }

    async fn fetch_document(&self, kind: SpecKind, root: &Path) -> Option<Value> {
        if let Some(url) = self.urls.get(kind) {
            match self.fetch_remote(url).await {
                Ok(doc) => {
                    debug!("Loaded {} from {}", kind, url);
                    self.record_load(kind, "remote");
                    return Some(doc);
                }
                Err(e) => warn!("{}; falling back to local {}", e, kind.local_file()),
            }
        }

        let path = local_path(root, kind);
        match read_local(&path).await {
            Ok(doc) => {
                debug!("Loaded {} from {}", kind, path.display());
                self.record_load(kind, "local");
                Some(doc)
            }
            Err(SpecError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No local {} at {}", kind, path.display());
                None
            }
            Err(e) => {
                warn!("Could not load {} from {}: {}", kind, path.display(), e);
                None
            }
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<Value, SpecError> {
        let fetch_error = |message: String| SpecError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let body = response.bytes().await.map_err(|e| fetch_error(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn record_load(&self, kind: SpecKind, source: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_spec_load(kind.as_str(), source);
        }
    }
}

fn local_path(root: &Path, kind: SpecKind) -> PathBuf {
    root.join(kind.local_file())
}

async fn read_local(path: &Path) -> Result<Value, SpecError> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}
