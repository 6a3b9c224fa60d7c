use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub mod watcher;

use crate::cli::Cli;
use crate::domain::SpecKind;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub mock: MockSettings,
    #[serde(default)]
    pub specs: SpecSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delay applied to operations without an `x-mock.delay`
    #[serde(default)]
    pub default_delay_ms: u64,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_delay_ms: 0,
            api_prefix: default_api_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpecSettings {
    /// Selects an entry of `environments` (`API_ENV`)
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Directory holding `openapi.json`, `asyncapi.json` and `webhooks.json`
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Refresh when one of the local spec files changes
    #[serde(default)]
    pub watch_local: bool,
    #[serde(default)]
    pub environments: HashMap<String, SpecUrls>,
}

impl Default for SpecSettings {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            root: default_root(),
            cache_ttl_ms: default_cache_ttl_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            watch_local: false,
            environments: HashMap::new(),
        }
    }
}

impl SpecSettings {
    /// Remote URLs of the active environment, if any are configured.
    pub fn active_urls(&self) -> Option<&SpecUrls> {
        self.environments.get(&self.environment)
    }
}

/// Remote spec locations for one environment
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpecUrls {
    pub openapi: Option<String>,
    pub asyncapi: Option<String>,
    pub webhooks: Option<String>,
}

impl SpecUrls {
    pub fn get(&self, kind: SpecKind) -> Option<&str> {
        match kind {
            SpecKind::OpenApi => self.openapi.as_deref(),
            SpecKind::AsyncApi => self.asyncapi.as_deref(),
            SpecKind::Webhooks => self.webhooks.as_deref(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_cache_ttl_ms() -> u64 {
    5 * 60 * 1000
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            mock: MockSettings::default(),
            specs: SpecSettings::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_file(PathBuf::from("mirage.toml"))
    }

    /// Create settings from CLI arguments (includes config file and CLI overrides)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let mut settings = Self::load(cli.config.clone())?;

        // CLI > legacy env vars > MIRAGE__* env vars > config file
        settings.apply_cli_overrides(cli);

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(config_path: PathBuf) -> Result<Self, anyhow::Error> {
        let settings = Self::load(config_path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(config_path: PathBuf) -> Result<Self, anyhow::Error> {
        let s = Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(Environment::with_prefix("MIRAGE").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .build()?;

        let mut settings: Settings = s.try_deserialize()?;
        settings.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Honor the variables documented for the mock server:
    /// `API_ENV`, `MOCK_API_DELAY` and `MOCK_API_CACHE_TTL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("API_ENV").filter(|v| !v.trim().is_empty()) {
            self.specs.environment = env.trim().to_string();
        }
        if let Some(delay) = lookup("MOCK_API_DELAY") {
            match delay.trim().parse::<u64>() {
                Ok(ms) => self.mock.default_delay_ms = ms,
                Err(_) => tracing::warn!("Ignoring non-numeric MOCK_API_DELAY: {}", delay),
            }
        }
        if let Some(ttl) = lookup("MOCK_API_CACHE_TTL") {
            match ttl.trim().parse::<u64>() {
                Ok(ms) => self.specs.cache_ttl_ms = ms,
                Err(_) => tracing::warn!("Ignoring non-numeric MOCK_API_CACHE_TTL: {}", ttl),
            }
        }
    }

    /// Apply CLI argument overrides to settings
    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(root) = &cli.root {
            self.specs.root = root.clone();
        }
        if let Some(env) = &cli.environment {
            self.specs.environment = env.clone();
        }
        if let Some(delay) = cli.delay {
            self.mock.default_delay_ms = delay;
        }
        if let Some(ttl) = cli.cache_ttl {
            self.specs.cache_ttl_ms = ttl;
        }
        if cli.watch {
            self.specs.watch_local = true;
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if !self.mock.api_prefix.starts_with('/') {
            errors.push(format!(
                "mock.api_prefix must start with '/', got '{}'",
                self.mock.api_prefix
            ));
        }
        if self.specs.cache_ttl_ms == 0 {
            errors.push("specs.cache_ttl_ms must be greater than 0".to_string());
        }
        if self.specs.fetch_timeout_ms == 0 {
            errors.push("specs.fetch_timeout_ms must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 3000);
        assert!(settings.mock.enabled);
        assert_eq!(settings.mock.api_prefix, "/api");
        assert_eq!(settings.specs.cache_ttl_ms, 300_000);
        assert_eq!(settings.specs.environment, "development");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|name| match name {
            "API_ENV" => Some("staging".to_string()),
            "MOCK_API_DELAY" => Some("250".to_string()),
            "MOCK_API_CACHE_TTL" => Some("1000".to_string()),
            _ => None,
        });
        assert_eq!(settings.specs.environment, "staging");
        assert_eq!(settings.mock.default_delay_ms, 250);
        assert_eq!(settings.specs.cache_ttl_ms, 1000);
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|name| match name {
            "MOCK_API_DELAY" => Some("soon".to_string()),
            _ => None,
        });
        assert_eq!(settings.mock.default_delay_ms, 0);
    }

    #[test]
    fn test_active_environment_urls() {
        let mut settings = Settings::default();
        settings.specs.environments.insert(
            "development".to_string(),
            SpecUrls {
                openapi: Some("http://localhost:9000/openapi.json".to_string()),
                asyncapi: None,
                webhooks: None,
            },
        );
        assert_eq!(
            settings.specs.active_urls().and_then(|u| u.get(SpecKind::OpenApi)),
            Some("http://localhost:9000/openapi.json")
        );
        assert_eq!(settings.specs.active_urls().and_then(|u| u.get(SpecKind::AsyncApi)), None);

        settings.specs.environment = "production".to_string();
        assert!(settings.specs.active_urls().is_none());
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut settings = Settings::default();
        settings.mock.api_prefix = "api".to_string();
        settings.specs.cache_ttl_ms = 0;
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("api_prefix"));
        assert!(err.contains("cache_ttl_ms"));
    }
}
