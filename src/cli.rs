use clap::Parser;
use std::path::PathBuf;

/// Mirage - a schema-driven mock API server for OpenAPI and AsyncAPI documents
#[derive(Parser, Debug, Clone)]
#[command(name = "mirage", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "MIRAGE_CONFIG", default_value = "mirage.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "MIRAGE_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "MIRAGE_PORT")]
    pub port: Option<u16>,

    /// Directory holding openapi.json, asyncapi.json and webhooks.json
    #[arg(long, env = "MIRAGE_ROOT")]
    pub root: Option<PathBuf>,

    /// Environment selecting the remote spec URL set
    #[arg(short, long = "env", env = "API_ENV")]
    pub environment: Option<String>,

    /// Default response delay in milliseconds
    #[arg(long, env = "MOCK_API_DELAY")]
    pub delay: Option<u64>,

    /// Spec cache TTL in milliseconds
    #[arg(long, env = "MOCK_API_CACHE_TTL")]
    pub cache_ttl: Option<u64>,

    /// Refresh automatically when a local spec file changes
    #[arg(long)]
    pub watch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["mirage"]);
        assert_eq!(cli.config, PathBuf::from("mirage.toml"));
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.watch);
    }

    #[test]
    fn test_cli_with_args() {
        let cli = Cli::parse_from([
            "mirage",
            "--config",
            "custom.toml",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--root",
            "specs",
            "--env",
            "staging",
            "--delay",
            "150",
            "--cache-ttl",
            "60000",
            "--watch",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.host, Some("0.0.0.0".to_string()));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.root, Some(PathBuf::from("specs")));
        assert_eq!(cli.environment, Some("staging".to_string()));
        assert_eq!(cli.delay, Some(150));
        assert_eq!(cli.cache_ttl, Some(60000));
        assert!(cli.watch);
    }
}
