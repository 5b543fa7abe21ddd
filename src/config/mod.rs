use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Reconciler and work queue settings
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Seconds between reconcile cycles (default: 10)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Delay before the first reconcile cycle after startup (default: 5)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    /// Orders reconciled in parallel per cycle (default: 8)
    #[serde(default = "default_reconcile_concurrency")]
    pub reconcile_concurrency: usize,
    /// Capacity of the continuation queue (default: 256)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Extra attempts when enqueueing the next batch fails (default: 3)
    #[serde(default = "default_queue_push_retries")]
    pub queue_push_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            initial_delay_secs: default_initial_delay(),
            reconcile_concurrency: default_reconcile_concurrency(),
            queue_capacity: default_queue_capacity(),
            queue_push_retries: default_queue_push_retries(),
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}

fn default_initial_delay() -> u64 {
    5
}

fn default_reconcile_concurrency() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    256
}

fn default_queue_push_retries() -> u32 {
    3
}

/// Gateway in front of the release, project, permission and runtime services
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Bearer token sent with every request
    pub token: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            request_timeout_secs: default_request_timeout(),
            token: None,
        }
    }
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.poll_interval_secs == 0 {
            bail!("orchestrator.poll_interval_secs must be greater than 0");
        }
        if self.orchestrator.reconcile_concurrency == 0 {
            bail!("orchestrator.reconcile_concurrency must be greater than 0");
        }
        if self.orchestrator.queue_capacity == 0 {
            bail!("orchestrator.queue_capacity must be greater than 0");
        }
        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            bail!(
                "upstream.base_url must be an http(s) URL, got {}",
                self.upstream.base_url
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.api_port, 8080);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.orchestrator.poll_interval_secs, 10);
        assert_eq!(config.orchestrator.queue_push_retries, 3);
        assert_eq!(config.upstream.request_timeout_secs, 30);
        assert!(config.upstream.token.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [orchestrator]
            poll_interval_secs = 3
            reconcile_concurrency = 2

            [upstream]
            base_url = "https://gateway.internal"
            token = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.poll_interval_secs, 3);
        assert_eq!(config.orchestrator.reconcile_concurrency, 2);
        assert_eq!(config.orchestrator.queue_capacity, 256);
        assert_eq!(config.upstream.token.as_deref(), Some("secret"));
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.orchestrator.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.upstream.base_url = "gateway:9000".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/convoy.toml")).unwrap();
        assert_eq!(config.server.data_dir, PathBuf::from("./data"));
    }
}
