//! Engine configuration
//!
//! Loaded from a JSON file (every field optional) and then overridden from
//! the environment. Defaults live in [`crate::constants`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::constants::{env, remote, retry};

/// Where node bodies run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// In-process, awaiting the node's future
    #[default]
    Local,
    /// Submitted to a task service and polled
    Remote,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown execution mode '{}'", other)),
        }
    }
}

/// Remote task backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    /// Multiplier applied to the poll interval after each poll
    pub poll_backoff: f64,
    pub max_poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: remote::ENDPOINT.to_string(),
            poll_interval_ms: remote::POLL_INTERVAL_MS,
            timeout_ms: remote::TIMEOUT_MS,
            poll_backoff: remote::POLL_BACKOFF,
            max_poll_interval_ms: remote::MAX_POLL_INTERVAL_MS,
            request_timeout_ms: remote::REQUEST_TIMEOUT_MS,
        }
    }
}

impl RemoteConfig {
    /// Poll interval, never below one millisecond
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(remote::MIN_POLL_INTERVAL_MS))
    }

    /// Task timeout, capped at 24 hours
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.min(remote::MAX_TIMEOUT_MS))
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms).max(self.poll_interval())
    }

    /// Backoff multiplier; non-finite values and values below 1.0 become 1.0
    pub fn poll_backoff(&self) -> f64 {
        if self.poll_backoff.is_finite() {
            self.poll_backoff.max(1.0)
        } else {
            1.0
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Local retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: retry::BASE_DELAY_MS,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: Option<u64>,
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
            max_entries: None,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: ExecutionMode,
    pub remote: RemoteConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    /// Cap on concurrently running nodes within a parallel phase
    pub max_parallel_nodes: Option<usize>,
    /// End a run at the first phase boundary after a node fails
    pub stop_on_error: bool,
}

impl EngineConfig {
    /// Load configuration from a JSON file, falling back to defaults if absent
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await.map_err(ConfigError::Io)?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save configuration as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(ConfigError::Io)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, contents).await.map_err(ConfigError::Io)?;

        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Override fields from `AUDITFLOW_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary variable source
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(mode) = lookup(env::MODE) {
            self.mode = parse_var(env::MODE, &mode)?;
        }
        if let Some(endpoint) = lookup(env::REMOTE_ENDPOINT) {
            self.remote.endpoint = endpoint;
        }
        if let Some(interval) = lookup(env::POLL_INTERVAL_MS) {
            self.remote.poll_interval_ms = parse_positive(env::POLL_INTERVAL_MS, &interval)?;
        }
        if let Some(timeout) = lookup(env::TIMEOUT_MS) {
            self.remote.timeout_ms = parse_positive(env::TIMEOUT_MS, &timeout)?;
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ConfigError> {
    match parse_var(key, value)? {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
        n => Ok(n),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Parse error: {0}")]
    Parse(serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.mode, ExecutionMode::Local);
        assert_eq!(config.remote.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.remote.timeout(), Duration::from_millis(60000));
        assert_eq!(config.retry.base_delay(), Duration::from_millis(500));
        assert!(config.cache.enabled);
        assert!(config.max_parallel_nodes.is_none());
        assert!(!config.stop_on_error);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"mode": "remote", "remote": {"timeout_ms": 5000}}"#)
                .unwrap();
        assert_eq!(config.mode, ExecutionMode::Remote);
        assert_eq!(config.remote.timeout_ms, 5000);
        assert_eq!(config.remote.poll_interval_ms, 1000);

        let config: EngineConfig = serde_json::from_str(r#"{"stop_on_error": true}"#).unwrap();
        assert!(config.stop_on_error);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (env::MODE, "Remote"),
            (env::REMOTE_ENDPOINT, "http://tasks.internal:8080"),
            (env::POLL_INTERVAL_MS, "250"),
        ]);
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.mode, ExecutionMode::Remote);
        assert_eq!(config.remote.endpoint, "http://tasks.internal:8080");
        assert_eq!(config.remote.poll_interval_ms, 250);
        assert_eq!(config.remote.timeout_ms, 60000);
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|k| (k == env::TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_interval_override_rejected() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|k| (k == env::POLL_INTERVAL_MS).then(|| "0".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == env::POLL_INTERVAL_MS));
        assert_eq!(config.remote.poll_interval_ms, 1000);
    }

    #[test]
    fn test_remote_timing_is_clamped() {
        let config = RemoteConfig {
            poll_interval_ms: 0,
            timeout_ms: u64::MAX,
            poll_backoff: f64::NAN,
            max_poll_interval_ms: 0,
            ..RemoteConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.timeout(), Duration::from_millis(remote::MAX_TIMEOUT_MS));
        assert_eq!(config.max_poll_interval(), Duration::from_millis(1));
        assert_eq!(config.poll_backoff(), 1.0);
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.json");

        let mut config = EngineConfig::default();
        config.max_parallel_nodes = Some(4);
        config.cache.ttl_secs = Some(3600);
        config.save(&path).await.unwrap();

        assert_eq!(EngineConfig::load(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert!(matches!(
            EngineConfig::load(&path).await.unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
