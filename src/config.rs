use crate::allocation::AllocationConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const ENV_DATABASE_PATH: &str = "DISPATCH_TOOL_DB";
pub const ENV_HTTP_ADDR: &str = "DISPATCH_TOOL_HTTP_ADDR";
pub const ENV_COMMIT_DELAY_MS: &str = "DISPATCH_TOOL_COMMIT_DELAY_MS";
pub const ENV_LOG_FILTER: &str = "DISPATCH_TOOL_LOG";

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_commit_delay_ms() -> u64 {
    100
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Process-level settings shared by the binaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// SQLite file backing the store. `None` selects the in-memory store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
    #[serde(default = "default_commit_delay_ms")]
    pub commit_delay_ms: u64,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            http_addr: default_http_addr(),
            commit_delay_ms: default_commit_delay_ms(),
            log_filter: default_log_filter(),
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; blank values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();
        if let Some(path) = get(ENV_DATABASE_PATH) {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(addr) = get(ENV_HTTP_ADDR) {
            config.http_addr = addr.parse().map_err(|err| ConfigError::InvalidValue {
                key: ENV_HTTP_ADDR,
                message: format!("'{addr}': {err}"),
            })?;
        }
        if let Some(delay) = get(ENV_COMMIT_DELAY_MS) {
            config.commit_delay_ms = delay.parse().map_err(|err| ConfigError::InvalidValue {
                key: ENV_COMMIT_DELAY_MS,
                message: format!("'{delay}': {err}"),
            })?;
        }
        if let Some(filter) = get(ENV_LOG_FILTER) {
            config.log_filter = filter;
        }
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn commit_delay(&self) -> Duration {
        Duration::from_millis(self.commit_delay_ms)
    }

    pub fn allocation_config(&self) -> AllocationConfig {
        AllocationConfig {
            commit_delay: self.commit_delay(),
            ..AllocationConfig::default()
        }
    }

    /// Installs the global fmt subscriber. `RUST_LOG` wins over `log_filter`.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_filter));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = DispatchConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.http_addr.port(), 3000);
        assert_eq!(config.allocation_config().commit_delay, Duration::from_millis(100));
    }

    #[test]
    fn env_values_override_defaults() {
        let config = DispatchConfig::from_lookup(lookup(&[
            (ENV_DATABASE_PATH, "/tmp/dispatch.db"),
            (ENV_HTTP_ADDR, "127.0.0.1:8080"),
            (ENV_COMMIT_DELAY_MS, "0"),
            (ENV_LOG_FILTER, "debug"),
        ]))
        .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/dispatch.db")));
        assert_eq!(config.http_addr.port(), 8080);
        assert!(config.commit_delay().is_zero());
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn malformed_delay_is_rejected() {
        let err = DispatchConfig::from_lookup(lookup(&[(ENV_COMMIT_DELAY_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: ENV_COMMIT_DELAY_MS,
                ..
            }
        ));
    }

    #[test]
    fn json_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch.json");
        std::fs::write(&path, r#"{"commit_delay_ms": 5}"#).unwrap();
        let config = DispatchConfig::from_json_file(&path).unwrap();
        assert_eq!(config.commit_delay_ms, 5);
        assert_eq!(config.log_filter, "info");
        assert!(config.database_path.is_none());
    }
}
