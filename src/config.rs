use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::engine::RetryPolicy;
use crate::error::{Result, RulesError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Total attempts per provider call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Message ids per search page (Gmail caps this at 500)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            page_size: default_page_size(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl EngineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
    /// Recurse into subdirectories when scanning rule locations
    #[serde(default)]
    pub recursive: bool,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

fn default_max_concurrent() -> usize {
    10
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RulesError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RulesError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.max_attempts == 0 {
            return Err(RulesError::ConfigError(
                "engine.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.engine.page_size == 0 || self.engine.page_size > 500 {
            return Err(RulesError::ConfigError(
                "engine.page_size must be between 1 and 500".to_string(),
            ));
        }
        if self.engine.max_concurrent_requests == 0 {
            return Err(RulesError::ConfigError(
                "engine.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.max_attempts, 4);
        assert_eq!(config.engine.page_size, 100);
        assert!(!config.execution.dry_run);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[engine]
max_attempts = 2
"#,
        )
        .unwrap();
        assert_eq!(config.engine.max_attempts, 2);
        assert_eq!(config.engine.page_size, 100);
        assert_eq!(config.engine.initial_backoff_ms, 500);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config: Config = toml::from_str(
            r#"
[engine]
max_attempts = 0
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_page_rejected() {
        let config: Config = toml::from_str(
            r#"
[engine]
page_size = 1000
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_conversion() {
        let config = Config::default();
        let policy = config.engine.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }
}
